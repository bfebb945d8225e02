pub mod download;
pub mod events;
pub mod manager;
pub mod manifest;
pub mod ports;
