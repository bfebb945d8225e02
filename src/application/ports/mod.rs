pub mod http_transport;
pub mod settings_store;
