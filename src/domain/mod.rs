pub mod plugin;
pub mod repo;
