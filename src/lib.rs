// Module layout (Clean Architecture style)
// - bootstrap: configuration and manager wiring
// - domain: catalog records and pure reconciliation
// - application: ports, manifest codec, download queue, orchestrator
// - infrastructure: filesystem/HTTP/settings adapters

pub mod application;
pub mod bootstrap;
pub mod domain;
pub mod infrastructure;

pub use application::events::ManagerEvent;
pub use application::manager::{CatalogKind, PluginManager};
pub use application::manifest::ParseError;
pub use bootstrap::app_context::ManagerBuilder;
pub use bootstrap::config::ManagerConfig;
pub use domain::plugin::{PluginSpec, PluginStatus, PluginType};
pub use domain::repo::{RepoRecord, RepoSpec};
