use std::sync::Arc;

use crate::application::manager::PluginManager;
use crate::application::ports::http_transport::HttpTransport;
use crate::application::ports::settings_store::SettingsStore;
use crate::bootstrap::config::ManagerConfig;
use crate::infrastructure::fs::layout::Layout;
use crate::infrastructure::http::reqwest_transport::ReqwestTransport;
use crate::infrastructure::settings::json_store::JsonSettingsStore;

/// Assembles a [`PluginManager`] from a config plus optional port
/// overrides. Hosts that persist repositories elsewhere, or tests with
/// scripted transports, swap the ports; everyone else gets the default
/// reqwest transport and JSON settings file.
pub struct ManagerBuilder {
    config: ManagerConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    settings: Option<Arc<dyn SettingsStore>>,
}

impl ManagerBuilder {
    pub fn new(config: ManagerConfig) -> Self {
        Self { config, transport: None, settings: None }
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Build the manager. Needs a tokio runtime (the download worker is
    /// spawned here).
    pub fn build(self) -> anyhow::Result<PluginManager> {
        let layout = Layout::new(
            self.config.user_plugin_dir.clone(),
            self.config.system_plugin_dirs.clone(),
            self.config.cache_dir.clone(),
        );
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(
                self.config.http_timeout,
                &self.config.user_agent,
            )?),
        };
        let settings = self
            .settings
            .unwrap_or_else(|| Arc::new(JsonSettingsStore::new(self.config.settings_file.clone())));
        Ok(PluginManager::new(layout, transport, settings))
    }
}
