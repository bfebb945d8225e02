use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the plugin manager. Everything has a sensible
/// default so embedding hosts can start with `ManagerConfig::from_env()`
/// and override nothing.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Where user-installed plugins live. Always writable.
    pub user_plugin_dir: PathBuf,
    /// Read-only locations shipped with the host application.
    pub system_plugin_dirs: Vec<PathBuf>,
    /// Repository mirrors, catalog snapshot and staging space.
    pub cache_dir: PathBuf,
    /// Settings file holding the repository list (default store only).
    pub settings_file: PathBuf,
    pub http_timeout: Duration,
    pub user_agent: String,
}

impl ManagerConfig {
    pub fn from_env() -> Self {
        let base = directories::ProjectDirs::from("", "", "plugbay");

        let user_plugin_dir = env::var("PLUGBAY_PLUGIN_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                base.as_ref()
                    .map(|d| d.data_dir().join("plugins"))
                    .unwrap_or_else(|| PathBuf::from("./plugins"))
            });
        let system_plugin_dirs = env::var("PLUGBAY_SYSTEM_PLUGIN_DIRS")
            .map(|raw| split_paths(&raw))
            .unwrap_or_default();
        let cache_dir = env::var("PLUGBAY_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                base.as_ref()
                    .map(|d| d.cache_dir().to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("./cache"))
            });
        let settings_file = env::var("PLUGBAY_SETTINGS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                base.as_ref()
                    .map(|d| d.config_dir().join("settings.json"))
                    .unwrap_or_else(|| PathBuf::from("./settings.json"))
            });
        let http_timeout = env::var("PLUGBAY_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));
        let user_agent = env::var("PLUGBAY_USER_AGENT")
            .unwrap_or_else(|_| format!("plugbay/{}", env!("CARGO_PKG_VERSION")));

        Self {
            user_plugin_dir,
            system_plugin_dirs,
            cache_dir,
            settings_file,
            http_timeout,
            user_agent,
        }
    }
}

fn split_paths(raw: &str) -> Vec<PathBuf> {
    raw.split(if cfg!(windows) { ';' } else { ':' })
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_lists_split_on_the_platform_separator() {
        let sep = if cfg!(windows) { ';' } else { ':' };
        let raw = format!("/a{sep} /b{sep}{sep}/c");
        let parsed = split_paths(&raw);
        assert_eq!(
            parsed,
            vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
        );
    }
}
