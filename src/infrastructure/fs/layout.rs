use std::io;
use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

/// Attempts at finding an unused random name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 10;
/// Length of generated folder name stems.
const NAME_LEN: usize = 12;

#[derive(thiserror::Error, Debug)]
pub enum ResourceError {
    #[error("no unused name under {base} after {attempts} attempts")]
    NameSpaceExhausted { base: PathBuf, attempts: u32 },
}

/// Where everything lives on disk. Knows the user install root, the
/// read-only system roots and the cache root; nothing else builds paths.
#[derive(Debug, Clone)]
pub struct Layout {
    user_plugin_dir: PathBuf,
    system_plugin_dirs: Vec<PathBuf>,
    cache_dir: PathBuf,
}

impl Layout {
    pub fn new(
        user_plugin_dir: PathBuf,
        system_plugin_dirs: Vec<PathBuf>,
        cache_dir: PathBuf,
    ) -> Self {
        Self { user_plugin_dir, system_plugin_dirs, cache_dir }
    }

    pub fn user_plugin_dir(&self) -> &Path {
        &self.user_plugin_dir
    }

    pub fn system_plugin_dirs(&self) -> &[PathBuf] {
        &self.system_plugin_dirs
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Root of all repository cache mirrors.
    pub fn repos_dir(&self) -> PathBuf {
        self.cache_dir.join("repos")
    }

    /// Cache mirror of one repository. `id` must already be validated.
    pub fn repo_dir(&self, id: &str) -> PathBuf {
        self.repos_dir().join(id)
    }

    /// Downloaded repository logo, kept outside the mirror so bundle swaps
    /// do not drop it.
    pub fn repo_logo_file(&self, id: &str) -> PathBuf {
        self.repos_dir().join(format!("{id}.logo"))
    }

    /// Snapshot of the available catalog for offline starts.
    pub fn catalog_cache_file(&self) -> PathBuf {
        self.cache_dir.join("catalog.json")
    }

    /// Scratch space for staged extractions, on the same filesystem as the
    /// cache so renames out of it stay atomic.
    pub fn temp_dir(&self) -> PathBuf {
        self.cache_dir.join("tmp")
    }

    pub fn ensure_temp_dir(&self) -> io::Result<PathBuf> {
        let dir = self.temp_dir();
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Whether `path` sits inside one of the read-only system roots.
    pub fn is_system_path(&self, path: &Path) -> bool {
        self.system_plugin_dirs.iter().any(|root| path.starts_with(root))
    }

    /// Reserve an unused path under `base` made of a random stem plus
    /// `suffix`. The name is only probed, never created; callers create it
    /// promptly. Fails once the namespace looks exhausted rather than
    /// looping forever.
    pub fn random_name(&self, base: &Path, suffix: &str) -> Result<PathBuf, ResourceError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let stem: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(NAME_LEN)
                .map(char::from)
                .collect();
            let candidate = base.join(format!("{stem}{suffix}"));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(ResourceError::NameSpaceExhausted {
            base: base.to_path_buf(),
            attempts: MAX_NAME_ATTEMPTS,
        })
    }
}

/// Allocate an id for a newly added repository. Hex-only, so it always
/// passes the id charset check and is safe as a folder name.
pub fn new_repo_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::domain::repo::is_safe_name;

    fn layout(tmp: &TempDir) -> Layout {
        Layout::new(
            tmp.path().join("user"),
            vec![tmp.path().join("system")],
            tmp.path().join("cache"),
        )
    }

    #[test]
    fn paths_hang_off_the_cache_root() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        assert_eq!(layout.repo_dir("abc"), tmp.path().join("cache/repos/abc"));
        assert_eq!(
            layout.repo_logo_file("abc"),
            tmp.path().join("cache/repos/abc.logo")
        );
        assert_eq!(layout.catalog_cache_file(), tmp.path().join("cache/catalog.json"));
    }

    #[test]
    fn system_paths_are_recognized_by_prefix() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        assert!(layout.is_system_path(&tmp.path().join("system/some/plugin")));
        assert!(!layout.is_system_path(&tmp.path().join("user/some/plugin")));
    }

    #[test]
    fn random_names_are_fresh_and_suffixed() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);

        let a = layout.random_name(tmp.path(), ".staging").unwrap();
        let b = layout.random_name(tmp.path(), ".staging").unwrap();
        assert!(!a.exists());
        assert!(a.to_string_lossy().ends_with(".staging"));
        assert_ne!(a, b);
    }

    #[test]
    fn generated_repo_ids_pass_the_charset_check() {
        let id = new_repo_id();
        assert_eq!(id.len(), 32);
        assert!(is_safe_name(&id));
    }
}
