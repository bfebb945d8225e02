use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::plugin::{self, PluginSpec, DEFAULT_GROUP};
use crate::infrastructure::fs::descriptor::{self, DESCRIPTOR_FILE};

/// Build the spec for a single candidate folder, or `None` when the folder
/// is not a plugin. Cheap id probe first; the full descriptor parse only
/// runs on folders that already look like plugins.
pub fn plugin_specs(dir: &Path, writable: bool) -> Option<PluginSpec> {
    let file = dir.join(DESCRIPTOR_FILE);
    if !file.is_file() {
        return None;
    }
    let id = descriptor::read_key(&file, "id").unwrap_or_default();
    if id.is_empty() {
        debug!(path = %dir.display(), "descriptor_without_id_skipped");
        return None;
    }
    let desc = match descriptor::load(&file) {
        Ok(desc) => desc,
        Err(err) => {
            warn!(error = ?err, path = %dir.display(), "descriptor_unreadable");
            return None;
        }
    };
    if desc.id.is_empty() {
        return None;
    }

    let folder = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let label = if desc.label.is_empty() { folder.clone() } else { desc.label };
    let group = if desc.group.is_empty() { DEFAULT_GROUP.to_string() } else { desc.group };

    Some(PluginSpec {
        id: desc.id,
        label,
        version: desc.version,
        icon: desc.icon,
        group,
        desc: desc.desc,
        path: dir.to_path_buf(),
        folder,
        writable,
    })
}

/// Walk `root` and collect every plugin underneath it. Unreadable entries
/// are skipped with a warning; a missing root is an empty result, not an
/// error. Duplicate ids within one pass resolve last-writer-wins in
/// traversal order.
pub fn scan_blocking(root: &Path, writable: bool) -> Vec<PluginSpec> {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    if !root.is_dir() {
        debug!(path = %root.display(), "scan_root_missing");
        return Vec::new();
    }

    let mut found: Vec<PluginSpec> = Vec::new();
    for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = ?err, "scan_entry_unreadable");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(spec) = plugin_specs(entry.path(), writable) {
            debug!(id = %spec.id, path = %entry.path().display(), "plugin_discovered");
            match found.iter_mut().find(|p| p.id == spec.id) {
                Some(slot) => *slot = spec,
                None => found.push(spec),
            }
        }
    }
    found.sort_by(plugin::catalog_order);
    found
}

/// Async wrapper; the walk itself is synchronous filesystem work.
pub async fn scan(root: PathBuf, writable: bool) -> Vec<PluginSpec> {
    match tokio::task::spawn_blocking(move || scan_blocking(&root, writable)).await {
        Ok(found) => found,
        Err(err) => {
            warn!(error = ?err, "scan_task_failed");
            Vec::new()
        }
    }
}

/// Whether `dir` itself is a plugin folder.
pub fn folder_has_plugin(dir: &Path) -> bool {
    plugin_specs(dir, false).is_some()
}

/// Number of plugins anywhere under `dir`.
pub fn folder_plugin_count(dir: &Path) -> usize {
    scan_blocking(dir, false).len()
}
