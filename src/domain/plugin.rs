use std::cmp::Ordering;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Group assigned to plugins whose descriptor does not name one.
pub const DEFAULT_GROUP: &str = "Ungrouped";

/// One plugin as it exists in a catalog, either on disk (installed) or in a
/// repository cache mirror (available). Rebuilt from disk on every scan; the
/// struct itself carries no liveness guarantees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub id: String,
    pub label: String,
    pub version: f64,
    pub icon: String,
    pub group: String,
    pub desc: String,
    /// Absolute path of the plugin folder this spec was scanned from.
    pub path: PathBuf,
    /// Folder name (last path component), used as the install target name.
    pub folder: String,
    /// Whether the location the plugin lives in may be modified by us.
    pub writable: bool,
}

impl PluginSpec {
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && self.path.is_dir()
    }
}

/// Catalog order: case-insensitive label, id as the stable tie-breaker.
pub fn catalog_order(a: &PluginSpec, b: &PluginSpec) -> Ordering {
    let by_label = a.label.to_lowercase().cmp(&b.label.to_lowercase());
    if by_label == Ordering::Equal {
        a.id.cmp(&b.id)
    } else {
        by_label
    }
}

/// Outcome of a user-visible plugin operation. `message` is display text,
/// never an error code.
#[derive(Debug, Clone)]
pub struct PluginStatus {
    pub success: bool,
    pub message: String,
}

impl PluginStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// Classification of a plugin id against the two catalogs. Never stored,
/// recomputed on demand so it can't go stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginType {
    /// Unknown id: in neither catalog.
    None,
    /// Present in the available catalog only.
    Available,
    /// Installed, with no newer version on offer.
    Installed,
    /// Installed, and the available catalog carries a newer version.
    Update,
}

pub fn classify(id: &str, available: &[PluginSpec], installed: &[PluginSpec]) -> PluginType {
    match (find(available, id), find(installed, id)) {
        (None, None) => PluginType::None,
        (Some(_), None) => PluginType::Available,
        (None, Some(_)) => PluginType::Installed,
        (Some(remote), Some(local)) => {
            if remote.version > local.version {
                PluginType::Update
            } else {
                PluginType::Installed
            }
        }
    }
}

pub fn find<'a>(catalog: &'a [PluginSpec], id: &str) -> Option<&'a PluginSpec> {
    catalog.iter().find(|p| p.id == id)
}

/// Fold `incoming` into `catalog`. With `append` the existing entries are
/// kept and duplicates are replaced by id (last writer wins); without it the
/// catalog is rebuilt from `incoming` alone. The result is always sorted.
pub fn merge(catalog: &mut Vec<PluginSpec>, incoming: Vec<PluginSpec>, append: bool) {
    if !append {
        catalog.clear();
    }
    for spec in incoming {
        match catalog.iter_mut().find(|p| p.id == spec.id) {
            Some(slot) => *slot = spec,
            None => catalog.push(spec),
        }
    }
    catalog.sort_by(catalog_order);
}

/// Unique group labels present in `catalog`, sorted.
pub fn groups(catalog: &[PluginSpec]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for spec in catalog {
        if !out.iter().any(|g| g == &spec.group) {
            out.push(spec.group.clone());
        }
    }
    out.sort();
    out
}

pub fn in_group<'a>(catalog: &'a [PluginSpec], group: &str) -> Vec<&'a PluginSpec> {
    catalog.iter().filter(|p| p.group == group).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, label: &str, version: f64) -> PluginSpec {
        PluginSpec {
            id: id.to_string(),
            label: label.to_string(),
            version,
            group: DEFAULT_GROUP.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn classify_covers_all_catalog_combinations() {
        let available = vec![spec("a", "Alpha", 2.0), spec("b", "Beta", 1.0)];
        let installed = vec![spec("a", "Alpha", 1.0), spec("c", "Gamma", 1.0)];

        assert_eq!(classify("a", &available, &installed), PluginType::Update);
        assert_eq!(classify("b", &available, &installed), PluginType::Available);
        assert_eq!(classify("c", &available, &installed), PluginType::Installed);
        assert_eq!(classify("d", &available, &installed), PluginType::None);
    }

    #[test]
    fn classify_same_version_is_installed_not_update() {
        let available = vec![spec("a", "Alpha", 1.5)];
        let installed = vec![spec("a", "Alpha", 1.5)];
        assert_eq!(classify("a", &available, &installed), PluginType::Installed);
    }

    #[test]
    fn merge_replaces_by_id_and_keeps_catalog_sorted() {
        let mut catalog = vec![spec("b", "Zeta", 1.0), spec("a", "Alpha", 1.0)];
        merge(
            &mut catalog,
            vec![spec("b", "Beta", 2.0), spec("c", "Mid", 1.0)],
            true,
        );

        let ids: Vec<&str> = catalog.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(find(&catalog, "b").map(|p| p.version), Some(2.0));
    }

    #[test]
    fn merge_without_append_rebuilds() {
        let mut catalog = vec![spec("a", "Alpha", 1.0)];
        merge(&mut catalog, vec![spec("b", "Beta", 1.0)], false);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].id, "b");
    }

    #[test]
    fn ordering_ignores_label_case_and_falls_back_to_id() {
        let mut catalog = vec![
            spec("2", "beta", 1.0),
            spec("1", "Beta", 1.0),
            spec("0", "alpha", 1.0),
        ];
        catalog.sort_by(catalog_order);
        let ids: Vec<&str> = catalog.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
    }

    #[test]
    fn groups_are_unique_and_sorted() {
        let mut a = spec("a", "A", 1.0);
        a.group = "Filters".to_string();
        let mut b = spec("b", "B", 1.0);
        b.group = "Color".to_string();
        let mut c = spec("c", "C", 1.0);
        c.group = "Filters".to_string();

        let catalog = vec![a, b, c];
        assert_eq!(groups(&catalog), vec!["Color", "Filters"]);
        assert_eq!(in_group(&catalog, "Filters").len(), 2);
    }
}
