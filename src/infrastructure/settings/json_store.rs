use std::io;
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::application::ports::settings_store::SettingsStore;
use crate::domain::repo::RepoRecord;

/// Settings key the repository list lives under.
pub const REPOSITORIES_KEY: &str = "repositories";

/// Repository list persistence in a JSON settings file. The file is treated
/// as a shared blob: only the repositories key is ours, everything else in
/// it is preserved across saves.
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn read_blob(&self) -> anyhow::Result<Map<String, Value>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read settings {}", self.path.display()))
            }
        };
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("parse settings {}", self.path.display()))?;
        match value {
            Value::Object(map) => Ok(map),
            _ => anyhow::bail!("settings {} is not an object", self.path.display()),
        }
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn load_repository_list(&self) -> anyhow::Result<Vec<RepoRecord>> {
        let blob = self.read_blob().await?;
        let entries = match blob.get(REPOSITORIES_KEY) {
            Some(Value::Array(entries)) => entries.clone(),
            Some(_) => {
                warn!(path = %self.path.display(), "settings_repositories_not_a_list");
                return Ok(Vec::new());
            }
            None => return Ok(Vec::new()),
        };

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<RepoRecord>(entry) {
                Ok(record) => records.push(record),
                // One bad entry must not take the rest of the list with it.
                Err(err) => warn!(error = ?err, "settings_repository_entry_skipped"),
            }
        }
        Ok(records)
    }

    async fn save_repository_list(&self, repos: &[RepoRecord]) -> anyhow::Result<()> {
        let mut blob = match self.read_blob().await {
            Ok(blob) => blob,
            Err(err) => {
                // An unreadable blob gets replaced rather than blocking saves.
                warn!(error = ?err, "settings_blob_reset_on_save");
                Map::new()
            }
        };
        blob.insert(REPOSITORIES_KEY.to_string(), json!(repos));

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create settings dir {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(&Value::Object(blob))?;
        tokio::fs::write(&self.path, text)
            .await
            .with_context(|| format!("write settings {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn record(id: &str, manifest: &str) -> RepoRecord {
        RepoRecord {
            id: id.to_string(),
            manifest: manifest.to_string(),
            enabled: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty_list() {
        let tmp = TempDir::new().unwrap();
        let store = JsonSettingsStore::new(tmp.path().join("settings.json"));
        assert!(store.load_repository_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let store = JsonSettingsStore::new(tmp.path().join("nested/settings.json"));

        let repos = vec![
            record("a1", "https://x.test/a.json"),
            record("b2", "https://x.test/b.json"),
        ];
        store.save_repository_list(&repos).await.unwrap();
        let loaded = store.load_repository_list().await.unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "a1");
        assert_eq!(loaded[1].manifest, "https://x.test/b.json");

        // Saving what was loaded changes nothing.
        store.save_repository_list(&loaded).await.unwrap();
        let again = store.load_repository_list().await.unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(again[0].id, loaded[0].id);
    }

    #[tokio::test]
    async fn corrupt_entries_are_dropped_individually() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"repositories": [
                {"id": "good", "manifest": "https://x.test/m.json"},
                "not an object",
                {"id": 42}
            ]}"#,
        )
        .unwrap();

        let store = JsonSettingsStore::new(path);
        let loaded = store.load_repository_list().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "good");
    }

    #[tokio::test]
    async fn foreign_settings_keys_survive_a_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, r#"{"theme": "dark", "repositories": []}"#).unwrap();

        let store = JsonSettingsStore::new(path.clone());
        store
            .save_repository_list(&[record("a1", "https://x.test/a.json")])
            .await
            .unwrap();

        let blob: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(blob["theme"], "dark");
        assert_eq!(blob["repositories"][0]["id"], "a1");
    }
}
