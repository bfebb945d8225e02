use async_trait::async_trait;

use crate::domain::repo::RepoRecord;

/// Host-provided persistence for the repository list. The store owns layout
/// and durability; the manager only ever sees whole lists.
///
/// A missing underlying store must read as an empty list, not an error.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_repository_list(&self) -> anyhow::Result<Vec<RepoRecord>>;
    async fn save_repository_list(&self, repos: &[RepoRecord]) -> anyhow::Result<()>;
}
