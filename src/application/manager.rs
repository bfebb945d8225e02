use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::download::{
    DownloadQueue, TransferEvent, TransferKind, TransferRequest,
};
use crate::application::events::{ManagerEvent, Notifier};
use crate::application::manifest;
use crate::application::ports::http_transport::HttpTransport;
use crate::application::ports::settings_store::SettingsStore;
use crate::domain::plugin::{self, PluginSpec, PluginStatus, PluginType};
use crate::domain::repo::{RepoRecord, RepoSpec};
use crate::infrastructure::fs::{archive, layout, scanner};
use crate::infrastructure::fs::layout::Layout;

/// Which of the two catalogs an accessor should look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Available,
    Installed,
}

/// Re-entrancy token for the refresh cycle. Acquired once per cycle and
/// released on drop, so every exit path clears the flag.
struct WorkGuard {
    flag: Arc<AtomicBool>,
}

impl WorkGuard {
    fn try_acquire(flag: Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Top-level façade over repositories, catalogs and installs. All catalog
/// mutation happens through `&mut self`, so background work (transfers,
/// extraction, scans) hands its results back here instead of touching the
/// catalogs directly.
pub struct PluginManager {
    layout: Layout,
    settings: Arc<dyn SettingsStore>,
    notifier: Notifier,
    queue: DownloadQueue,
    transfers: mpsc::UnboundedReceiver<TransferEvent>,
    repositories: Vec<RepoSpec>,
    available: Vec<PluginSpec>,
    installed: Vec<PluginSpec>,
    working: Arc<AtomicBool>,
}

impl PluginManager {
    /// Wire up a manager. Spawns the download worker, so this needs a tokio
    /// runtime. Catalogs start empty; call [`load_repositories`] and the
    /// scan operations to populate them.
    ///
    /// [`load_repositories`]: PluginManager::load_repositories
    pub fn new(
        layout: Layout,
        transport: Arc<dyn HttpTransport>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let (queue, transfers) = DownloadQueue::new(transport);
        Self {
            layout,
            settings,
            notifier: Notifier::default(),
            queue,
            transfers,
            repositories: Vec::new(),
            available: Vec::new(),
            installed: Vec::new(),
            working: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Every subscriber sees every event from the moment it subscribes.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ManagerEvent> {
        self.notifier.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.working.load(Ordering::Acquire) || self.queue.is_busy()
    }

    pub fn remove_from_download_queue(&self, url: &str) -> bool {
        self.queue.remove(url)
    }

    // ---- repository lifecycle ------------------------------------------

    pub fn repositories(&self) -> &[RepoSpec] {
        &self.repositories
    }

    /// Read the repository list from the settings store. Entries that come
    /// back invalid are dropped one by one; the rest of the list survives.
    pub async fn load_repositories(&mut self) -> anyhow::Result<()> {
        let records = self.settings.load_repository_list().await?;
        self.repositories.clear();
        for record in records {
            let spec = RepoSpec::from(record);
            if spec.is_valid() {
                debug!(repo_id = %spec.id, "repository_loaded");
                self.repositories.push(spec);
            } else {
                warn!(repo_id = %spec.id, manifest = %spec.manifest, "repository_entry_dropped");
            }
        }
        Ok(())
    }

    pub async fn save_repositories(&self) -> anyhow::Result<()> {
        let records: Vec<RepoRecord> = self.repositories.iter().map(RepoRecord::from).collect();
        self.settings.save_repository_list(&records).await
    }

    /// Register a new repository by its manifest URL. The id is generated
    /// here and never changes afterwards.
    pub async fn add_repository(&mut self, manifest_url: &str) -> anyhow::Result<RepoSpec> {
        let spec = RepoSpec {
            id: layout::new_repo_id(),
            manifest: manifest_url.trim().to_string(),
            enabled: true,
            ..Default::default()
        };
        if !spec.is_valid() {
            anyhow::bail!("not a fetchable manifest URL: {manifest_url}");
        }
        info!(repo_id = %spec.id, manifest = %spec.manifest, "repository_added");
        self.repositories.push(spec.clone());
        self.save_repositories().await?;
        Ok(spec)
    }

    /// Drop a repository and its cache mirror. Unknown ids are a no-op.
    pub async fn remove_repository(&mut self, id: &str) -> anyhow::Result<()> {
        let before = self.repositories.len();
        self.repositories.retain(|r| r.id != id);
        if self.repositories.len() == before {
            return Ok(());
        }
        self.save_repositories().await?;

        let mirror = self.layout.repo_dir(id);
        if let Err(err) = tokio::fs::remove_dir_all(&mirror).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(error = ?err, repo_id = id, "repository_mirror_cleanup_failed");
            }
        }
        let _ = tokio::fs::remove_file(self.layout.repo_logo_file(id)).await;
        info!(repo_id = id, "repository_removed");
        self.rebuild_available_catalog(true, false).await;
        Ok(())
    }

    pub async fn set_repository_enabled(&mut self, id: &str, enabled: bool) -> anyhow::Result<()> {
        let Some(repo) = self.repositories.iter_mut().find(|r| r.id == id) else {
            anyhow::bail!("unknown repository {id}");
        };
        repo.enabled = enabled;
        self.save_repositories().await
    }

    // ---- refresh cycle --------------------------------------------------

    /// Refresh every enabled repository: fetch its manifest, and when the
    /// bundle assets changed, its logo and archive too. Returns false when
    /// a cycle is already running; the request is dropped, not queued.
    pub async fn check_repositories(&mut self, emit_changes: bool, emit_cache: bool) -> bool {
        let Some(_guard) = WorkGuard::try_acquire(self.working.clone()) else {
            warn!("repository_check_rejected_already_working");
            return false;
        };
        if self.queue.is_busy() {
            warn!("repository_check_rejected_queue_busy");
            return false;
        }

        self.notifier
            .publish(ManagerEvent::Status("Checking repositories".to_string()));

        let mut outstanding = 0usize;
        for repo in self.repositories.iter().filter(|r| r.enabled) {
            self.queue.enqueue(TransferRequest {
                url: repo.manifest.clone(),
                kind: TransferKind::Manifest,
                repo_id: repo.id.clone(),
            });
            outstanding += 1;
        }
        if outstanding == 0 {
            debug!("repository_check_nothing_enabled");
            self.rebuild_available_catalog(emit_changes, emit_cache).await;
            return true;
        }

        // One free retry per URL per cycle, for transient failures only.
        let mut retried: HashSet<String> = HashSet::new();

        while outstanding > 0 {
            let Some(event) = self.transfers.recv().await else {
                warn!("transfer_channel_closed_mid_cycle");
                break;
            };
            match event {
                TransferEvent::Progress { url, received, total, .. } => {
                    self.notifier.publish(ManagerEvent::DownloadProgress {
                        url,
                        received,
                        total,
                    });
                }
                TransferEvent::Completed { request, body, .. } => {
                    outstanding -= 1;
                    outstanding += self.apply_transfer(request, body).await;
                }
                TransferEvent::Failed { request, error, .. } => {
                    outstanding -= 1;
                    if error.is_transient() && retried.insert(request.url.clone()) {
                        debug!(url = %request.url, "transfer_retried_after_transient_failure");
                        self.queue.enqueue(request);
                        outstanding += 1;
                    } else {
                        let repo = self.repo_label(&request.repo_id);
                        self.notifier.publish(ManagerEvent::StatusError(format!(
                            "{repo}: download failed ({error})"
                        )));
                    }
                }
                TransferEvent::Cancelled { request, .. } => {
                    outstanding -= 1;
                    debug!(url = %request.url, "transfer_result_discarded");
                }
            }
        }

        if let Err(err) = self.save_repositories().await {
            warn!(error = ?err, "repository_list_save_failed");
        }
        self.rebuild_available_catalog(emit_changes, emit_cache).await;
        true
    }

    /// Fold one finished transfer into manager state. Returns how many
    /// follow-up transfers it enqueued.
    async fn apply_transfer(&mut self, request: TransferRequest, body: Vec<u8>) -> usize {
        match request.kind {
            TransferKind::Manifest => self.apply_manifest(&request.repo_id, &body),
            TransferKind::Logo => {
                let path = self.layout.repo_logo_file(&request.repo_id);
                if let Err(err) = tokio::fs::write(&path, &body).await {
                    warn!(error = ?err, repo_id = %request.repo_id, "logo_write_failed");
                }
                0
            }
            TransferKind::Archive => {
                self.apply_bundle(&request.repo_id, body).await;
                0
            }
        }
    }

    fn apply_manifest(&mut self, repo_id: &str, body: &[u8]) -> usize {
        let text = String::from_utf8_lossy(body);
        let parsed = match manifest::parse_manifest(&text) {
            Ok(parsed) => parsed,
            Err(err) => {
                let repo = self.repo_label(repo_id);
                warn!(repo_id, error = %err, "manifest_rejected");
                self.notifier
                    .publish(ManagerEvent::StatusError(format!("{repo}: {err}")));
                return 0;
            }
        };

        let mirror_empty = scanner::folder_plugin_count(&self.layout.repo_dir(repo_id)) == 0;
        let logo_missing = !self.layout.repo_logo_file(repo_id).is_file();
        let Some(repo) = self.repositories.iter_mut().find(|r| r.id == repo_id) else {
            // Repository removed while its manifest was on the wire.
            debug!(repo_id, "manifest_for_unknown_repository_discarded");
            return 0;
        };

        let changed = repo.assets_changed(&parsed) || mirror_empty;
        repo.version = parsed.version;
        repo.label = parsed.label;
        repo.url = parsed.url;
        repo.logo = parsed.logo;
        repo.zip = parsed.zip;
        repo.checksum = parsed.checksum;
        repo.modified = parsed.modified;
        if !parsed.manifest.is_empty() {
            // Manifests may announce their own relocation.
            repo.manifest = parsed.manifest;
        }

        let mut enqueued = 0;
        if !repo.logo.is_empty() && (changed || logo_missing) {
            self.queue.enqueue(TransferRequest {
                url: repo.logo.clone(),
                kind: TransferKind::Logo,
                repo_id: repo_id.to_string(),
            });
            enqueued += 1;
        }
        if changed && repo.has_bundle() {
            info!(repo_id, zip = %repo.zip, "repository_assets_changed");
            self.notifier.publish(ManagerEvent::Status(format!(
                "Downloading {}",
                repo.label_or_id()
            )));
            self.queue.enqueue(TransferRequest {
                url: repo.zip.clone(),
                kind: TransferKind::Archive,
                repo_id: repo_id.to_string(),
            });
            enqueued += 1;
        } else if !changed {
            debug!(repo_id, "repository_unchanged");
        }
        enqueued
    }

    async fn apply_bundle(&mut self, repo_id: &str, body: Vec<u8>) {
        let Some(repo) = self.repositories.iter().find(|r| r.id == repo_id) else {
            debug!(repo_id, "bundle_for_unknown_repository_discarded");
            return;
        };
        let label = repo.label_or_id().to_string();
        let checksum = repo.checksum.clone();
        let mirror = self.layout.repo_dir(repo_id);

        match archive::sync_bundle(&self.layout, body, mirror, checksum).await {
            Ok(count) => {
                info!(repo_id, plugins = count, "repository_mirror_updated");
                self.notifier
                    .publish(ManagerEvent::Status(format!("{label}: {count} plugins")));
            }
            Err(err) => {
                warn!(repo_id, error = %err, "repository_bundle_rejected");
                self.notifier
                    .publish(ManagerEvent::StatusError(format!("{label}: {err}")));
            }
        }
    }

    fn repo_label(&self, id: &str) -> String {
        self.repositories
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.label_or_id().to_string())
            .unwrap_or_else(|| id.to_string())
    }

    // ---- catalog scanning ----------------------------------------------

    /// Rebuild the available catalog from every enabled repository mirror.
    async fn rebuild_available_catalog(&mut self, emit_changes: bool, emit_cache: bool) {
        let mut incoming = Vec::new();
        for repo in self.repositories.iter().filter(|r| r.enabled) {
            let mirror = self.layout.repo_dir(&repo.id);
            incoming.extend(scanner::scan(mirror, false).await);
        }
        plugin::merge(&mut self.available, incoming, false);
        self.finish_catalog_update(emit_changes, emit_cache).await;
    }

    pub async fn scan_for_available_plugins(
        &mut self,
        path: PathBuf,
        append: bool,
        emit_changes: bool,
        emit_cache: bool,
    ) {
        let found = scanner::scan(path, false).await;
        plugin::merge(&mut self.available, found, append);
        self.finish_catalog_update(emit_changes, emit_cache).await;
    }

    pub async fn scan_for_installed_plugins(&mut self, path: PathBuf, append: bool) {
        let writable = !self.layout.is_system_path(&path);
        let found = scanner::scan(path, writable).await;
        plugin::merge(&mut self.installed, found, append);
        self.notifier.publish(ManagerEvent::CatalogUpdated);
    }

    /// Rescan all install locations: the user directory plus every system
    /// directory. Disk is the source of truth after installs and removals.
    pub async fn rescan_installed(&mut self) {
        let mut found = scanner::scan(self.layout.user_plugin_dir().to_path_buf(), true).await;
        for dir in self.layout.system_plugin_dirs().to_vec() {
            found.extend(scanner::scan(dir, false).await);
        }
        plugin::merge(&mut self.installed, found, false);
        self.notifier.publish(ManagerEvent::CatalogUpdated);
    }

    async fn finish_catalog_update(&mut self, emit_changes: bool, emit_cache: bool) {
        if emit_changes {
            self.notifier.publish(ManagerEvent::CatalogUpdated);
        }
        if emit_cache {
            match self.write_catalog_cache().await {
                Ok(()) => self.notifier.publish(ManagerEvent::CacheUpdated),
                Err(err) => warn!(error = ?err, "catalog_cache_write_failed"),
            }
        }
    }

    async fn write_catalog_cache(&self) -> anyhow::Result<()> {
        let path = self.layout.catalog_cache_file();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = serde_json::to_string_pretty(&self.available)?;
        tokio::fs::write(&path, text).await?;
        Ok(())
    }

    /// Restore the available catalog from the last cache snapshot, for
    /// starts without network. Missing snapshot is an empty catalog.
    pub async fn load_catalog_cache(&mut self) -> anyhow::Result<()> {
        let path = self.layout.catalog_cache_file();
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let cached: Vec<PluginSpec> = serde_json::from_str(&text)?;
        plugin::merge(&mut self.available, cached, false);
        self.notifier.publish(ManagerEvent::CatalogUpdated);
        Ok(())
    }

    // ---- reconciliation accessors --------------------------------------

    pub fn available_plugins(&self) -> &[PluginSpec] {
        &self.available
    }

    pub fn installed_plugins(&self) -> &[PluginSpec] {
        &self.installed
    }

    /// Union of both catalogs in catalog order. An id present in both
    /// contributes its available entry, which carries the newest metadata.
    pub fn plugins(&self) -> Vec<&PluginSpec> {
        let mut merged: Vec<&PluginSpec> = self.available.iter().collect();
        for spec in &self.installed {
            if !merged.iter().any(|p| p.id == spec.id) {
                merged.push(spec);
            }
        }
        merged.sort_by(|a, b| plugin::catalog_order(a, b));
        merged
    }

    fn catalog(&self, kind: CatalogKind) -> &[PluginSpec] {
        match kind {
            CatalogKind::Available => &self.available,
            CatalogKind::Installed => &self.installed,
        }
    }

    /// Look an id up in either catalog, preferring the available entry
    /// because it carries the newest metadata.
    pub fn plugin(&self, id: &str) -> Option<&PluginSpec> {
        plugin::find(&self.available, id).or_else(|| plugin::find(&self.installed, id))
    }

    pub fn available_plugin(&self, id: &str) -> Option<&PluginSpec> {
        plugin::find(&self.available, id)
    }

    pub fn installed_plugin(&self, id: &str) -> Option<&PluginSpec> {
        plugin::find(&self.installed, id)
    }

    pub fn has_plugin(&self, id: &str) -> bool {
        self.plugin(id).is_some()
    }

    pub fn has_available_plugin(&self, id: &str) -> bool {
        self.available_plugin(id).is_some()
    }

    pub fn has_installed_plugin(&self, id: &str) -> bool {
        self.installed_plugin(id).is_some()
    }

    pub fn plugin_type(&self, id: &str) -> PluginType {
        plugin::classify(id, &self.available, &self.installed)
    }

    pub fn plugin_groups(&self, kind: CatalogKind) -> Vec<String> {
        plugin::groups(self.catalog(kind))
    }

    pub fn plugins_in_group(&self, kind: CatalogKind, group: &str) -> Vec<&PluginSpec> {
        plugin::in_group(self.catalog(kind), group)
    }

    // ---- install / remove / update -------------------------------------

    /// Install an available plugin into the user plugin directory. The
    /// plugin content comes from its repository mirror; a catalog entry
    /// whose mirror folder is gone (cache restored offline) asks for a
    /// repository check instead.
    pub async fn install_plugin(&mut self, id: &str) -> PluginStatus {
        let Some(spec) = plugin::find(&self.available, id).cloned() else {
            return PluginStatus::failed(format!("{id} is not an available plugin"));
        };
        if self.has_installed_plugin(id) {
            return PluginStatus::failed(format!("{} is already installed", spec.label));
        }
        if !spec.path.is_dir() {
            self.notifier.publish(ManagerEvent::DownloadRequired);
            return PluginStatus::failed(format!(
                "{} is not in the local cache yet; refresh repositories first",
                spec.label
            ));
        }

        let target = self.layout.user_plugin_dir().join(&spec.folder);
        let result = archive::install_folder(&self.layout, spec.path.clone(), target).await;
        self.rescan_installed().await;
        match result {
            Ok(installed) => {
                info!(plugin_id = id, version = installed.version, "plugin_installed");
                PluginStatus::ok(format!("{} {} installed", installed.label, installed.version))
            }
            Err(err) => {
                warn!(plugin_id = id, error = %err, "plugin_install_failed");
                PluginStatus::failed(format!("could not install {}: {err}", spec.label))
            }
        }
    }

    /// Delete an installed plugin's folder. System locations are refused;
    /// either way the installed catalog is rebuilt from disk afterwards.
    pub async fn remove_plugin(&mut self, id: &str) -> PluginStatus {
        let Some(spec) = plugin::find(&self.installed, id).cloned() else {
            return PluginStatus::failed(format!("{id} is not installed"));
        };

        let result = archive::remove_plugin(&self.layout, &spec).await;
        self.rescan_installed().await;
        match result {
            Ok(()) => {
                info!(plugin_id = id, "plugin_removed");
                PluginStatus::ok(format!("{} removed", spec.label))
            }
            Err(err) => {
                warn!(plugin_id = id, error = %err, "plugin_remove_failed");
                PluginStatus::failed(format!("could not remove {}: {err}", spec.label))
            }
        }
    }

    /// Replace an installed plugin with the version the available catalog
    /// offers: remove, then install.
    pub async fn update_plugin(&mut self, id: &str) -> PluginStatus {
        if !self.has_available_plugin(id) {
            return PluginStatus::failed(format!("{id} has no available version"));
        }
        if self.has_installed_plugin(id) {
            let removed = self.remove_plugin(id).await;
            if !removed.success {
                return removed;
            }
        }
        self.install_plugin(id).await
    }

    /// Install a plugin archive supplied by the caller, outside any
    /// repository (a sideloaded zip). `folder` names the install folder.
    pub async fn install_archive(
        &mut self,
        bytes: Vec<u8>,
        folder: &str,
        expected_checksum: Option<String>,
    ) -> PluginStatus {
        if !crate::domain::repo::is_safe_name(folder) {
            return PluginStatus::failed(format!("{folder} is not a usable folder name"));
        }
        let target = self.layout.user_plugin_dir().join(folder);
        let result = archive::install(&self.layout, bytes, target, expected_checksum).await;
        self.rescan_installed().await;
        match result {
            Ok(installed) => {
                info!(plugin_id = %installed.id, "archive_installed");
                PluginStatus::ok(format!("{} {} installed", installed.label, installed.version))
            }
            Err(err) => {
                warn!(folder, error = %err, "archive_install_failed");
                PluginStatus::failed(format!("could not install archive: {err}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::application::ports::http_transport::{ProgressFn, TransferError};

    struct NoTransport;

    #[async_trait]
    impl HttpTransport for NoTransport {
        async fn fetch(
            &self,
            url: &str,
            _on_progress: ProgressFn<'_>,
        ) -> Result<Vec<u8>, TransferError> {
            Err(TransferError::Permanent {
                code: None,
                message: format!("unexpected fetch of {url}"),
            })
        }
    }

    struct NoStore;

    #[async_trait]
    impl SettingsStore for NoStore {
        async fn load_repository_list(&self) -> anyhow::Result<Vec<RepoRecord>> {
            Ok(Vec::new())
        }
        async fn save_repository_list(&self, _repos: &[RepoRecord]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn manager(tmp: &TempDir) -> PluginManager {
        let layout = Layout::new(
            tmp.path().join("user"),
            vec![tmp.path().join("system")],
            tmp.path().join("cache"),
        );
        PluginManager::new(layout, Arc::new(NoTransport), Arc::new(NoStore))
    }

    fn spec(id: &str, label: &str, version: f64) -> PluginSpec {
        PluginSpec {
            id: id.to_string(),
            label: label.to_string(),
            version,
            ..Default::default()
        }
    }

    #[test]
    fn work_guard_is_exclusive_and_releases_on_drop() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = WorkGuard::try_acquire(flag.clone()).unwrap();
        assert!(WorkGuard::try_acquire(flag.clone()).is_none());
        drop(guard);
        assert!(WorkGuard::try_acquire(flag).is_some());
    }

    #[tokio::test]
    async fn reconciliation_accessors_agree_with_classify() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = manager(&tmp);
        mgr.available = vec![spec("a", "Alpha", 2.0), spec("b", "Beta", 1.0)];
        mgr.installed = vec![spec("a", "Alpha", 1.0)];

        assert_eq!(mgr.plugin_type("a"), PluginType::Update);
        assert_eq!(mgr.plugin_type("b"), PluginType::Available);
        assert_eq!(mgr.plugin_type("zz"), PluginType::None);
        assert!(mgr.has_plugin("a"));
        assert!(mgr.has_available_plugin("b"));
        assert!(!mgr.has_installed_plugin("b"));
        // The available entry wins the combined lookup.
        assert_eq!(mgr.plugin("a").unwrap().version, 2.0);

        let union: Vec<(&str, f64)> = mgr.plugins().iter().map(|p| (p.id.as_str(), p.version)).collect();
        assert_eq!(union, vec![("a", 2.0), ("b", 1.0)]);
    }

    #[tokio::test]
    async fn group_accessors_split_by_catalog() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = manager(&tmp);
        let mut a = spec("a", "Alpha", 1.0);
        a.group = "Color".to_string();
        let mut b = spec("b", "Beta", 1.0);
        b.group = "Filters".to_string();
        mgr.available = vec![a, b];

        assert_eq!(mgr.plugin_groups(CatalogKind::Available), vec!["Color", "Filters"]);
        assert!(mgr.plugin_groups(CatalogKind::Installed).is_empty());
        assert_eq!(mgr.plugins_in_group(CatalogKind::Available, "Color").len(), 1);
    }

    #[tokio::test]
    async fn check_repositories_is_rejected_while_working() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = manager(&tmp);
        mgr.working.store(true, Ordering::Release);
        assert!(!mgr.check_repositories(false, false).await);
        mgr.working.store(false, Ordering::Release);
        // No repositories configured: a cycle is a cheap no-op that succeeds.
        assert!(mgr.check_repositories(false, false).await);
    }

    #[tokio::test]
    async fn install_of_uncached_available_plugin_asks_for_download() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = manager(&tmp);
        let mut ghost = spec("ghost", "Ghost", 1.0);
        ghost.path = tmp.path().join("cache/repos/r1/ghost");
        ghost.folder = "ghost".to_string();
        mgr.available = vec![ghost];

        let mut events = mgr.subscribe();
        let status = mgr.install_plugin("ghost").await;
        assert!(!status.success);
        loop {
            match events.try_recv() {
                Ok(ManagerEvent::DownloadRequired) => break,
                Ok(_) => continue,
                Err(err) => panic!("DownloadRequired never emitted: {err}"),
            }
        }
    }

    #[tokio::test]
    async fn add_repository_rejects_unfetchable_urls() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = manager(&tmp);
        assert!(mgr.add_repository("file:///etc/passwd").await.is_err());
        let added = mgr.add_repository("https://x.test/manifest.json").await.unwrap();
        assert!(added.enabled);
        assert_eq!(mgr.repositories().len(), 1);
        assert_eq!(mgr.repositories()[0].id, added.id);
    }
}
