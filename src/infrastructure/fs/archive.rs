use std::fmt::Write as _;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::plugin::PluginSpec;
use crate::infrastructure::fs::layout::{Layout, ResourceError};
use crate::infrastructure::fs::scanner;

#[derive(thiserror::Error, Debug)]
pub enum IntegrityError {
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

#[derive(thiserror::Error, Debug)]
pub enum InstallError {
    #[error("invalid plugin package: {0}")]
    InvalidPackage(String),
    #[error("cannot write {path}: {source}")]
    WriteDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path} is not writable")]
    NotWritable { path: PathBuf },
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn checksum_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Hex comparison is case-insensitive; manifests publish either case.
pub fn verify_checksum(bytes: &[u8], expected: &str) -> Result<(), IntegrityError> {
    let expected = expected.trim();
    let actual = checksum_hex(bytes);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(IntegrityError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Install a single-plugin archive at `target` (the final plugin folder).
/// The archive is verified, extracted into scratch space, validated, and
/// only then promoted; `target` is never left half-written.
pub async fn install(
    layout: &Layout,
    bytes: Vec<u8>,
    target: PathBuf,
    expected_checksum: Option<String>,
) -> Result<PluginSpec, InstallError> {
    let layout = layout.clone();
    run_blocking(move || install_blocking(&layout, &bytes, &target, expected_checksum.as_deref()))
        .await
}

fn install_blocking(
    layout: &Layout,
    bytes: &[u8],
    target: &Path,
    expected_checksum: Option<&str>,
) -> Result<PluginSpec, InstallError> {
    if let Some(expected) = expected_checksum.filter(|s| !s.trim().is_empty()) {
        verify_checksum(bytes, expected)?;
    }
    if target.exists() {
        return Err(InstallError::WriteDenied {
            path: target.to_path_buf(),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "target folder already exists"),
        });
    }

    let staging = stage_dir(layout)?;
    let result = (|| {
        extract_zip(bytes, &staging)?;
        let root = plugin_root(&staging)?;
        promote(&root, target)?;
        scanner::plugin_specs(target, !layout.is_system_path(target)).ok_or_else(|| {
            InstallError::InvalidPackage("descriptor unreadable after install".to_string())
        })
    })();
    discard(&staging);
    result
}

/// Install a plugin by copying an already-extracted folder (a repository
/// cache mirror entry) into `target`. Same staging discipline as archive
/// installs so a failed copy never leaves a partial target.
pub async fn install_folder(
    layout: &Layout,
    source: PathBuf,
    target: PathBuf,
) -> Result<PluginSpec, InstallError> {
    let layout = layout.clone();
    run_blocking(move || {
        if scanner::plugin_specs(&source, false).is_none() {
            return Err(InstallError::InvalidPackage(format!(
                "{} is not a plugin folder",
                source.display()
            )));
        }
        if target.exists() {
            return Err(InstallError::WriteDenied {
                path: target.clone(),
                source: io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "target folder already exists",
                ),
            });
        }
        let staging = stage_dir(&layout)?;
        let result = (|| {
            copy_tree(&source, &staging)?;
            promote(&staging, &target)?;
            scanner::plugin_specs(&target, !layout.is_system_path(&target)).ok_or_else(|| {
                InstallError::InvalidPackage("descriptor unreadable after install".to_string())
            })
        })();
        discard(&staging);
        result
    })
    .await
}

/// Replace a repository's cache mirror with the contents of its bundle
/// archive. The old mirror is kept aside until the new one is in place and
/// restored if the swap fails. Returns how many plugins the bundle carries.
pub async fn sync_bundle(
    layout: &Layout,
    bytes: Vec<u8>,
    repo_dir: PathBuf,
    expected_checksum: String,
) -> Result<usize, InstallError> {
    let layout = layout.clone();
    run_blocking(move || {
        verify_checksum(&bytes, &expected_checksum)?;

        let staging = stage_dir(&layout)?;
        let extracted = (|| {
            extract_zip(&bytes, &staging)?;
            let count = scanner::scan_blocking(&staging, false).len();
            if count == 0 {
                return Err(InstallError::InvalidPackage(
                    "bundle contains no plugins".to_string(),
                ));
            }
            Ok(count)
        })();
        let count = match extracted {
            Ok(count) => count,
            Err(err) => {
                discard(&staging);
                return Err(err);
            }
        };

        if let Some(parent) = repo_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let backup = layout.random_name(&layout.temp_dir(), ".old")?;
        let had_previous = repo_dir.exists();
        if had_previous {
            std::fs::rename(&repo_dir, &backup).map_err(|source| InstallError::WriteDenied {
                path: repo_dir.clone(),
                source,
            })?;
        }
        match std::fs::rename(&staging, &repo_dir) {
            Ok(()) => {
                if had_previous {
                    discard(&backup);
                }
                Ok(count)
            }
            Err(source) => {
                if had_previous {
                    if let Err(err) = std::fs::rename(&backup, &repo_dir) {
                        warn!(error = ?err, path = %repo_dir.display(), "mirror_restore_failed");
                    }
                }
                discard(&staging);
                Err(InstallError::WriteDenied { path: repo_dir, source })
            }
        }
    })
    .await
}

/// Delete an installed plugin's folder. Refuses to touch read-only system
/// locations; a folder already gone counts as removed.
pub async fn remove_plugin(layout: &Layout, spec: &PluginSpec) -> Result<(), InstallError> {
    if !spec.writable || layout.is_system_path(&spec.path) {
        return Err(InstallError::NotWritable { path: spec.path.clone() });
    }
    match tokio::fs::remove_dir_all(&spec.path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(InstallError::Io(err)),
    }
}

async fn run_blocking<T>(
    work: impl FnOnce() -> Result<T, InstallError> + Send + 'static,
) -> Result<T, InstallError>
where
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| InstallError::Io(io::Error::other(err)))?
}

fn stage_dir(layout: &Layout) -> Result<PathBuf, InstallError> {
    let temp = layout.ensure_temp_dir()?;
    let staging = layout.random_name(&temp, ".staging")?;
    std::fs::create_dir_all(&staging)?;
    Ok(staging)
}

/// Locate the plugin folder inside freshly extracted content: either the
/// descriptor sits at the extraction root, or the archive wraps everything
/// in exactly one folder.
fn plugin_root(staging: &Path) -> Result<PathBuf, InstallError> {
    if scanner::folder_has_plugin(staging) {
        return Ok(staging.to_path_buf());
    }
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(staging)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    match dirs.as_slice() {
        [single] if scanner::folder_has_plugin(single) => Ok(single.clone()),
        _ => Err(InstallError::InvalidPackage(
            "archive does not contain a plugin folder".to_string(),
        )),
    }
}

/// Atomic move with a copy fallback for targets on another filesystem. On
/// any failure the target is removed again so it is never half-written.
fn promote(staged: &Path, target: &Path) -> Result<(), InstallError> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|source| InstallError::WriteDenied {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    match std::fs::rename(staged, target) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!(error = ?rename_err, "promote_rename_failed_falling_back_to_copy");
            match copy_tree(staged, target) {
                Ok(()) => Ok(()),
                Err(copy_err) => {
                    discard(target);
                    Err(InstallError::WriteDenied {
                        path: target.to_path_buf(),
                        source: copy_err,
                    })
                }
            }
        }
    }
}

fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let out = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&out)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &out)?;
        }
        // Symlinks are dropped, same as during extraction.
    }
    Ok(())
}

fn extract_zip(bytes: &[u8], dest: &Path) -> Result<(), InstallError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| InstallError::InvalidPackage(err.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| InstallError::InvalidPackage(err.to_string()))?;
        let Some(rel) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            warn!(name = entry.name(), "zip_entry_skipped_unsafe_path");
            continue;
        };
        if let Some(mode) = entry.unix_mode() {
            // S_IFLNK; symlinks could point outside the staging folder.
            if mode & 0o170000 == 0o120000 {
                warn!(name = entry.name(), "zip_entry_skipped_symlink");
                continue;
            }
        }
        let out = dest.join(rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(&out)?;
        io::copy(&mut entry, &mut file)?;
    }
    Ok(())
}

fn discard(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(err) = std::fs::remove_dir_all(path) {
        warn!(error = ?err, path = %path.display(), "scratch_cleanup_failed");
    }
}
