use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Timestamp format used by manifests and the settings blob.
pub const MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Repository ids double as cache folder names, so they are restricted to a
/// filesystem-safe charset. Generated ids always satisfy this; ids read back
/// from settings are checked against it. The same rule guards folder names
/// supplied for sideloaded installs.
static SAFE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._-]+$").expect("valid regex"));

pub fn is_safe_name(name: &str) -> bool {
    !name.starts_with('.') && SAFE_NAME_RE.is_match(name)
}

/// One remote plugin repository as held in memory: manifest metadata plus the
/// local id and enabled flag that never leave this machine.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoSpec {
    /// Manifest schema version the remote declared.
    pub version: f64,
    pub label: String,
    /// Locally generated identifier, also the cache folder name.
    pub id: String,
    /// Human-facing home page of the repository.
    pub url: String,
    /// Manifest document URL. The one field a user must supply.
    pub manifest: String,
    pub logo: String,
    /// Plugin bundle archive URL. Empty means the repository ships no bundle.
    pub zip: String,
    /// Expected SHA-256 of the bundle, lowercase or uppercase hex.
    pub checksum: String,
    /// Last remote modification, Unix epoch when the manifest omitted it.
    pub modified: DateTime<Utc>,
    pub enabled: bool,
}

impl Default for RepoSpec {
    fn default() -> Self {
        Self {
            version: 1.0,
            label: String::new(),
            id: String::new(),
            url: String::new(),
            manifest: String::new(),
            logo: String::new(),
            zip: String::new(),
            checksum: String::new(),
            modified: DateTime::UNIX_EPOCH,
            enabled: false,
        }
    }
}

impl RepoSpec {
    /// A repository is usable once it has a safe id and a fetchable manifest
    /// URL. Everything else is filled in from the manifest itself.
    pub fn is_valid(&self) -> bool {
        is_safe_name(&self.id) && is_fetchable_url(&self.manifest)
    }

    pub fn has_bundle(&self) -> bool {
        !self.zip.is_empty()
    }

    /// Whether `next` (a freshly parsed manifest) carries assets we do not
    /// have yet: a different bundle checksum or URL, or a newer timestamp.
    pub fn assets_changed(&self, next: &RepoSpec) -> bool {
        self.checksum != next.checksum
            || self.zip != next.zip
            || next.modified > self.modified
    }

    pub fn label_or_id(&self) -> &str {
        if self.label.is_empty() { &self.id } else { &self.label }
    }
}

pub fn is_fetchable_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Persistence shape of a repository entry inside the settings blob. Every
/// field is optional on read; unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoRecord {
    pub version: f64,
    pub label: String,
    pub id: String,
    pub url: String,
    pub manifest: String,
    pub logo: String,
    pub zip: String,
    pub checksum: String,
    /// Formatted with [`MODIFIED_FORMAT`].
    pub modified: String,
    pub enabled: bool,
}

impl Default for RepoRecord {
    fn default() -> Self {
        Self {
            version: 1.0,
            label: String::new(),
            id: String::new(),
            url: String::new(),
            manifest: String::new(),
            logo: String::new(),
            zip: String::new(),
            checksum: String::new(),
            modified: String::new(),
            enabled: false,
        }
    }
}

pub fn parse_modified(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text.trim(), MODIFIED_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format_modified(stamp: &DateTime<Utc>) -> String {
    stamp.format(MODIFIED_FORMAT).to_string()
}

impl From<&RepoSpec> for RepoRecord {
    fn from(spec: &RepoSpec) -> Self {
        Self {
            version: spec.version,
            label: spec.label.clone(),
            id: spec.id.clone(),
            url: spec.url.clone(),
            manifest: spec.manifest.clone(),
            logo: spec.logo.clone(),
            zip: spec.zip.clone(),
            checksum: spec.checksum.clone(),
            modified: format_modified(&spec.modified),
            enabled: spec.enabled,
        }
    }
}

impl From<RepoRecord> for RepoSpec {
    fn from(record: RepoRecord) -> Self {
        Self {
            version: record.version,
            label: record.label,
            id: record.id,
            url: record.url,
            manifest: record.manifest,
            logo: record.logo,
            zip: record.zip,
            checksum: record.checksum,
            modified: parse_modified(&record.modified).unwrap_or(DateTime::UNIX_EPOCH),
            enabled: record.enabled,
        }
    }
}
