use std::path::Path;

use anyhow::Context;
use serde_json::Value;

use crate::domain::repo::{self, RepoSpec};

/// Required top-level key of every manifest document.
pub const ROOT_KEY: &str = "repo";

/// Only manifest generation we know how to read. Version dispatch goes over
/// the integer part, so 1.x documents all land here.
const SUPPORTED_VERSION: i64 = 1;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unsupported manifest version")]
    UnsupportedVersion,
    #[error("malformed manifest: {0}")]
    MalformedManifest(&'static str),
    #[error("empty manifest document")]
    EmptyManifest,
}

/// Schema version a manifest declares, if it declares one at all. Usable on
/// documents we cannot otherwise parse.
pub fn manifest_version(text: &str) -> Option<f64> {
    let doc: Value = serde_json::from_str(text).ok()?;
    doc.get(ROOT_KEY)?.get("version")?.as_f64()
}

pub fn is_valid_manifest(text: &str) -> bool {
    parse_manifest(text).is_ok()
}

/// Parse a manifest document into repository metadata. The result carries no
/// local state: `id` is empty and `enabled` is false until the caller merges
/// it into a known repository entry.
pub fn parse_manifest(text: &str) -> Result<RepoSpec, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyManifest);
    }
    let doc: Value = serde_json::from_str(text)
        .map_err(|_| ParseError::MalformedManifest("not a well-formed document"))?;
    let root = doc
        .get(ROOT_KEY)
        .ok_or(ParseError::MalformedManifest("missing repo object"))?;
    let version = root
        .get("version")
        .and_then(Value::as_f64)
        .ok_or(ParseError::UnsupportedVersion)?;

    match version.trunc() as i64 {
        SUPPORTED_VERSION => parse_v1(root, version),
        _ => Err(ParseError::UnsupportedVersion),
    }
}

fn parse_v1(root: &Value, version: f64) -> Result<RepoSpec, ParseError> {
    let label = required(root, "title", "missing repository title")?;
    let url = required(root, "url", "missing repository url")?;

    let zip = text_field(root, "zip");
    let checksum = text_field(root, "checksum");
    if !zip.is_empty() && checksum.is_empty() {
        return Err(ParseError::MalformedManifest("bundle without checksum"));
    }

    let modified = root
        .get("modified")
        .and_then(Value::as_str)
        .and_then(repo::parse_modified)
        .unwrap_or(chrono::DateTime::UNIX_EPOCH);

    Ok(RepoSpec {
        version,
        label,
        url,
        manifest: text_field(root, "manifest"),
        logo: text_field(root, "logo"),
        zip,
        checksum,
        modified,
        ..Default::default()
    })
}

fn required(root: &Value, key: &str, reason: &'static str) -> Result<String, ParseError> {
    let value = text_field(root, key);
    if value.is_empty() {
        Err(ParseError::MalformedManifest(reason))
    } else {
        Ok(value)
    }
}

fn text_field(root: &Value, key: &str) -> String {
    root.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Read and parse a manifest already on disk, e.g. a copy kept next to the
/// repository cache.
pub async fn open_manifest(path: &Path) -> anyhow::Result<RepoSpec> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read manifest {}", path.display()))?;
    parse_manifest(&text).with_context(|| format!("parse manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(version: &str) -> String {
        format!(
            r#"{{"repo": {{
                "version": {version},
                "title": "Community Plugins",
                "url": "https://plugins.example.org",
                "manifest": "https://plugins.example.org/manifest.json",
                "logo": "https://plugins.example.org/logo.png",
                "zip": "https://plugins.example.org/bundle.zip",
                "checksum": "AB12cd34",
                "modified": "2024-03-01 12:30"
            }}}}"#
        )
    }

    #[test]
    fn parses_v1_document() {
        let spec = parse_manifest(&sample("1")).unwrap();
        assert_eq!(spec.label, "Community Plugins");
        assert_eq!(spec.url, "https://plugins.example.org");
        assert_eq!(spec.zip, "https://plugins.example.org/bundle.zip");
        assert_eq!(spec.checksum, "AB12cd34");
        assert_eq!(spec.modified, repo::parse_modified("2024-03-01 12:30").unwrap());
        // Local fields stay local.
        assert!(spec.id.is_empty());
        assert!(!spec.enabled);
    }

    #[test]
    fn fractional_versions_dispatch_on_integer_part() {
        assert!(parse_manifest(&sample("1.9")).is_ok());
        assert_eq!(manifest_version(&sample("1.9")), Some(1.9));
    }

    #[test]
    fn future_version_is_rejected_before_field_validation() {
        // Version 2 with fields v1 would reject; the version check wins.
        let doc = r#"{"repo": {"version": 2, "zip": "https://x.test/b.zip"}}"#;
        assert_eq!(parse_manifest(doc), Err(ParseError::UnsupportedVersion));
    }

    #[test]
    fn missing_version_is_unsupported() {
        let doc = r#"{"repo": {"title": "X", "url": "https://x.test"}}"#;
        assert_eq!(parse_manifest(doc), Err(ParseError::UnsupportedVersion));
    }

    #[test]
    fn missing_root_object_is_malformed() {
        let doc = r#"{"version": 1, "title": "X"}"#;
        assert_eq!(
            parse_manifest(doc),
            Err(ParseError::MalformedManifest("missing repo object"))
        );
    }

    #[test]
    fn empty_document_is_its_own_error() {
        assert_eq!(parse_manifest(""), Err(ParseError::EmptyManifest));
        assert_eq!(parse_manifest("  \n\t"), Err(ParseError::EmptyManifest));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_manifest("<repo version=\"1\"/>"),
            Err(ParseError::MalformedManifest(_))
        ));
    }

    #[test]
    fn bundle_requires_checksum() {
        let doc = r#"{"repo": {"version": 1, "title": "X", "url": "https://x.test",
                       "zip": "https://x.test/b.zip"}}"#;
        assert_eq!(
            parse_manifest(doc),
            Err(ParseError::MalformedManifest("bundle without checksum"))
        );
    }

    #[test]
    fn bundle_free_manifest_is_fine_without_checksum() {
        let doc = r#"{"repo": {"version": 1, "title": "X", "url": "https://x.test"}}"#;
        let spec = parse_manifest(doc).unwrap();
        assert!(!spec.has_bundle());
        assert_eq!(spec.modified, chrono::DateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn open_manifest_reads_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("manifest.json");
        tokio::fs::write(&path, sample("1")).await.unwrap();

        let spec = open_manifest(&path).await.unwrap();
        assert_eq!(spec.label, "Community Plugins");
        assert!(open_manifest(&tmp.path().join("missing.json")).await.is_err());
    }

    #[test]
    fn unparseable_modified_falls_back_to_epoch() {
        let doc = r#"{"repo": {"version": 1, "title": "X", "url": "https://x.test",
                       "modified": "last tuesday"}}"#;
        assert_eq!(parse_manifest(doc).unwrap().modified, chrono::DateTime::UNIX_EPOCH);
    }
}
