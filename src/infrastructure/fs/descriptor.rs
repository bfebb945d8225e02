use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Deserializer};

/// File that marks a folder as a plugin and carries its metadata.
pub const DESCRIPTOR_FILE: &str = "plugin.toml";

/// Parsed descriptor contents. Everything except `id` is optional; the
/// scanner fills display fallbacks in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PluginDescriptor {
    pub id: String,
    pub label: String,
    #[serde(deserialize_with = "version_lenient")]
    pub version: f64,
    pub icon: String,
    pub group: String,
    pub desc: String,
}

/// Descriptors in the wild write versions as `1`, `1.2` or `"1.2"`.
fn version_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Float(f64),
        Int(i64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Float(v) => v,
        Raw::Int(v) => v as f64,
        Raw::Text(s) => s.trim().parse().unwrap_or(0.0),
    })
}

pub fn load(path: &Path) -> anyhow::Result<PluginDescriptor> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read descriptor {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parse descriptor {}", path.display()))
}

/// Fetch one top-level key from a descriptor without parsing the whole
/// document. Line oriented on purpose: scans probe thousands of folders and
/// most are not plugins at all.
pub fn read_key(path: &Path, key: &str) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    for line in text.lines() {
        let line = line.trim_start();
        if line.starts_with('#') {
            continue;
        }
        let Some(rest) = line.strip_prefix(key) else {
            continue;
        };
        // Guard against `key` being a prefix of a longer key.
        let rest = rest.trim_start();
        let Some(value) = rest.strip_prefix('=') else {
            continue;
        };
        return Some(unquote(value.trim()));
    }
    None
}

fn unquote(raw: &str) -> String {
    if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => break,
            }
        }
        out
    } else if let Some(inner) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        inner.to_string()
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write_descriptor(tmp: &TempDir, body: &str) -> std::path::PathBuf {
        let path = tmp.path().join(DESCRIPTOR_FILE);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn read_key_fetches_a_single_value() {
        let tmp = TempDir::new().unwrap();
        let path = write_descriptor(
            &tmp,
            "# sample descriptor\nid = \"denoise\"\nlabel = \"Denoise \\\"Pro\\\"\"\nversion = 1.2\n",
        );

        assert_eq!(read_key(&path, "id").as_deref(), Some("denoise"));
        assert_eq!(read_key(&path, "label").as_deref(), Some("Denoise \"Pro\""));
        assert_eq!(read_key(&path, "version").as_deref(), Some("1.2"));
        assert_eq!(read_key(&path, "missing"), None);
    }

    #[test]
    fn read_key_does_not_match_longer_keys() {
        let tmp = TempDir::new().unwrap();
        let path = write_descriptor(&tmp, "iconic = \"no\"\nicon = \"yes.png\"\n");
        assert_eq!(read_key(&path, "icon").as_deref(), Some("yes.png"));
    }

    #[test]
    fn load_accepts_numeric_and_text_versions() {
        let tmp = TempDir::new().unwrap();

        for (raw, expected) in [("1", 1.0), ("2.5", 2.5), ("\"3.1\"", 3.1)] {
            let path = write_descriptor(&tmp, &format!("id = \"p\"\nversion = {raw}\n"));
            let desc = load(&path).unwrap();
            assert_eq!(desc.version, expected, "version written as {raw}");
        }
    }

    #[test]
    fn load_defaults_missing_fields() {
        let tmp = TempDir::new().unwrap();
        let path = write_descriptor(&tmp, "id = \"bare\"\n");
        let desc = load(&path).unwrap();
        assert_eq!(desc.id, "bare");
        assert_eq!(desc.version, 0.0);
        assert!(desc.label.is_empty());
    }

    #[test]
    fn load_rejects_broken_toml() {
        let tmp = TempDir::new().unwrap();
        let path = write_descriptor(&tmp, "id = \"broken\nlabel = oops\n");
        assert!(load(&path).is_err());
        // The cheap probe still finds nothing useful on a broken line.
        assert_eq!(read_key(&path, "label").as_deref(), Some("oops"));
    }
}
