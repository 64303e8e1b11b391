//! Persistent highlight storage, partitioned per site.

use mg_core::MarginaliaError;
use mg_core::MarginaliaResult;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub partition_by_site: bool,
    pub ephemeral_mode: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            partition_by_site: true,
            ephemeral_mode: false,
        }
    }
}

/// A captured selection and the page it was captured on. `record` is kept
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHighlight {
    pub url: String,
    pub record: String,
}

impl StoredHighlight {
    /// Host of `url`, used as the partition name.
    pub fn site(&self) -> MarginaliaResult<String> {
        site_of(&self.url)
    }
}

/// Host part of `url`.
pub fn site_of(url: &str) -> MarginaliaResult<String> {
    let parsed = Url::parse(url).map_err(|error| {
        MarginaliaError::new(
            "storage.url_invalid",
            format!("invalid highlight url `{url}`: {error}"),
        )
    })?;
    parsed.host_str().map(str::to_owned).ok_or_else(|| {
        MarginaliaError::new(
            "storage.url_without_host",
            format!("highlight url `{url}` has no host"),
        )
    })
}

#[derive(Debug, Clone)]
pub struct HighlightStore {
    pub config: StoreConfig,
    persistent_root: Option<PathBuf>,
}

impl HighlightStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            persistent_root: None,
        }
    }

    pub fn with_persistent_root(mut self, root: PathBuf) -> Self {
        self.persistent_root = Some(root);
        self
    }

    pub fn persistent_root(&self) -> Option<&Path> {
        self.persistent_root.as_deref()
    }

    /// Stores `highlight` under `note_id` in the partition of its site,
    /// replacing any previous entry.
    pub fn save(&self, note_id: &str, highlight: &StoredHighlight) -> MarginaliaResult<()> {
        let site = highlight.site()?;
        let path = self.partition_path(&site)?;
        let value = serde_json::to_string(highlight).map_err(|error| {
            MarginaliaError::new(
                "storage.highlight_encode_failed",
                format!("failed to encode highlight `{note_id}`: {error}"),
            )
        })?;

        let mut map = read_partition_map(&path)?;
        map.insert(note_id.to_owned(), value);
        write_partition_map(&path, &map)?;
        debug!(site = site.as_str(), note_id, "saved highlight");
        Ok(())
    }

    pub fn load(&self, site: &str, note_id: &str) -> MarginaliaResult<Option<StoredHighlight>> {
        let path = self.partition_path(site)?;
        let map = read_partition_map(&path)?;
        let Some(value) = map.get(note_id) else {
            return Ok(None);
        };

        serde_json::from_str(value).map(Some).map_err(|error| {
            MarginaliaError::new(
                "storage.highlight_decode_failed",
                format!("stored highlight `{note_id}` is not valid: {error}"),
            )
        })
    }

    /// Returns whether an entry was removed. Empty partitions are deleted.
    pub fn remove(&self, site: &str, note_id: &str) -> MarginaliaResult<bool> {
        let path = self.partition_path(site)?;
        let mut map = read_partition_map(&path)?;
        if map.remove(note_id).is_none() {
            return Ok(false);
        }

        if map.is_empty() {
            if path.exists() {
                fs::remove_file(&path).map_err(|error| {
                    MarginaliaError::new(
                        "storage.partition_remove_failed",
                        format!(
                            "failed removing empty partition file `{}`: {error}",
                            path.display()
                        ),
                    )
                })?;
            }
            return Ok(true);
        }

        write_partition_map(&path, &map)?;
        Ok(true)
    }

    /// Note ids stored for `site`, sorted.
    pub fn note_ids(&self, site: &str) -> MarginaliaResult<Vec<String>> {
        let path = self.partition_path(site)?;
        Ok(read_partition_map(&path)?.into_keys().collect())
    }

    fn partition_path(&self, site: &str) -> MarginaliaResult<PathBuf> {
        if self.config.ephemeral_mode {
            return Err(MarginaliaError::new(
                "storage.persistence_disabled",
                "persistent storage is disabled in ephemeral mode",
            ));
        }

        let root = self.persistent_root.as_ref().ok_or_else(|| {
            MarginaliaError::new(
                "storage.persistence_unconfigured",
                "persistent storage root is not configured",
            )
        })?;

        let partition = if self.config.partition_by_site {
            sanitize_partition_name(site)
        } else {
            "global".to_owned()
        };

        Ok(root.join("partitions").join(format!("{partition}.kv")))
    }
}

fn sanitize_partition_name(input: &str) -> String {
    let mut out = String::new();
    for ch in input.trim().to_ascii_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }

    if out.is_empty() {
        "unknown".to_owned()
    } else {
        out
    }
}

fn read_partition_map(path: &Path) -> MarginaliaResult<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let content = fs::read_to_string(path).map_err(|error| {
        MarginaliaError::new(
            "storage.partition_read_failed",
            format!(
                "failed to read partition file `{}`: {error}",
                path.display()
            ),
        )
    })?;

    let mut map = BTreeMap::new();
    for (index, line) in content.lines().enumerate() {
        if line.is_empty() {
            continue;
        }

        let (key_hex, value_hex) = line.split_once('\t').ok_or_else(|| {
            MarginaliaError::new(
                "storage.partition_format_invalid",
                format!(
                    "invalid record format at `{}` line {}",
                    path.display(),
                    index + 1
                ),
            )
        })?;

        map.insert(decode_hex_string(key_hex)?, decode_hex_string(value_hex)?);
    }

    Ok(map)
}

fn write_partition_map(path: &Path, map: &BTreeMap<String, String>) -> MarginaliaResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| {
            MarginaliaError::new(
                "storage.partition_dir_create_failed",
                format!(
                    "failed to create partition directory `{}`: {error}",
                    parent.display()
                ),
            )
        })?;
    }

    let mut encoded = String::new();
    for (key, value) in map {
        encoded.push_str(&encode_hex_string(key));
        encoded.push('\t');
        encoded.push_str(&encode_hex_string(value));
        encoded.push('\n');
    }

    fs::write(path, encoded).map_err(|error| {
        MarginaliaError::new(
            "storage.partition_write_failed",
            format!(
                "failed to write partition file `{}`: {error}",
                path.display()
            ),
        )
    })
}

fn encode_hex_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len().saturating_mul(2));
    for byte in value.as_bytes() {
        out.push(hex_char(byte >> 4));
        out.push(hex_char(byte & 0x0f));
    }
    out
}

fn decode_hex_string(value: &str) -> MarginaliaResult<String> {
    let digits = value.as_bytes();
    if digits.len() % 2 != 0 {
        return Err(MarginaliaError::new(
            "storage.partition_hex_invalid",
            "hex field length must be even",
        ));
    }

    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks(2) {
        bytes.push((decode_hex_nibble(pair[0])? << 4) | decode_hex_nibble(pair[1])?);
    }

    String::from_utf8(bytes).map_err(|error| {
        MarginaliaError::new(
            "storage.partition_utf8_invalid",
            format!("partition field is not valid UTF-8: {error}"),
        )
    })
}

fn hex_char(value: u8) -> char {
    match value {
        0..=9 => (b'0' + value) as char,
        10..=15 => (b'a' + (value - 10)) as char,
        _ => '0',
    }
}

fn decode_hex_nibble(byte: u8) -> MarginaliaResult<u8> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        _ => Err(MarginaliaError::new(
            "storage.partition_hex_invalid",
            format!("invalid hex character `{}`", char::from(byte)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::HighlightStore;
    use super::StoreConfig;
    use super::StoredHighlight;
    use super::site_of;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_storage_root(label: &str) -> std::path::PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|value| value.as_nanos())
            .unwrap_or_default();
        std::env::temp_dir().join(format!("marginalia-storage-{label}-{stamp}"))
    }

    fn highlight(url: &str) -> StoredHighlight {
        StoredHighlight {
            url: url.to_owned(),
            record: "{\"phrase\":\"tab\\there\"}".to_owned(),
        }
    }

    #[test]
    fn highlight_roundtrip_per_site() {
        let root = temp_storage_root("roundtrip");
        let store = HighlightStore::new(StoreConfig::default()).with_persistent_root(root.clone());

        let saved = highlight("https://Example.com/post?id=1");
        assert!(store.save("note-2", &saved).is_ok());
        assert!(store.save("note-1", &highlight("https://example.com/other")).is_ok());
        assert!(store.save("note-3", &highlight("https://news.example.org/")).is_ok());

        assert_eq!(store.load("example.com", "note-2"), Ok(Some(saved)));
        assert_eq!(store.load("example.com", "missing"), Ok(None));
        assert_eq!(
            store.note_ids("example.com"),
            Ok(vec!["note-1".to_owned(), "note-2".to_owned()])
        );
        assert!(root.join("partitions").join("news.example.org.kv").exists());

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn removing_last_note_deletes_partition() {
        let root = temp_storage_root("remove");
        let store = HighlightStore::new(StoreConfig::default()).with_persistent_root(root.clone());
        assert!(store.save("only", &highlight("https://example.com/")).is_ok());

        assert_eq!(store.remove("example.com", "only"), Ok(true));
        assert_eq!(store.remove("example.com", "only"), Ok(false));
        assert!(!root.join("partitions").join("example.com.kv").exists());
        assert_eq!(store.note_ids("example.com"), Ok(Vec::new()));

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn ephemeral_and_unconfigured_stores_refuse_writes() {
        let config = StoreConfig {
            partition_by_site: true,
            ephemeral_mode: true,
        };
        let store = HighlightStore::new(config).with_persistent_root(temp_storage_root("ephemeral"));
        let wrote = store.save("k", &highlight("https://example.com/"));
        assert!(wrote.is_err());
        if let Err(error) = wrote {
            assert_eq!(error.code, "storage.persistence_disabled");
        }

        let unconfigured = HighlightStore::new(StoreConfig::default());
        let read = unconfigured.load("example.com", "k");
        assert!(read.is_err());
        if let Err(error) = read {
            assert_eq!(error.code, "storage.persistence_unconfigured");
        }
    }

    #[test]
    fn site_comes_from_url_host() {
        assert_eq!(site_of("https://Docs.Example.com:8443/a"), Ok("docs.example.com".to_owned()));
        assert!(site_of("not a url").is_err());
        let hostless = site_of("data:text/plain,hi");
        assert!(hostless.is_err());
        if let Err(error) = hostless {
            assert_eq!(error.code, "storage.url_without_host");
        }
    }

    #[test]
    fn corrupt_partition_reports_format_error() {
        let root = temp_storage_root("corrupt");
        let store = HighlightStore::new(StoreConfig::default()).with_persistent_root(root.clone());
        let dir = root.join("partitions");
        assert!(std::fs::create_dir_all(&dir).is_ok());
        assert!(std::fs::write(dir.join("example.com.kv"), "zz\n").is_ok());

        let read = store.note_ids("example.com");
        assert!(read.is_err());
        if let Err(error) = read {
            assert_eq!(error.code, "storage.partition_format_invalid");
        }

        let _ = std::fs::remove_dir_all(root);
    }
}
