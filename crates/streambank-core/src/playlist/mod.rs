//! Playlist parsing for JSON manifests and M3U/EXTM3U text
//!
//! Both input shapes normalize to the same [`StreamEntry`] records. Parsing is
//! pure: no network, no clock, no randomness. Ids that the source does not
//! provide are derived from content so they survive reloads.

mod m3u;
mod manifest;

pub use m3u::{parse_m3u, ExtInf};
pub use manifest::{parse_manifest, RawCategory, RawManifest};

use crate::{Category, Error, Result, StreamEntry};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Number of hex characters kept from the content hash
const ID_HASH_LEN: usize = 12;

/// Playlist document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistFormat {
    /// JSON manifest with a `categories` tree
    Manifest,
    /// M3U / EXTM3U text
    M3u,
}

impl PlaylistFormat {
    /// Guess the format from a file name or URL path
    pub fn detect(location: &str) -> Option<Self> {
        let path = location
            .split(['?', '#'])
            .next()
            .unwrap_or(location)
            .to_lowercase();
        match Path::new(&path).extension().and_then(|e| e.to_str()) {
            Some("json") => Some(PlaylistFormat::Manifest),
            Some("m3u") | Some("m3u8") => Some(PlaylistFormat::M3u),
            _ => None,
        }
    }

    /// Guess the format from document content
    pub fn sniff(content: &str) -> Self {
        let trimmed = content.trim_start_matches('\u{feff}').trim_start();
        if trimmed.starts_with('{') {
            PlaylistFormat::Manifest
        } else {
            PlaylistFormat::M3u
        }
    }
}

impl std::str::FromStr for PlaylistFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" | "manifest" => Ok(PlaylistFormat::Manifest),
            "m3u" | "m3u8" | "extm3u" => Ok(PlaylistFormat::M3u),
            other => Err(Error::InvalidConfig(format!("unknown playlist format: {}", other))),
        }
    }
}

/// A raw playlist document handed to the parser
#[derive(Debug, Clone, Copy)]
pub enum RawPlaylistInput<'a> {
    /// JSON manifest text
    Manifest(&'a str),
    /// M3U text; every entry is stamped with `category`
    M3u {
        text: &'a str,
        category: &'a Category,
        /// Source name folded into synthesized ids
        source: &'a str,
    },
}

/// Display descriptor of a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub category: Category,
    pub name: String,
    pub color: String,
    pub icon: String,
}

impl CategoryInfo {
    /// Descriptor with the built-in defaults for `category`
    pub fn for_category(category: Category) -> Self {
        let name = match &category {
            Category::Radio => "Radio".to_string(),
            Category::Tv => "TV".to_string(),
            Category::Other(name) => name.clone(),
        };
        Self {
            color: category.default_color().to_string(),
            icon: category.default_icon().to_string(),
            name,
            category,
        }
    }
}

/// Entries of one category, in document order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCategory {
    pub info: CategoryInfo,
    pub entries: Vec<StreamEntry>,
}

/// Parser output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedPlaylist {
    pub categories: Vec<ParsedCategory>,
    /// Raw `settings` override carried by a manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
    /// Stream objects or lines that could not be turned into entries
    pub skipped: usize,
}

impl ParsedPlaylist {
    pub fn entry_count(&self) -> usize {
        self.categories.iter().map(|c| c.entries.len()).sum()
    }

    /// All entries, category by category
    pub fn entries(&self) -> impl Iterator<Item = &StreamEntry> {
        self.categories.iter().flat_map(|c| c.entries.iter())
    }
}

/// Parse a raw playlist document.
///
/// Malformed individual streams or lines are skipped; only a manifest that is
/// not JSON at all (or lacks `categories`) is an error.
pub fn parse(input: RawPlaylistInput<'_>) -> Result<ParsedPlaylist> {
    match input {
        RawPlaylistInput::Manifest(text) => parse_manifest(text),
        RawPlaylistInput::M3u { text, category, source } => {
            let (entries, skipped) = parse_m3u(text, category, source);
            Ok(ParsedPlaylist {
                categories: vec![ParsedCategory {
                    info: CategoryInfo::for_category(category.clone()),
                    entries,
                }],
                settings: None,
                skipped,
            })
        }
    }
}

/// Parse raw bytes, rejecting documents that are not UTF-8 text
pub fn parse_bytes(
    bytes: &[u8],
    format: PlaylistFormat,
    category: &Category,
    source: &str,
) -> Result<ParsedPlaylist> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::parse(format!("{} is not text: {}", source, e)))?;
    let text = text.trim_start_matches('\u{feff}');
    match format {
        PlaylistFormat::Manifest => parse(RawPlaylistInput::Manifest(text)),
        PlaylistFormat::M3u => parse(RawPlaylistInput::M3u { text, category, source }),
    }
}

/// Deterministic id from category and content
pub(crate) fn stable_id(category: &Category, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}", category, &hex[..ID_HASH_LEN])
}

/// Label for entries that carry no usable name
pub(crate) fn placeholder_name(position: usize) -> String {
    format!("Untitled stream {}", position + 1)
}

/// Drop empty, duplicate and self-referential backup URLs, keeping order
pub(crate) fn clean_backups(url: &str, backups: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for backup in backups {
        let backup = backup.trim().to_string();
        if backup.is_empty() || backup == url || cleaned.contains(&backup) {
            continue;
        }
        cleaned.push(backup);
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(PlaylistFormat::detect("playlists.json"), Some(PlaylistFormat::Manifest));
        assert_eq!(PlaylistFormat::detect("https://x/list.M3U8?t=1"), Some(PlaylistFormat::M3u));
        assert_eq!(PlaylistFormat::detect("channels.m3u"), Some(PlaylistFormat::M3u));
        assert_eq!(PlaylistFormat::detect("README"), None);
    }

    #[test]
    fn test_sniff_format() {
        assert_eq!(PlaylistFormat::sniff("  {\"categories\":{}}"), PlaylistFormat::Manifest);
        assert_eq!(PlaylistFormat::sniff("#EXTM3U\n"), PlaylistFormat::M3u);
    }

    #[test]
    fn test_stable_id_is_deterministic() {
        let a = stable_id(&Category::Radio, &["Test FM", "https://a/x.m3u8"]);
        let b = stable_id(&Category::Radio, &["Test FM", "https://a/x.m3u8"]);
        let c = stable_id(&Category::Tv, &["Test FM", "https://a/x.m3u8"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("radio-"));
        assert_eq!(a.len(), "radio-".len() + ID_HASH_LEN);
    }

    #[test]
    fn test_clean_backups() {
        let backups = vec![
            "https://a/x.m3u8".to_string(),
            " ".to_string(),
            "https://b/x.m3u8".to_string(),
            "https://b/x.m3u8".to_string(),
        ];
        assert_eq!(clean_backups("https://a/x.m3u8", backups), vec!["https://b/x.m3u8"]);
    }

    #[test]
    fn test_parse_bytes_rejects_binary() {
        let err = parse_bytes(&[0xff, 0xfe, 0x00], PlaylistFormat::M3u, &Category::Tv, "bin").unwrap_err();
        assert!(matches!(err, Error::ManifestParse(_)));
    }
}
