//! JSON manifest parser
//!
//! ```json
//! { "settings": { ... },
//!   "categories": { "radio": { "name": "Radio", "color": "#2ecc71", "icon": "fas fa-radio",
//!                              "streams": [ { "name": "...", "url": "...", "backupUrls": [] } ] } } }
//! ```

use super::{clean_backups, placeholder_name, stable_id, CategoryInfo, ParsedCategory, ParsedPlaylist};
use crate::{Category, Error, Result, StreamEntry, StreamMetadata};
use serde::Deserialize;
use serde_json::Value;
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Top-level manifest document
#[derive(Debug, Clone, Deserialize)]
pub struct RawManifest {
    #[serde(default)]
    pub version: Option<Value>,
    #[serde(default)]
    pub settings: Option<Value>,
    /// Category blocks in document order
    pub categories: IndexMap<String, RawCategory>,
}

/// One category block of a manifest
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCategory {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    /// Kept as raw values so one bad stream does not reject the category
    #[serde(default)]
    pub streams: Vec<Value>,
}

/// Stream object as written in a manifest. `type`/`category` fields are ignored:
/// the enclosing category key decides.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStream {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "title")]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    /// `null` and absent both mean no backups
    #[serde(default)]
    backup_urls: Option<Vec<String>>,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(flatten)]
    metadata: StreamMetadata,
}

/// Parse a JSON manifest
pub fn parse_manifest(text: &str) -> Result<ParsedPlaylist> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(Error::parse("manifest root must be a JSON object"));
    }
    // Read the typed document from the text itself so category keys keep their order
    let manifest: RawManifest = serde_json::from_str(text)
        .map_err(|e| Error::parse(format!("invalid manifest: {}", e)))?;

    let mut skipped = 0;
    let categories = manifest
        .categories
        .into_iter()
        .map(|(key, raw)| {
            let (parsed, bad) = parse_category(&key, raw);
            skipped += bad;
            parsed
        })
        .collect();

    Ok(ParsedPlaylist {
        categories,
        settings: manifest.settings,
        skipped,
    })
}

fn parse_category(key: &str, raw: RawCategory) -> (ParsedCategory, usize) {
    let category = Category::from(key);
    let defaults = CategoryInfo::for_category(category.clone());
    let info = CategoryInfo {
        name: non_empty(raw.name).unwrap_or(defaults.name),
        color: non_empty(raw.color).unwrap_or(defaults.color),
        icon: non_empty(raw.icon).unwrap_or(defaults.icon),
        category: category.clone(),
    };

    let mut entries = Vec::with_capacity(raw.streams.len());
    let mut skipped = 0;
    for (index, value) in raw.streams.into_iter().enumerate() {
        match serde_json::from_value::<RawStream>(value) {
            Ok(stream) => match normalize(stream, &category, entries.len()) {
                Some(entry) => entries.push(entry),
                None => {
                    warn!(category = %category, index, "Skipping stream without url");
                    skipped += 1;
                }
            },
            Err(e) => {
                warn!(category = %category, index, error = %e, "Skipping malformed stream");
                skipped += 1;
            }
        }
    }

    debug!(category = %category, entries = entries.len(), skipped, "Category parsed");
    (ParsedCategory { info, entries }, skipped)
}

fn normalize(raw: RawStream, category: &Category, position: usize) -> Option<StreamEntry> {
    let url = non_empty(raw.url)?;
    let name = non_empty(raw.name).unwrap_or_else(|| placeholder_name(position));
    let id = non_empty(raw.id).unwrap_or_else(|| stable_id(category, &[&name, &url]));

    Some(StreamEntry {
        id,
        category: category.clone(),
        backup_urls: clean_backups(&url, raw.backup_urls.unwrap_or_default()),
        duration: raw.duration.filter(|d| *d > 0).map(|d| d as u64),
        metadata: raw.metadata,
        name,
        url,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
