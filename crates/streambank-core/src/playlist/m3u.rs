//! M3U / EXTM3U playlist parser
//!
//! Single pass, line by line:
//! - `#EXTINF:<duration>[ key="value"...][,<title>]` opens a pending entry
//! - the next non-blank, non-`#` line is its URL
//! - a URL with no pending `#EXTINF` still becomes an entry
//! - malformed `#EXTINF` lines are skipped, the rest of the file is kept

use super::{placeholder_name, stable_id};
use crate::{Category, StreamEntry, StreamMetadata};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, warn};

const EXTINF_PREFIX: &str = "#EXTINF:";
const EXTGRP_PREFIX: &str = "#EXTGRP:";

fn extinf_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^#EXTINF:\s*(?P<duration>[+-]?\d+(?:\.\d+)?)(?P<rest>.*)$")
            .expect("EXTINF pattern is valid")
    })
}

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?P<key>[A-Za-z0-9_.:-]+)\s*=\s*(?:"(?P<quoted>[^"]*)"|(?P<bare>[^\s",]+))"#)
            .expect("attribute pattern is valid")
    })
}

/// Split `rest` at the first comma that is not inside double quotes
fn split_title(rest: &str) -> (&str, Option<&str>) {
    let mut quoted = false;
    for (pos, c) in rest.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => return (&rest[..pos], Some(&rest[pos + 1..])),
            _ => {}
        }
    }
    (rest, None)
}

/// A parsed `#EXTINF:` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtInf {
    /// Declared duration in whole seconds; negative means live
    pub duration: i64,
    /// `key=value` pairs (quoted or bare), keys lowercased
    pub attributes: BTreeMap<String, String>,
    /// Text after the first comma outside quoted attribute values
    pub title: Option<String>,
}

impl ExtInf {
    /// Parse one `#EXTINF:` line. Returns `None` when the duration is missing or not a number.
    ///
    /// Attributes are picked out one by one, so an odd token between them does
    /// not cost the rest of the line.
    pub fn parse(line: &str) -> Option<Self> {
        let captures = extinf_pattern().captures(line.trim())?;
        let duration = captures["duration"].parse::<f64>().ok()?.trunc() as i64;

        let rest = captures.name("rest").map(|m| m.as_str()).unwrap_or_default();
        // Duration must be followed by whitespace, a comma or nothing
        if !rest.is_empty() && !rest.starts_with(|c: char| c.is_whitespace() || c == ',') {
            return None;
        }
        let (attrs, title) = split_title(rest);

        let attributes = attribute_pattern()
            .captures_iter(attrs)
            .map(|c| {
                let value = c
                    .name("quoted")
                    .or_else(|| c.name("bare"))
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                (c["key"].to_lowercase(), value)
            })
            .collect();

        let title = title.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);

        Some(Self { duration, attributes, title })
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// `tvg-name` wins over the trailing title
    pub fn display_name(&self) -> Option<&str> {
        self.attribute("tvg-name").or(self.title.as_deref())
    }

    /// Duration in seconds, `None` for live streams
    pub fn duration_secs(&self) -> Option<u64> {
        (self.duration > 0).then_some(self.duration as u64)
    }
}

/// Pending `#EXTINF` waiting for its URL line
struct Pending {
    info: ExtInf,
    group: Option<String>,
}

/// Parse M3U text into entries stamped with `category`.
///
/// Returns the entries and the number of skipped malformed lines.
pub fn parse_m3u(text: &str, category: &Category, source: &str) -> (Vec<StreamEntry>, usize) {
    let mut entries = Vec::new();
    let mut pending: Option<Pending> = None;
    let mut skipped = 0;

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(EXTINF_PREFIX) {
            match ExtInf::parse(line) {
                Some(info) => {
                    if pending.is_some() {
                        debug!(line = line_no + 1, "EXTINF without URL replaced");
                    }
                    pending = Some(Pending { info, group: None });
                }
                None => {
                    warn!(source, line = line_no + 1, "Skipping malformed EXTINF line");
                    skipped += 1;
                    pending = None;
                }
            }
            continue;
        }

        if let Some(group) = line.strip_prefix(EXTGRP_PREFIX) {
            if let Some(p) = pending.as_mut() {
                let group = group.trim();
                if !group.is_empty() {
                    p.group = Some(group.to_string());
                }
            }
            continue;
        }

        // #EXTM3U header and any other directive
        if line.starts_with('#') {
            continue;
        }

        let position = entries.len();
        let entry = match pending.take() {
            Some(p) => entry_from_extinf(p, line, category, source, position),
            None => {
                debug!(source, line = line_no + 1, "URL without EXTINF");
                bare_entry(line, category, source, position)
            }
        };
        entries.push(entry);
    }

    debug!(source, entries = entries.len(), skipped, "M3U parsed");
    (entries, skipped)
}

fn entry_from_extinf(
    pending: Pending,
    url: &str,
    category: &Category,
    source: &str,
    position: usize,
) -> StreamEntry {
    let Pending { info, group } = pending;
    let name = info
        .display_name()
        .map(str::to_string)
        .unwrap_or_else(|| placeholder_name(position));

    let metadata = StreamMetadata {
        logo: info.attribute("tvg-logo").map(str::to_string),
        group: info
            .attribute("group-title")
            .map(str::to_string)
            .or(group),
        country: info.attribute("tvg-country").map(str::to_string),
        ..Default::default()
    };

    StreamEntry {
        id: stable_id(category, &[source, &name, url]),
        category: category.clone(),
        duration: info.duration_secs(),
        name,
        url: url.to_string(),
        backup_urls: Vec::new(),
        metadata,
    }
}

fn bare_entry(url: &str, category: &Category, source: &str, position: usize) -> StreamEntry {
    let name = placeholder_name(position);
    StreamEntry {
        id: stable_id(category, &[source, &name, url]),
        category: category.clone(),
        name,
        url: url.to_string(),
        backup_urls: Vec::new(),
        metadata: StreamMetadata::default(),
        duration: None,
    }
}
