//! Recently played streams

use crate::{Category, StreamEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of remembered selections
pub const HISTORY_CAPACITY: usize = 50;

/// One remembered selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub category: Category,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

/// Newest-first selection history, deduplicated by entry id
#[derive(Debug, Clone)]
pub struct History {
    records: VecDeque<HistoryRecord>,
    capacity: usize,
}

impl History {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a selection at the current time
    pub fn record(&mut self, entry: &StreamEntry) {
        self.record_at(entry, Utc::now());
    }

    /// Record a selection; an earlier record of the same id moves to the front
    pub fn record_at(&mut self, entry: &StreamEntry, timestamp: DateTime<Utc>) {
        self.records.retain(|r| r.id != entry.id);
        self.records.push_front(HistoryRecord {
            id: entry.id.clone(),
            name: entry.name.clone(),
            category: entry.category.clone(),
            url: entry.url.clone(),
            timestamp,
        });
        self.records.truncate(self.capacity);
    }

    pub fn latest(&self) -> Option<&HistoryRecord> {
        self.records.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamMetadata;

    fn entry(id: &str) -> StreamEntry {
        StreamEntry {
            id: id.to_string(),
            category: Category::Radio,
            name: format!("Station {}", id),
            url: format!("https://radio/{}.m3u8", id),
            backup_urls: Vec::new(),
            metadata: StreamMetadata::default(),
            duration: None,
        }
    }

    #[test]
    fn test_newest_first_and_dedup() {
        let mut history = History::new();
        history.record(&entry("a"));
        history.record(&entry("b"));
        history.record(&entry("a"));

        let ids: Vec<_> = history.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(history.latest().unwrap().name, "Station a");
    }

    #[test]
    fn test_capacity() {
        let mut history = History::new();
        for i in 0..60 {
            history.record(&entry(&i.to_string()));
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.latest().unwrap().id, "59");
        assert_eq!(history.iter().last().unwrap().id, "10");
    }

    #[test]
    fn test_serialized_layout() {
        let mut history = History::new();
        history.record(&entry("a"));
        let json = serde_json::to_value(history.latest().unwrap()).unwrap();
        assert_eq!(json["type"], "radio");
        assert_eq!(json["url"], "https://radio/a.m3u8");
    }
}
