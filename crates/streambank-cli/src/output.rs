//! Output formatting for CLI

use serde::Serialize;
use streambank_core::StreamEntry;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(OutputFormat::from(s))
    }
}

/// Pretty JSON for `data`
pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "#")]
    index: usize,
    name: String,
    url: String,
    backups: usize,
    group: String,
}

/// Entries of one category in the selected format
pub fn format_entries(entries: &[StreamEntry], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(&entries),
        OutputFormat::Table => {
            let rows = entries.iter().enumerate().map(|(index, e)| EntryRow {
                index,
                name: e.name.clone(),
                url: e.url.clone(),
                backups: e.backup_urls.len(),
                group: e.metadata.group.clone().unwrap_or_default(),
            });
            Table::new(rows).to_string()
        }
        OutputFormat::Text => entries
            .iter()
            .enumerate()
            .map(|(index, e)| {
                let mut line = format!("  {:>3}. {} - {}", index, e.name, e.url);
                if e.has_backups() {
                    line.push_str(&format!(" (+{} backup)", e.backup_urls.len()));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
