//! Stream catalog
//!
//! Entries grouped by category in source order. A catalog is immutable once
//! built; refreshes build a new one and swap it in through [`CatalogStore`].

use crate::{
    playlist::{CategoryInfo, ParsedCategory},
    Category, Error, Result, StreamEntry,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
struct CatalogCategory {
    info: CategoryInfo,
    entries: Vec<StreamEntry>,
}

/// In-memory set of entries grouped by category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    categories: Vec<CatalogCategory>,
}

/// Per-category entry counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub categories: Vec<(Category, usize)>,
    pub total: usize,
}

impl CatalogStats {
    pub fn count(&self, category: &Category) -> usize {
        self.categories
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

impl Catalog {
    /// Build a catalog from parsed categories.
    ///
    /// Blocks for the same category are concatenated in the order given.
    /// Repeated ids get a `-2`, `-3`, ... suffix so every id is unique.
    pub fn load(parsed: impl IntoIterator<Item = ParsedCategory>) -> Self {
        let mut categories: Vec<CatalogCategory> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for block in parsed {
            let slot = match categories
                .iter()
                .position(|c| c.info.category == block.info.category)
            {
                Some(pos) => pos,
                None => {
                    categories.push(CatalogCategory {
                        info: block.info.clone(),
                        entries: Vec::new(),
                    });
                    categories.len() - 1
                }
            };

            for mut entry in block.entries {
                entry.category = block.info.category.clone();
                if !seen.insert(entry.id.clone()) {
                    let mut suffix = 2;
                    let mut candidate = format!("{}-{}", entry.id, suffix);
                    while seen.contains(&candidate) {
                        suffix += 1;
                        candidate = format!("{}-{}", entry.id, suffix);
                    }
                    entry.id = candidate;
                    debug!(id = %entry.id, "Renamed duplicate stream id");
                    seen.insert(entry.id.clone());
                }
                categories[slot].entries.push(entry);
            }
        }

        let catalog = Self { categories };
        info!(
            categories = catalog.categories.len(),
            entries = catalog.len(),
            "Catalog loaded"
        );
        catalog
    }

    /// Entry at `index` of `category`
    pub fn get(&self, category: &Category, index: usize) -> Result<&StreamEntry> {
        self.all(category)
            .get(index)
            .ok_or_else(|| Error::NotFound {
                category: category.to_string(),
                index,
            })
    }

    /// All entries of `category` in source order (empty if unknown)
    pub fn all(&self, category: &Category) -> &[StreamEntry] {
        self.categories
            .iter()
            .find(|c| &c.info.category == category)
            .map(|c| c.entries.as_slice())
            .unwrap_or(&[])
    }

    /// Display descriptor of `category`
    pub fn info(&self, category: &Category) -> Option<&CategoryInfo> {
        self.categories
            .iter()
            .find(|c| &c.info.category == category)
            .map(|c| &c.info)
    }

    /// Category descriptors in catalog order
    pub fn categories(&self) -> impl Iterator<Item = &CategoryInfo> {
        self.categories.iter().map(|c| &c.info)
    }

    /// Look an entry up by id across all categories
    pub fn find(&self, id: &str) -> Option<&StreamEntry> {
        self.entries().find(|e| e.id == id)
    }

    /// Category and index of the entry with `id`
    pub fn position(&self, id: &str) -> Option<(Category, usize)> {
        self.categories.iter().find_map(|c| {
            c.entries
                .iter()
                .position(|e| e.id == id)
                .map(|index| (c.info.category.clone(), index))
        })
    }

    /// Every entry, category by category
    pub fn entries(&self) -> impl Iterator<Item = &StreamEntry> {
        self.categories.iter().flat_map(|c| c.entries.iter())
    }

    pub fn len(&self) -> usize {
        self.categories.iter().map(|c| c.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            categories: self
                .categories
                .iter()
                .map(|c| (c.info.category.clone(), c.entries.len()))
                .collect(),
            total: self.len(),
        }
    }
}

/// Shared handle to the current catalog.
///
/// Readers take an `Arc<Catalog>` snapshot; `replace` swaps in a whole new
/// catalog so a reader sees either the old or the new one, never a mix.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    tx: Arc<watch::Sender<Arc<Catalog>>>,
}

impl CatalogStore {
    pub fn new(catalog: Catalog) -> Self {
        let (tx, _) = watch::channel(Arc::new(catalog));
        Self { tx: Arc::new(tx) }
    }

    /// Current catalog
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.tx.borrow().clone()
    }

    /// Atomically replace the catalog
    pub fn replace(&self, catalog: Catalog) -> Arc<Catalog> {
        let catalog = Arc::new(catalog);
        self.tx.send_replace(catalog.clone());
        catalog
    }

    /// Subscribe to catalog replacements
    pub fn subscribe(&self) -> watch::Receiver<Arc<Catalog>> {
        self.tx.subscribe()
    }
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new(Catalog::default())
    }
}
