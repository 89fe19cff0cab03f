//! Persistent list of instruments excluded from fetching.
//!
//! Stored as headerless `exchange,symbol` CSV rows. Entries are appended when a
//! new symbol's backfill comes back empty and are never pruned automatically;
//! removing a line from the file by hand re-enables the symbol.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::AssetKey;

#[derive(Debug, Error)]
pub enum SkipListError {
    #[error("skip list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("skip list CSV: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Default)]
pub struct SkipList {
    path: Option<PathBuf>,
    entries: BTreeSet<AssetKey>,
}

impl SkipList {
    /// A skip list that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing file is an empty list.
    pub fn load(path: &Path) -> Result<Self, SkipListError> {
        let mut entries = BTreeSet::new();
        if path.exists() {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .trim(csv::Trim::All)
                .from_path(path)?;
            for record in reader.records() {
                let record = record?;
                match (record.get(0), record.get(1)) {
                    (Some(exchange), Some(symbol)) if !exchange.is_empty() && !symbol.is_empty() => {
                        entries.insert(AssetKey::new(exchange, symbol));
                    }
                    _ => tracing::warn!(path = %path.display(), ?record, "ignoring malformed skip list row"),
                }
            }
        }
        tracing::debug!(path = %path.display(), entries = entries.len(), "skip list loaded");
        Ok(Self {
            path: Some(path.to_path_buf()),
            entries,
        })
    }

    pub fn contains(&self, key: &AssetKey) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetKey> {
        self.entries.iter()
    }

    /// Add in memory only. Returns false if the key was already listed.
    pub fn insert(&mut self, key: AssetKey) -> bool {
        self.entries.insert(key)
    }

    /// Add and persist one row. A key already listed is not written again.
    pub fn append(&mut self, key: AssetKey) -> Result<bool, SkipListError> {
        if self.entries.contains(&key) {
            return Ok(false);
        }
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| SkipListError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| SkipListError::Io {
                    path: path.clone(),
                    source,
                })?;
            let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
            writer.write_record([key.exchange.as_str(), key.symbol.as_str()])?;
            writer.flush().map_err(|source| SkipListError::Io {
                path: path.clone(),
                source,
            })?;
        }
        tracing::info!(%key, "added to skip list");
        self.entries.insert(key);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let list = SkipList::load(&dir.path().join("skip.csv")).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn append_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("skip.csv");

        let mut list = SkipList::load(&path).unwrap();
        assert!(list.append(AssetKey::new("NYSE", "DEAD")).unwrap());
        assert!(list.append(AssetKey::new("CRYPTO", "OLD/USD")).unwrap());
        assert!(!list.append(AssetKey::new("NYSE", "DEAD")).unwrap());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "NYSE,DEAD\nCRYPTO,OLD/USD\n");

        let reloaded = SkipList::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains(&AssetKey::new("CRYPTO", "OLD/USD")));
    }

    #[test]
    fn malformed_rows_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skip.csv");
        std::fs::write(&path, "NYSE,IBM\nlonely\n ARCA , SPY \n").unwrap();
        let list = SkipList::load(&path).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains(&AssetKey::new("ARCA", "SPY")));
    }

    #[test]
    fn in_memory_never_touches_disk() {
        let mut list = SkipList::in_memory();
        assert!(list.append(AssetKey::new("NYSE", "X")).unwrap());
        assert!(list.contains(&AssetKey::new("NYSE", "X")));
    }
}
