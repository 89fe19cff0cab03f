//! Per-symbol CSV archive of fetched bars.
//!
//! Every persisted batch is also appended to
//! `{root}/{exchange}/{symbol with '/' replaced by '-'}.csv`. The archive is a
//! side channel, not the source of truth: it can hold duplicates, and write
//! failures are the caller's to log. `read_all` turns it back into bars for the
//! import path.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AssetKey, Bar};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// One CSV row. The exchange is the directory name.
#[derive(Debug, Serialize, Deserialize)]
struct ArchiveRecord {
    symbol: String,
    timestamp: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    trade_count: Option<f64>,
    vwap: Option<f64>,
}

impl ArchiveRecord {
    fn from_bar(bar: &Bar) -> Self {
        Self {
            symbol: bar.symbol.clone(),
            timestamp: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            trade_count: bar.trade_count,
            vwap: bar.vwap,
        }
    }

    fn into_bar(self, exchange: &str) -> Bar {
        Bar {
            exchange: exchange.to_string(),
            symbol: self.symbol,
            date: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            trade_count: self.trade_count,
            vwap: self.vwap,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BarArchive {
    root: PathBuf,
}

impl BarArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &AssetKey) -> PathBuf {
        self.root
            .join(&key.exchange)
            .join(format!("{}.csv", key.symbol.replace('/', "-")))
    }

    /// Append `bars` to their symbols' files, writing the header only into new files.
    /// Returns the number of rows written.
    pub fn append(&self, bars: &[Bar]) -> Result<usize, ArchiveError> {
        let mut by_key: BTreeMap<AssetKey, Vec<&Bar>> = BTreeMap::new();
        for bar in bars {
            by_key.entry(bar.key()).or_default().push(bar);
        }

        let mut written = 0;
        for (key, rows) in by_key {
            let path = self.path_for(&key);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| ArchiveError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let is_new = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| ArchiveError::Io {
                    path: path.clone(),
                    source,
                })?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(is_new)
                .from_writer(file);
            for bar in rows {
                writer
                    .serialize(ArchiveRecord::from_bar(bar))
                    .map_err(|source| ArchiveError::Csv {
                        path: path.clone(),
                        source,
                    })?;
                written += 1;
            }
            writer.flush().map_err(|source| ArchiveError::Io {
                path: path.clone(),
                source,
            })?;
        }
        Ok(written)
    }

    /// Read one archive file.
    pub fn read_file(&self, exchange: &str, path: &Path) -> Result<Vec<Bar>, ArchiveError> {
        let mut reader = csv::Reader::from_path(path).map_err(|source| ArchiveError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        reader
            .deserialize::<ArchiveRecord>()
            .map(|row| {
                row.map(|r| r.into_bar(exchange))
                    .map_err(|source| ArchiveError::Csv {
                        path: path.to_path_buf(),
                        source,
                    })
            })
            .collect()
    }

    /// Every `(exchange, file)` pair in the archive, sorted.
    pub fn files(&self) -> Result<Vec<(String, PathBuf)>, ArchiveError> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return Ok(out);
        }
        for exchange_dir in read_dir_sorted(&self.root)? {
            if !exchange_dir.is_dir() {
                continue;
            }
            let Some(exchange) = exchange_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let exchange = exchange.to_string();
            for file in read_dir_sorted(&exchange_dir)? {
                if file.extension().is_some_and(|e| e == "csv") {
                    out.push((exchange.clone(), file));
                }
            }
        }
        Ok(out)
    }

    /// Read the whole archive back into bars.
    pub fn read_all(&self) -> Result<Vec<Bar>, ArchiveError> {
        let mut bars = Vec::new();
        for (exchange, path) in self.files()? {
            bars.extend(self.read_file(&exchange, &path)?);
        }
        Ok(bars)
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let io_err = |source| ArchiveError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(exchange: &str, symbol: &str, day: u32, close: f64) -> Bar {
        Bar {
            exchange: exchange.into(),
            symbol: symbol.into(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
            trade_count: Some(10.0),
            vwap: None,
        }
    }

    #[test]
    fn crypto_slash_becomes_dash() {
        let archive = BarArchive::new("/data");
        assert_eq!(
            archive.path_for(&AssetKey::new("CRYPTO", "BTC/USD")),
            PathBuf::from("/data/CRYPTO/BTC-USD.csv")
        );
    }

    #[test]
    fn header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let archive = BarArchive::new(dir.path());
        archive.append(&[bar("NYSE", "IBM", 2, 10.0)]).unwrap();
        archive.append(&[bar("NYSE", "IBM", 3, 11.0)]).unwrap();

        let content = std::fs::read_to_string(archive.path_for(&AssetKey::new("NYSE", "IBM"))).unwrap();
        assert_eq!(content.matches("symbol,timestamp").count(), 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn read_all_restores_bars() {
        let dir = tempfile::tempdir().unwrap();
        let archive = BarArchive::new(dir.path());
        let bars = vec![
            bar("NYSE", "IBM", 2, 10.0),
            bar("CRYPTO", "BTC/USD", 2, 40000.0),
            bar("NYSE", "IBM", 3, 11.0),
        ];
        assert_eq!(archive.append(&bars).unwrap(), 3);

        let restored = archive.read_all().unwrap();
        assert_eq!(restored.len(), 3);
        // Sorted by exchange directory, then file.
        assert_eq!(restored[0], bars[1]);
        assert_eq!(restored[1], bars[0]);
        assert_eq!(restored[2], bars[2]);
    }

    #[test]
    fn missing_root_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let archive = BarArchive::new(dir.path().join("absent"));
        assert!(archive.read_all().unwrap().is_empty());
    }
}
