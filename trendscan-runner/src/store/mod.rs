//! Bar and criteria persistence.
//!
//! `BarStore` is the seam the sync engine writes through; `SqliteStore` is the
//! production implementation and also serves the screen pipeline and the read
//! path.

pub mod migrations;
pub mod sqlite;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;
use trendscan_core::domain::{AssetKey, Bar};

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid bar {key} on {date}: {reason}")]
    Validation {
        key: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("stored value {value:?} in {column} is not a valid date")]
    BadDate { column: &'static str, value: String },

    #[error("store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Write-side contract the sync engine depends on.
pub trait BarStore {
    /// Most recent stored date per instrument.
    fn latest_dates(&self) -> Result<BTreeMap<AssetKey, NaiveDate>, StoreError>;

    /// Insert bars, discarding any whose natural key is already stored.
    /// All-or-nothing; returns the number of rows actually inserted.
    fn upsert_bars(&mut self, bars: &[Bar]) -> Result<usize, StoreError>;
}

/// Reject bars that must never reach the store.
pub fn validate_bar(bar: &Bar) -> Result<(), StoreError> {
    let fail = |reason: &str| StoreError::Validation {
        key: bar.key().to_string(),
        date: bar.date,
        reason: reason.to_string(),
    };
    if bar.exchange.trim().is_empty() {
        return Err(fail("empty exchange"));
    }
    if bar.symbol.trim().is_empty() {
        return Err(fail("empty symbol"));
    }
    if bar.is_void() {
        return Err(fail("non-finite price or volume"));
    }
    if bar.trade_count.is_some_and(|v| !v.is_finite()) || bar.vwap.is_some_and(|v| !v.is_finite()) {
        return Err(fail("non-finite trade count or vwap"));
    }
    Ok(())
}

/// Table and column names are interpolated into SQL, so only plain identifiers pass.
pub fn check_identifier(name: &str) -> Result<&str, StoreError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}
