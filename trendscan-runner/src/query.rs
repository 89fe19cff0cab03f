//! Read path over the bars and criteria tables.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::params;
use serde::Serialize;
use trendscan_core::domain::{AssetKey, Bar, CriteriaRow};

use crate::store::sqlite::parse_date;
use crate::store::{SqliteStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchlistEntry {
    pub exchange: String,
    pub symbol: String,
    /// Date of the latest criteria row.
    pub date: NaiveDate,
    pub close: f64,
    /// First row of the signal run the latest row belongs to.
    pub since: Option<NaiveDate>,
}

/// Instruments whose latest criteria row carries the combined signal.
pub fn watchlist(store: &SqliteStore) -> Result<Vec<WatchlistEntry>, StoreError> {
    let table = store.criteria_table();
    if !store.has_column(table, "long_signal")? {
        return Ok(Vec::new());
    }
    let mut stmt = store.connection().prepare(&format!(
        "SELECT c.exchange, c.symbol, c.timestamp, c.close
         FROM {table} c
         JOIN (SELECT exchange, symbol, MAX(timestamp) AS ts FROM {table} GROUP BY exchange, symbol) m
           ON c.exchange = m.exchange AND c.symbol = m.symbol AND c.timestamp = m.ts
         WHERE c.long_signal = 1
         ORDER BY c.exchange, c.symbol"
    ))?;
    let raw = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(exchange, symbol, ts, close)| {
            let key = AssetKey::new(&exchange, &symbol);
            Ok(WatchlistEntry {
                since: first_signal_date(store, &key)?,
                exchange,
                symbol,
                date: parse_date("timestamp", ts)?,
                close,
            })
        })
        .collect()
}

/// Stored bars for one instrument, ordered by date.
pub fn history(store: &SqliteStore, key: &AssetKey) -> Result<Vec<Bar>, StoreError> {
    store.load_bars(key)
}

/// Stored criteria rows for one instrument: bars with their indicators and flags, ordered by date.
pub fn criteria_history(store: &SqliteStore, key: &AssetKey) -> Result<Vec<CriteriaRow>, StoreError> {
    store.load_criteria(key)
}

/// `(date, long_signal)` for every criteria row of one instrument.
fn signal_series(store: &SqliteStore, key: &AssetKey) -> Result<Vec<(NaiveDate, bool)>, StoreError> {
    let table = store.criteria_table();
    if !store.has_column(table, "long_signal")? {
        return Ok(Vec::new());
    }
    let mut stmt = store.connection().prepare(&format!(
        "SELECT timestamp, long_signal FROM {table}
         WHERE exchange = ?1 AND symbol = ?2
         ORDER BY timestamp"
    ))?;
    let raw = stmt
        .query_map(params![key.exchange, key.symbol], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    raw.into_iter()
        .map(|(ts, signal)| Ok((parse_date("timestamp", ts)?, signal)))
        .collect()
}

/// Dates on which the combined signal held.
pub fn signal_dates(store: &SqliteStore, key: &AssetKey) -> Result<Vec<NaiveDate>, StoreError> {
    Ok(signal_series(store, key)?
        .into_iter()
        .filter_map(|(date, signal)| signal.then_some(date))
        .collect())
}

/// Start of the most recent run of consecutive signal rows, if the instrument ever signalled.
pub fn first_signal_date(store: &SqliteStore, key: &AssetKey) -> Result<Option<NaiveDate>, StoreError> {
    Ok(run_start(&signal_series(store, key)?))
}

fn run_start(series: &[(NaiveDate, bool)]) -> Option<NaiveDate> {
    let last = series.iter().rposition(|(_, s)| *s)?;
    let start = series[..=last]
        .iter()
        .rposition(|(_, s)| !*s)
        .map_or(0, |i| i + 1);
    Some(series[start].0)
}

/// Stored symbols grouped by exchange.
pub fn assets_by_exchange(store: &SqliteStore) -> Result<BTreeMap<String, Vec<String>>, StoreError> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for key in store.keys()? {
        out.entry(key.exchange).or_default().push(key.symbol);
    }
    Ok(out)
}
