//! SQLite persistence adapter.
//!
//! One connection is held for the whole run and every write goes through it.
//! Writes are first-write-wins on `(exchange, symbol, timestamp)`: a duplicate
//! key is silently discarded, never updated. Every batch runs in a single
//! transaction, so a failure leaves the tables exactly as they were.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use trendscan_core::config::StoreConfig;
use trendscan_core::domain::{
    AssetKey, Bar, ColumnKind, CriteriaFlags, CriteriaRow, IndicatorSnapshot, DERIVED_COLUMNS,
};

use super::migrations::{run_migrations, BAR_COLUMNS};
use super::{check_identifier, validate_bar, BarStore, StoreError};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn date_text(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_date(column: &'static str, value: String) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|_| StoreError::BadDate { column, value })
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Numeric => "NUMERIC",
        ColumnKind::Boolean => "BOOLEAN",
    }
}

fn bar_values(bar: &Bar) -> Vec<Value> {
    vec![
        Value::from(bar.exchange.clone()),
        Value::from(bar.symbol.clone()),
        Value::from(date_text(bar.date)),
        Value::from(bar.open),
        Value::from(bar.high),
        Value::from(bar.low),
        Value::from(bar.close),
        Value::from(bar.volume),
        Value::from(bar.trade_count),
        Value::from(bar.vwap),
    ]
}

/// Values for one criteria row, ordered as `BAR_COLUMNS` then `DERIVED_COLUMNS`.
fn criteria_values(row: &CriteriaRow) -> Vec<Value> {
    let i = &row.indicators;
    let f = &row.flags;
    let mut values = bar_values(&row.bar);
    values.extend([
        Value::from(i.atr),
        Value::from(i.log_return),
        Value::from(i.vma),
        Value::from(i.sma_50),
        Value::from(i.sma_150),
        Value::from(i.sma_200),
        Value::from(f.long_sma),
        Value::from(f.long_hhhl),
        Value::from(f.volume_spike),
        Value::from(f.long_vspike),
        Value::from(f.long_week_vup_lt_vdn),
        Value::from(row.long_signal()),
    ]);
    values
}

fn insert_sql(table: &str, columns: &[&str]) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT (exchange, symbol, timestamp) DO NOTHING",
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Bar columns as read, before the date text is parsed.
struct StoredBar {
    exchange: String,
    symbol: String,
    timestamp: String,
    prices: [f64; 5],
    trade_count: Option<f64>,
    vwap: Option<f64>,
}

impl StoredBar {
    /// Read the leading `BAR_COLUMNS` of a result row.
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            exchange: row.get(0)?,
            symbol: row.get(1)?,
            timestamp: row.get(2)?,
            prices: [row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
            trade_count: row.get(8)?,
            vwap: row.get(9)?,
        })
    }

    fn into_bar(self) -> Result<Bar, StoreError> {
        let [open, high, low, close, volume] = self.prices;
        Ok(Bar {
            exchange: self.exchange,
            symbol: self.symbol,
            date: parse_date("timestamp", self.timestamp)?,
            open,
            high,
            low,
            close,
            volume,
            trade_count: self.trade_count,
            vwap: self.vwap,
        })
    }
}

pub struct SqliteStore {
    conn: Connection,
    bars_table: String,
    criteria_table: String,
    /// Tables whose schema has already been extended by this store.
    extended: HashSet<String>,
}

impl SqliteStore {
    /// Open (creating if needed) the database described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::open_path(&config.path, &config.bars_table, &config.criteria_table)
    }

    pub fn open_path(path: &Path, bars_table: &str, criteria_table: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Self::from_connection(conn, bars_table, criteria_table)
    }

    /// In-memory store with the default table names.
    pub fn in_memory() -> Result<Self, StoreError> {
        let defaults = StoreConfig::default();
        Self::from_connection(
            Connection::open_in_memory()?,
            &defaults.bars_table,
            &defaults.criteria_table,
        )
    }

    fn from_connection(conn: Connection, bars_table: &str, criteria_table: &str) -> Result<Self, StoreError> {
        run_migrations(&conn, bars_table, criteria_table)?;
        Ok(Self {
            conn,
            bars_table: bars_table.to_string(),
            criteria_table: criteria_table.to_string(),
            extended: HashSet::new(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bars_table(&self) -> &str {
        &self.bars_table
    }

    pub fn criteria_table(&self) -> &str {
        &self.criteria_table
    }

    /// Column names of `table`, in declaration order.
    pub fn column_names(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let table = check_identifier(table)?;
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn has_column(&self, table: &str, column: &str) -> Result<bool, StoreError> {
        Ok(self
            .column_names(table)?
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column)))
    }

    /// Add every column of `columns` whose name `table` lacks (case-insensitive).
    ///
    /// Additive only: existing columns are never altered or dropped. Runs at
    /// most once per table for the lifetime of this store; later calls return
    /// an empty list without touching the schema. Returns the added names.
    pub fn extend_schema(
        &mut self,
        table: &str,
        columns: &[(&str, ColumnKind)],
    ) -> Result<Vec<String>, StoreError> {
        let table = check_identifier(table)?;
        let marker = table.to_ascii_lowercase();
        if self.extended.contains(&marker) {
            return Ok(Vec::new());
        }

        let mut present: HashSet<String> = self
            .column_names(table)?
            .into_iter()
            .map(|c| c.to_ascii_lowercase())
            .collect();

        let tx = self.conn.transaction()?;
        let mut added = Vec::new();
        for (name, kind) in columns {
            let name = check_identifier(name)?;
            if !present.insert(name.to_ascii_lowercase()) {
                continue;
            }
            tx.execute_batch(&format!(
                "ALTER TABLE {table} ADD COLUMN {name} {}",
                sql_type(*kind)
            ))?;
            added.push(name.to_string());
        }
        tx.commit()?;

        if !added.is_empty() {
            tracing::info!(table, columns = ?added, "extended schema");
        }
        self.extended.insert(marker);
        Ok(added)
    }

    /// Persist criteria rows, first write wins. Extends the criteria schema on first use.
    pub fn upsert_criteria(&mut self, rows: &[CriteriaRow]) -> Result<usize, StoreError> {
        for row in rows {
            validate_bar(&row.bar)?;
        }
        let table = self.criteria_table.clone();
        self.extend_schema(&table, DERIVED_COLUMNS)?;

        let columns: Vec<&str> = BAR_COLUMNS
            .iter()
            .copied()
            .chain(DERIVED_COLUMNS.iter().map(|(name, _)| *name))
            .collect();
        let sql = insert_sql(&table, &columns);

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                inserted += stmt.execute(params_from_iter(criteria_values(row)))?;
            }
        }
        tx.commit()?;

        tracing::debug!(table = %table, rows = rows.len(), inserted, "criteria upserted");
        Ok(inserted)
    }

    /// One instrument's stored bars, ordered by date.
    pub fn load_bars(&self, key: &AssetKey) -> Result<Vec<Bar>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM {} WHERE exchange = ?1 AND symbol = ?2 ORDER BY timestamp",
            BAR_COLUMNS.join(", "),
            self.bars_table
        ))?;
        let raw = stmt
            .query_map(params![key.exchange, key.symbol], StoredBar::read)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(StoredBar::into_bar).collect()
    }

    /// One instrument's criteria rows, ordered by date. Empty before the first screen.
    pub fn load_criteria(&self, key: &AssetKey) -> Result<Vec<CriteriaRow>, StoreError> {
        let table = &self.criteria_table;
        if !self.has_column(table, "long_signal")? {
            return Ok(Vec::new());
        }
        let derived: Vec<&str> = DERIVED_COLUMNS.iter().map(|(name, _)| *name).collect();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {}, {} FROM {table} WHERE exchange = ?1 AND symbol = ?2 ORDER BY timestamp",
            BAR_COLUMNS.join(", "),
            derived.join(", ")
        ))?;
        let raw = stmt
            .query_map(params![key.exchange, key.symbol], |row| {
                let n = BAR_COLUMNS.len();
                let indicators = IndicatorSnapshot {
                    atr: row.get(n)?,
                    log_return: row.get(n + 1)?,
                    vma: row.get(n + 2)?,
                    sma_50: row.get(n + 3)?,
                    sma_150: row.get(n + 4)?,
                    sma_200: row.get(n + 5)?,
                };
                let flags = CriteriaFlags {
                    long_sma: row.get(n + 6)?,
                    long_hhhl: row.get(n + 7)?,
                    volume_spike: row.get(n + 8)?,
                    long_vspike: row.get(n + 9)?,
                    long_week_vup_lt_vdn: row.get(n + 10)?,
                };
                Ok((StoredBar::read(row)?, indicators, flags))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(bar, indicators, flags)| {
                Ok(CriteriaRow {
                    bar: bar.into_bar()?,
                    indicators,
                    flags,
                })
            })
            .collect()
    }

    /// Every instrument with at least one stored bar, sorted.
    pub fn keys(&self) -> Result<Vec<AssetKey>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT exchange, symbol FROM {} ORDER BY exchange, symbol",
            self.bars_table
        ))?;
        let keys = stmt
            .query_map([], |row| Ok(AssetKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    pub fn row_count(&self, table: &str) -> Result<usize, StoreError> {
        let table = check_identifier(table)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl BarStore for SqliteStore {
    fn latest_dates(&self) -> Result<BTreeMap<AssetKey, NaiveDate>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT exchange, symbol, MAX(timestamp) FROM {} GROUP BY exchange, symbol",
            self.bars_table
        ))?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(exchange, symbol, ts)| Ok((AssetKey::new(exchange, symbol), parse_date("timestamp", ts)?)))
            .collect()
    }

    fn upsert_bars(&mut self, bars: &[Bar]) -> Result<usize, StoreError> {
        for bar in bars {
            validate_bar(bar)?;
        }
        let sql = insert_sql(&self.bars_table, BAR_COLUMNS);

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for bar in bars {
                inserted += stmt.execute(params_from_iter(bar_values(bar)))?;
            }
        }
        tx.commit()?;

        tracing::debug!(rows = bars.len(), inserted, "bars upserted");
        Ok(inserted)
    }
}
