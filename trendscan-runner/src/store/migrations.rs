//! SQLite schema migrations.
//!
//! Applied migrations are recorded by name, so reopening a database is a no-op.
//! Names embed the table so differently configured tables in one database get
//! their own history.

use rusqlite::Connection;

use super::{check_identifier, StoreError};

/// Columns every criteria row shares with the bars table, in storage order.
pub const BAR_COLUMNS: &[&str] = &[
    "exchange",
    "symbol",
    "timestamp",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "trade_count",
    "vwap",
];

fn bar_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY,
            exchange TEXT NOT NULL,
            symbol TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            open NUMERIC NOT NULL,
            high NUMERIC NOT NULL,
            low NUMERIC NOT NULL,
            close NUMERIC NOT NULL,
            volume NUMERIC NOT NULL,
            trade_count NUMERIC,
            vwap NUMERIC,
            UNIQUE (exchange, symbol, timestamp)
        )"
    )
}

/// Run all schema migrations for the given table names.
pub fn run_migrations(conn: &Connection, bars_table: &str, criteria_table: &str) -> Result<(), StoreError> {
    let bars_table = check_identifier(bars_table)?;
    let criteria_table = check_identifier(criteria_table)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, &format!("001_bars:{bars_table}"), &bar_table_sql(bars_table))?;
    run_migration(
        conn,
        &format!("002_criteria:{criteria_table}"),
        &bar_table_sql(criteria_table),
    )?;
    run_migration(
        conn,
        &format!("003_bars_symbol_index:{bars_table}"),
        &format!("CREATE INDEX IF NOT EXISTS idx_{bars_table}_symbol ON {bars_table} (symbol, timestamp)"),
    )?;

    tracing::debug!(bars_table, criteria_table, "database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<(), StoreError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!(migration = name, "running migration");
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}
