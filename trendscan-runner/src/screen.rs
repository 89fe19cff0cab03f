//! Screen pipeline: evaluate every stored instrument and persist its criteria rows.

use serde::Serialize;
use trendscan_core::domain::DERIVED_COLUMNS;
use trendscan_core::screen::TrendTemplate;

use crate::store::{SqliteStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScreenReport {
    pub symbols: usize,
    /// Instruments with fewer bars than the longest indicator window.
    pub insufficient_history: usize,
    pub rows_evaluated: usize,
    pub rows_written: usize,
    /// Instruments whose most recent row carries the combined signal.
    pub signals: usize,
}

/// Evaluate the trend template over every instrument in the bars table.
pub fn run_screen(store: &mut SqliteStore, template: &TrendTemplate) -> Result<ScreenReport, StoreError> {
    let mut report = ScreenReport::default();
    let table = store.criteria_table().to_string();
    store.extend_schema(&table, DERIVED_COLUMNS)?;

    for key in store.keys()? {
        report.symbols += 1;
        let bars = store.load_bars(&key)?;
        let rows = template.evaluate(&bars);
        if rows.is_empty() {
            report.insufficient_history += 1;
            tracing::debug!(%key, bars = bars.len(), "not enough history to screen");
            continue;
        }
        if rows.last().is_some_and(|r| r.long_signal()) {
            report.signals += 1;
            tracing::info!(%key, "trend template signal");
        }
        report.rows_evaluated += rows.len();
        report.rows_written += store.upsert_criteria(&rows)?;
    }

    tracing::info!(
        symbols = report.symbols,
        insufficient = report.insufficient_history,
        written = report.rows_written,
        signals = report.signals,
        "screen finished"
    );
    Ok(report)
}
