//! Rolling-window indicator library.
//!
//! Indicators are pure functions: bar history in, numeric series out. Every
//! output series is index-aligned with its input and uses `f64::NAN` for
//! "undefined" (warmup). Recomputing from scratch always yields the same series.

pub mod atr;
pub mod log_return;
pub mod sma;

pub use atr::{true_range, wilder_smooth, Atr};
pub use log_return::LogReturn;
pub use sma::{rolling_mean, Sma, Vma};

use crate::domain::Bar;

/// Trait for indicators.
///
/// Indicators take a full bar series and produce a numeric output series of
/// the same length. The first `lookback()` values are `f64::NAN`.
///
/// No value at index t may depend on bars after t.
pub trait Indicator: Send + Sync {
    /// Column-style name (e.g., "sma_50", "atr").
    fn name(&self) -> &str;

    /// Number of leading bars for which the output is undefined.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                exchange: "NYSE".to_string(),
                symbol: "TEST".to_string(),
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
                trade_count: None,
                vwap: None,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
