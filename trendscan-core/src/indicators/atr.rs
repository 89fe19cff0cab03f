//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|); the first
//! bar has no previous close, so its TR is just high-low.
//! ATR is Wilder smoothing of TR: a recursive average with alpha = 1/period,
//! seeded with the first TR and emitted once `period` observations are in.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: "atr".to_string(),
        }
    }
}

/// Compute the True Range series from bars.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let spread = (bar.high - bar.low).abs();
            if i == 0 {
                return spread;
            }
            let pc = bars[i - 1].close;
            if pc.is_nan() {
                return spread;
            }
            spread
                .max((bar.high - pc).abs())
                .max((bar.low - pc).abs())
        })
        .collect()
}

/// Wilder smoothing with alpha = 1/period.
///
/// `avg[t] = alpha * x[t] + (1 - alpha) * avg[t-1]`, seeded with the first
/// observation. Output is NaN until `period` non-NaN observations have been
/// consumed. NaN inputs produce NaN and leave the running average untouched.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if period == 0 {
        return result;
    }

    let alpha = 1.0 / period as f64;
    let mut avg: Option<f64> = None;
    let mut seen = 0usize;

    for (i, &x) in values.iter().enumerate() {
        if x.is_nan() {
            continue;
        }
        let next = match avg {
            None => x,
            Some(prev) => alpha * x + (1.0 - alpha) * prev,
        };
        avg = Some(next);
        seen += 1;
        if seen >= period {
            result[i] = next;
        }
    }

    result
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        wilder_smooth(&true_range(bars), self.period)
    }
}
