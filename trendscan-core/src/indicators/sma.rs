//! Simple moving averages over close (SMA) and volume (VMA).
//!
//! Lookback: period - 1 (first valid value at index period-1).

use super::Indicator;
use crate::domain::Bar;

/// Trailing arithmetic mean over `window` values.
///
/// Undefined (NaN) until the window is full, and for any window containing NaN.
///
/// Each window is summed from scratch rather than rolled: identical windows
/// then produce bit-identical means, so a flat series has a flat average.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if window == 0 || n < window {
        return result;
    }

    for (win, slot) in values.windows(window).zip(result[window - 1..].iter_mut()) {
        // NaN propagates through the sum.
        let sum: f64 = win.iter().sum();
        *slot = sum / window as f64;
    }

    result
}

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        rolling_mean(&closes, self.period)
    }
}

/// Volume moving average.
#[derive(Debug, Clone)]
pub struct Vma {
    period: usize,
    name: String,
}

impl Vma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "VMA period must be >= 1");
        Self {
            period,
            name: "vma".to_string(),
        }
    }
}

impl Indicator for Vma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        rolling_mean(&volumes, self.period)
    }
}
