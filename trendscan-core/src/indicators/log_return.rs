//! Log return: ln(close[t] / close[t-1]). Undefined for the first bar.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone, Default)]
pub struct LogReturn;

impl LogReturn {
    pub fn new() -> Self {
        Self
    }
}

impl Indicator for LogReturn {
    fn name(&self) -> &str {
        "log_return"
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut result = vec![f64::NAN; bars.len()];
        for i in 1..bars.len() {
            result[i] = (bars[i].close / bars[i - 1].close).ln();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn first_value_undefined() {
        let out = LogReturn::new().compute(&make_bars(&[100.0, 110.0]));
        assert!(out[0].is_nan());
        assert_approx(out[1], (1.1f64).ln(), DEFAULT_EPSILON);
    }

    #[test]
    fn flat_price_is_zero_return() {
        let out = LogReturn::new().compute(&make_bars(&[50.0, 50.0, 50.0]));
        assert_approx(out[2], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn up_then_down_cancels() {
        let out = LogReturn::new().compute(&make_bars(&[100.0, 125.0, 100.0]));
        assert_approx(out[1] + out[2], 0.0, DEFAULT_EPSILON);
    }
}
