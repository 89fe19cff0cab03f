//! Boolean series rules behind the trend template.
//!
//! Every function takes index-aligned slices and returns a series of the same
//! length. A step without enough history for a rule evaluates to `false`.

/// `values[t] > values[t-1]`; false at t = 0 and ties never count.
pub fn strictly_rising(values: &[f64]) -> Vec<bool> {
    let mut out = vec![false; values.len()];
    for t in 1..values.len() {
        out[t] = values[t] > values[t - 1];
    }
    out
}

/// Number of `true` flags in the trailing `window` steps, `None` until the window is full.
pub fn rolling_count(flags: &[bool], window: usize) -> Vec<Option<usize>> {
    let mut out = vec![None; flags.len()];
    if window == 0 {
        return out;
    }
    let mut count = 0usize;
    for t in 0..flags.len() {
        if flags[t] {
            count += 1;
        }
        if t >= window && flags[t - window] {
            count -= 1;
        }
        if t + 1 >= window {
            out[t] = Some(count);
        }
    }
    out
}

/// Trailing sum over `window` values, NaN until the window is full.
pub fn rolling_sum(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    for (win, slot) in values.windows(window).zip(out[window - 1..].iter_mut()) {
        *slot = win.iter().sum();
    }
    out
}

/// Step-over-step fractional change, NaN where either side is undefined.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for t in 1..values.len() {
        out[t] = (values[t] - values[t - 1]) / values[t - 1];
    }
    out
}

fn at_least(counts: &[Option<usize>], min: usize) -> Vec<bool> {
    counts.iter().map(|c| c.is_some_and(|c| c >= min)).collect()
}

/// Trend criterion: close above SMA150 and SMA200, SMA150 above SMA200, and
/// SMA200 strictly above its previous value.
pub fn trend(close: &[f64], sma_150: &[f64], sma_200: &[f64]) -> Vec<bool> {
    let rising = strictly_rising(sma_200);
    (0..close.len())
        .map(|t| {
            close[t] > sma_150[t] && close[t] > sma_200[t] && sma_150[t] > sma_200[t] && rising[t]
        })
        .collect()
}

/// Higher-highs/higher-lows criterion: at least `min` strict higher highs and
/// at least `min` strict higher lows inside the same trailing `window`.
pub fn higher_highs_lows(high: &[f64], low: &[f64], window: usize, min: usize) -> Vec<bool> {
    let highs = at_least(&rolling_count(&strictly_rising(high), window), min);
    let lows = at_least(&rolling_count(&strictly_rising(low), window), min);
    highs.iter().zip(lows.iter()).map(|(h, l)| *h && *l).collect()
}

/// Daily spike flag: `volume > ratio * vma`, strict.
pub fn volume_spikes(volume: &[f64], vma: &[f64], ratio: f64) -> Vec<bool> {
    volume
        .iter()
        .zip(vma.iter())
        .map(|(v, avg)| *v > ratio * avg)
        .collect()
}

/// Volume-spike criterion: at least `min` spike days in the trailing `window`.
pub fn spike_series(spikes: &[bool], window: usize, min: usize) -> Vec<bool> {
    at_least(&rolling_count(spikes, window), min)
}

/// Weekly volume-direction criterion.
///
/// Volume is summed over the trailing `week_len` rows (raw rows, not trading
/// weeks), the rolling sum's change is classified as an up or down week, and
/// the step passes when the trailing `window` holds strictly more ups than downs.
pub fn weekly_volume_direction(volume: &[f64], week_len: usize, window: usize) -> Vec<bool> {
    let change = pct_change(&rolling_sum(volume, week_len));
    let up: Vec<bool> = change.iter().map(|c| *c > 0.0).collect();
    let down: Vec<bool> = change.iter().map(|c| *c < 0.0).collect();
    let ups = rolling_count(&up, window);
    let downs = rolling_count(&down, window);
    ups.iter()
        .zip(downs.iter())
        .map(|(u, d)| match (u, d) {
            (Some(u), Some(d)) => u > d,
            _ => false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rising_ignores_ties() {
        assert_eq!(
            strictly_rising(&[1.0, 2.0, 2.0, 3.0, 1.0]),
            vec![false, true, false, true, false]
        );
    }

    #[test]
    fn rolling_count_waits_for_full_window() {
        let counts = rolling_count(&[true, true, false, true], 3);
        assert_eq!(counts, vec![None, None, Some(2), Some(2)]);
    }

    #[test]
    fn spike_comparison_is_strict() {
        let spikes = volume_spikes(&[130.0, 131.0], &[100.0, 100.0], 1.3);
        assert_eq!(spikes, vec![false, true]);
    }

    #[test]
    fn hhhl_needs_both_series() {
        // Highs rise every step, lows are flat.
        let high: Vec<f64> = (0..10).map(|i| 10.0 + i as f64).collect();
        let low = vec![5.0; 10];
        assert!(higher_highs_lows(&high, &low, 5, 2).iter().all(|p| !p));

        let low: Vec<f64> = (0..10).map(|i| 5.0 + i as f64).collect();
        let passed = higher_highs_lows(&high, &low, 5, 2);
        assert!(!passed[3]);
        assert!(passed[4]);
    }

    #[test]
    fn weekly_direction_counts_up_weeks() {
        // Steadily growing volume: every weekly change is positive.
        let volume: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let passed = weekly_volume_direction(&volume, 7, 5);
        // First change at index 7; the window is full from index 4 but holds
        // no ups before index 7.
        assert!(!passed[6]);
        assert!(passed[7]);
        assert!(passed[19]);
    }

    #[test]
    fn weekly_direction_tie_fails() {
        let volume = vec![100.0; 20];
        assert!(weekly_volume_direction(&volume, 7, 5).iter().all(|p| !p));
    }

    #[test]
    fn pct_change_of_zero_base_is_infinite() {
        let change = pct_change(&[0.0, 5.0]);
        assert!(change[1].is_infinite() && change[1] > 0.0);
    }
}
