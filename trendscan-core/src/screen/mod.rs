//! Trend-template screen.
//!
//! Turns one symbol's ordered bar series into `CriteriaRow`s:
//! 1. Precompute ATR, log return, VMA and the 50/150/200 SMAs over the full series.
//! 2. Keep only the rows where every indicator is defined. Warmup rows are
//!    dropped, never defaulted.
//! 3. Run the criteria over the kept rows. Rolling windows start at the first
//!    kept row, so a criterion without enough history yet evaluates to false.

pub mod rules;

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, CriteriaFlags, CriteriaRow, IndicatorSnapshot};
use crate::indicators::{Atr, Indicator, LogReturn, Sma, Vma};

/// Periods of the three trend averages.
pub const SMA_PERIODS: [usize; 3] = [50, 150, 200];

/// Tunable thresholds for the screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriteriaParams {
    pub atr_period: usize,
    pub vma_period: usize,
    pub hhhl_window: usize,
    pub hhhl_min: usize,
    pub spike_ratio: f64,
    pub spike_window: usize,
    pub spike_min: usize,
    /// Rows summed into one "week" of volume.
    pub week_len: usize,
    pub week_direction_window: usize,
}

impl Default for CriteriaParams {
    fn default() -> Self {
        Self {
            atr_period: 14,
            vma_period: 50,
            hhhl_window: 30,
            hhhl_min: 5,
            spike_ratio: 1.3,
            spike_window: 30,
            spike_min: 3,
            week_len: 7,
            week_direction_window: 5,
        }
    }
}

/// The trend-template evaluator.
#[derive(Debug, Clone, Default)]
pub struct TrendTemplate {
    params: CriteriaParams,
}

impl TrendTemplate {
    pub fn new(params: CriteriaParams) -> Self {
        Self { params }
    }

    /// Minimum number of bars before the first row can be produced.
    pub fn warmup(&self) -> usize {
        let longest_sma = SMA_PERIODS.iter().copied().max().unwrap_or(1);
        longest_sma
            .max(self.params.atr_period)
            .max(self.params.vma_period)
            .max(2)
    }

    /// Evaluate a single symbol's bars, which must be sorted by date ascending.
    pub fn evaluate(&self, bars: &[Bar]) -> Vec<CriteriaRow> {
        let p = &self.params;

        let atr = Atr::new(p.atr_period).compute(bars);
        let log_return = LogReturn::new().compute(bars);
        let vma = Vma::new(p.vma_period).compute(bars);
        let [sma_50, sma_150, sma_200] = SMA_PERIODS.map(|period| Sma::new(period).compute(bars));

        let kept: Vec<(&Bar, IndicatorSnapshot)> = bars
            .iter()
            .enumerate()
            .filter_map(|(i, bar)| {
                let snapshot = IndicatorSnapshot {
                    atr: atr[i],
                    log_return: log_return[i],
                    vma: vma[i],
                    sma_50: sma_50[i],
                    sma_150: sma_150[i],
                    sma_200: sma_200[i],
                };
                let defined = [
                    snapshot.atr,
                    snapshot.log_return,
                    snapshot.vma,
                    snapshot.sma_50,
                    snapshot.sma_150,
                    snapshot.sma_200,
                ]
                .iter()
                .all(|v| v.is_finite());
                defined.then_some((bar, snapshot))
            })
            .collect();

        if kept.is_empty() {
            return Vec::new();
        }

        let column = |f: fn(&(&Bar, IndicatorSnapshot)) -> f64| -> Vec<f64> {
            kept.iter().map(f).collect()
        };
        let close = column(|(b, _)| b.close);
        let high = column(|(b, _)| b.high);
        let low = column(|(b, _)| b.low);
        let volume = column(|(b, _)| b.volume);
        let vma = column(|(_, s)| s.vma);
        let sma_150 = column(|(_, s)| s.sma_150);
        let sma_200 = column(|(_, s)| s.sma_200);

        let long_sma = rules::trend(&close, &sma_150, &sma_200);
        let long_hhhl = rules::higher_highs_lows(&high, &low, p.hhhl_window, p.hhhl_min);
        let volume_spike = rules::volume_spikes(&volume, &vma, p.spike_ratio);
        let long_vspike = rules::spike_series(&volume_spike, p.spike_window, p.spike_min);
        let long_week =
            rules::weekly_volume_direction(&volume, p.week_len, p.week_direction_window);

        kept.into_iter()
            .enumerate()
            .map(|(t, (bar, indicators))| CriteriaRow {
                bar: bar.clone(),
                indicators,
                flags: CriteriaFlags {
                    long_sma: long_sma[t],
                    long_hhhl: long_hhhl[t],
                    volume_spike: volume_spike[t],
                    long_vspike: long_vspike[t],
                    long_week_vup_lt_vdn: long_week[t],
                },
            })
            .collect()
    }
}
