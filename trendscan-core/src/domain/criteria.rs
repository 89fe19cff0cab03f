//! CriteriaRow: one evaluated trend-template row.

use serde::{Deserialize, Serialize};

use super::bar::Bar;

/// Value kind of a derived column, used to extend the persisted schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Boolean,
}

/// Derived columns a `CriteriaRow` carries on top of the bar fields, in storage order.
pub const DERIVED_COLUMNS: &[(&str, ColumnKind)] = &[
    ("atr", ColumnKind::Numeric),
    ("log_return", ColumnKind::Numeric),
    ("vma", ColumnKind::Numeric),
    ("sma_50", ColumnKind::Numeric),
    ("sma_150", ColumnKind::Numeric),
    ("sma_200", ColumnKind::Numeric),
    ("long_sma", ColumnKind::Boolean),
    ("long_hhhl", ColumnKind::Boolean),
    ("volume_spike", ColumnKind::Boolean),
    ("long_vspike", ColumnKind::Boolean),
    ("long_week_vup_lt_vdn", ColumnKind::Boolean),
    ("long_signal", ColumnKind::Boolean),
];

/// Indicator values for one bar. Every field is defined (finite) once a row exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub atr: f64,
    pub log_return: f64,
    pub vma: f64,
    pub sma_50: f64,
    pub sma_150: f64,
    pub sma_200: f64,
}

/// Trend-template flags for one bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaFlags {
    /// Price above SMA150 and SMA200, SMA150 above SMA200, SMA200 rising.
    pub long_sma: bool,
    /// Enough higher highs and higher lows inside the trailing window.
    pub long_hhhl: bool,
    /// This bar's volume is a spike relative to its volume average.
    pub volume_spike: bool,
    /// Enough spike days inside the trailing window.
    pub long_vspike: bool,
    /// More up weeks than down weeks on rolling weekly volume.
    pub long_week_vup_lt_vdn: bool,
}

impl CriteriaFlags {
    /// Combined signal: every criterion holds. `volume_spike` feeds `long_vspike`
    /// and is not a criterion of its own.
    pub fn signal(&self) -> bool {
        self.long_sma && self.long_hhhl && self.long_vspike && self.long_week_vup_lt_vdn
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaRow {
    pub bar: Bar,
    pub indicators: IndicatorSnapshot,
    pub flags: CriteriaFlags,
}

impl CriteriaRow {
    pub fn long_signal(&self) -> bool {
        self.flags.signal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_requires_every_criterion() {
        let mut flags = CriteriaFlags {
            long_sma: true,
            long_hhhl: true,
            volume_spike: false,
            long_vspike: true,
            long_week_vup_lt_vdn: true,
        };
        assert!(flags.signal());
        flags.long_hhhl = false;
        assert!(!flags.signal());
    }

    #[test]
    fn derived_columns_are_unique() {
        let mut names: Vec<&str> = DERIVED_COLUMNS.iter().map(|(n, _)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), DERIVED_COLUMNS.len());
    }
}
