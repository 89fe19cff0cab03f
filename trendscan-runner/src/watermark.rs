//! Watermark tracking: which instruments need what date window.
//!
//! An instrument's watermark is the latest date stored for it. Instruments with
//! no stored bars are "new" and get a full backfill; the rest are grouped by
//! watermark so every group shares one fetch window. Equities and crypto are
//! grouped separately because they hit different endpoints and calendars.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use trendscan_core::calendar;
use trendscan_core::config::SyncConfig;
use trendscan_core::domain::{AssetClass, AssetKey};

/// Universe split by sync state. All maps iterate in date order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub new: Vec<AssetKey>,
    pub equity: BTreeMap<NaiveDate, Vec<AssetKey>>,
    pub crypto: BTreeMap<NaiveDate, Vec<AssetKey>>,
}

impl Partition {
    pub fn groups(&self, class: AssetClass) -> &BTreeMap<NaiveDate, Vec<AssetKey>> {
        match class {
            AssetClass::Equity => &self.equity,
            AssetClass::Crypto => &self.crypto,
        }
    }

    pub fn group_count(&self) -> usize {
        self.equity.len() + self.crypto.len()
    }

    pub fn tracked_count(&self) -> usize {
        self.equity.values().chain(self.crypto.values()).map(Vec::len).sum()
    }
}

#[derive(Debug, Clone)]
pub struct WatermarkTracker {
    history_days: i64,
}

impl WatermarkTracker {
    pub fn new(history_days: i64) -> Self {
        Self { history_days }
    }

    pub fn from_config(sync: &SyncConfig) -> Self {
        Self::new(sync.history_days)
    }

    /// Split `keys` into new instruments and watermark groups.
    pub fn partition(&self, keys: &[AssetKey], latest: &BTreeMap<AssetKey, NaiveDate>) -> Partition {
        let mut partition = Partition::default();
        for key in keys {
            match latest.get(key) {
                None => partition.new.push(key.clone()),
                Some(&watermark) => {
                    let groups = match key.asset_class() {
                        AssetClass::Equity => &mut partition.equity,
                        AssetClass::Crypto => &mut partition.crypto,
                    };
                    groups.entry(watermark).or_default().push(key.clone());
                }
            }
        }
        tracing::debug!(
            new = partition.new.len(),
            equity_groups = partition.equity.len(),
            crypto_groups = partition.crypto.len(),
            "universe partitioned"
        );
        partition
    }

    /// Last date any fetch window may include.
    pub fn window_end(today: NaiveDate) -> NaiveDate {
        today - Duration::days(1)
    }

    /// Full-backfill window for an instrument with no stored bars.
    pub fn backfill_window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = Self::window_end(today);
        (end - Duration::days(self.history_days), end)
    }

    /// Incremental window for a group: the day after its watermark through yesterday.
    pub fn group_window(watermark: NaiveDate, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (watermark + Duration::days(1), Self::window_end(today))
    }

    /// Whether a group already holds the most recent completed day for its class.
    pub fn is_up_to_date(class: AssetClass, watermark: NaiveDate, today: NaiveDate) -> bool {
        watermark >= calendar::sync_target(class, today)
    }
}
