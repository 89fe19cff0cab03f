//! Incremental sync orchestrator.
//!
//! One run:
//! 1. Resolve the universe (excluded exchanges and skip-listed keys removed).
//! 2. Partition it by watermark.
//! 3. New instruments: one full-backfill request each. Rows are persisted; an
//!    empty answer puts the instrument on the skip list and stops the run so
//!    someone can triage it; a provider error is logged and the run moves on.
//! 4. Watermark groups: up-to-date groups cost nothing. Others get a batch size
//!    from the planner and are fetched chunk by chunk over the group's window.
//!    Any failure here skips that group or chunk and is recorded.
//!
//! Store failures always abort the run.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use trendscan_core::config::SyncConfig;
use trendscan_core::data::{
    BarArchive, BarProvider, FetchOutcome, ProviderBar, SkipList, SkipListError, Universe,
    UniverseError,
};
use trendscan_core::domain::{AssetClass, AssetKey, Bar};

use crate::planner::BatchPlanner;
use crate::store::{BarStore, StoreError};
use crate::watermark::WatermarkTracker;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{exchange}:{symbol} returned no data for its full backfill; it was added to the skip list and needs triage")]
    NeedsTriage { exchange: String, symbol: String },

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("skip list: {0}")]
    SkipList(#[from] SkipListError),

    #[error("universe: {0}")]
    Universe(#[from] UniverseError),
}

/// Where in the run a recoverable failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Backfill,
    Plan,
    Batch,
    EmptyBatch,
    Archive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFailure {
    pub stage: FailureStage,
    pub scope: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub universe: usize,
    pub new_symbols: usize,
    pub groups: usize,
    pub groups_up_to_date: usize,
    pub batches: usize,
    pub requests: usize,
    pub rows_fetched: usize,
    pub rows_persisted: usize,
    pub rows_archived: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    fn fail(&mut self, stage: FailureStage, scope: impl Into<String>, message: impl ToString) {
        let failure = SyncFailure {
            stage,
            scope: scope.into(),
            message: message.to_string(),
        };
        tracing::warn!(stage = ?failure.stage, scope = %failure.scope, message = %failure.message, "sync step failed");
        self.failures.push(failure);
    }
}

pub struct SyncOrchestrator<'a> {
    provider: &'a dyn BarProvider,
    store: &'a mut dyn BarStore,
    skip_list: &'a mut SkipList,
    archive: Option<&'a BarArchive>,
    config: SyncConfig,
    tracker: WatermarkTracker,
    planner: BatchPlanner,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        provider: &'a dyn BarProvider,
        store: &'a mut dyn BarStore,
        skip_list: &'a mut SkipList,
        config: &SyncConfig,
    ) -> Self {
        Self {
            provider,
            store,
            skip_list,
            archive: None,
            config: config.clone(),
            tracker: WatermarkTracker::from_config(config),
            planner: BatchPlanner::from_config(config),
        }
    }

    /// Also append every persisted batch to a CSV archive.
    pub fn with_archive(mut self, archive: &'a BarArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn run(&mut self, universe: &Universe, today: NaiveDate) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        let keys = universe.resolve(&self.config, self.skip_list);
        report.universe = keys.len();

        let latest = self.store.latest_dates()?;
        let partition = self.tracker.partition(&keys, &latest);
        report.new_symbols = partition.new.len();
        report.groups = partition.group_count();

        tracing::info!(
            provider = self.provider.name(),
            %today,
            universe = keys.len(),
            new = partition.new.len(),
            tracked = partition.tracked_count(),
            groups = partition.group_count(),
            "sync started"
        );

        for key in &partition.new {
            self.backfill(key, today, &mut report)?;
        }

        for class in [AssetClass::Equity, AssetClass::Crypto] {
            for (watermark, group) in partition.groups(class) {
                self.sync_group(class, *watermark, group, today, &mut report)?;
            }
        }

        tracing::info!(
            requests = report.requests,
            fetched = report.rows_fetched,
            persisted = report.rows_persisted,
            up_to_date = report.groups_up_to_date,
            failures = report.failures.len(),
            "sync finished"
        );
        Ok(report)
    }

    fn backfill(&mut self, key: &AssetKey, today: NaiveDate, report: &mut SyncReport) -> Result<(), SyncError> {
        let (start, end) = self.tracker.backfill_window(today);
        let symbols = [key.symbol.clone()];
        tracing::debug!(%key, %start, %end, "full backfill");

        report.requests += 1;
        match self.provider.fetch(key.asset_class(), &symbols, start, end) {
            Ok(FetchOutcome::Rows(rows)) => self.persist(std::slice::from_ref(key), rows, report),
            Ok(FetchOutcome::EmptyNoData) => {
                self.skip_list.append(key.clone())?;
                tracing::error!(%key, %start, %end, "backfill returned no data; stopping for triage");
                Err(SyncError::NeedsTriage {
                    exchange: key.exchange.clone(),
                    symbol: key.symbol.clone(),
                })
            }
            Err(e) => {
                report.fail(FailureStage::Backfill, key.to_string(), e);
                Ok(())
            }
        }
    }

    fn sync_group(
        &mut self,
        class: AssetClass,
        watermark: NaiveDate,
        group: &[AssetKey],
        today: NaiveDate,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let scope = format!("{class} group @ {watermark} ({} symbols)", group.len());
        let (start, end) = WatermarkTracker::group_window(watermark, today);
        if WatermarkTracker::is_up_to_date(class, watermark, today) || start > end {
            report.groups_up_to_date += 1;
            tracing::debug!(%class, %watermark, symbols = group.len(), "group up to date");
            return Ok(());
        }

        let symbols: Vec<String> = group.iter().map(|k| k.symbol.clone()).collect();
        let provider = self.provider;
        let requests = &mut report.requests;
        let planned = self.planner.plan(symbols.len(), |n| {
            *requests += 1;
            provider
                .fetch(class, &symbols[..n.min(symbols.len())], start, end)
                .map(|_| ())
        });
        let plan = match planned {
            Ok(plan) => plan,
            Err(e) => {
                report.fail(FailureStage::Plan, scope, e);
                return Ok(());
            }
        };

        tracing::info!(
            %class,
            %watermark,
            %start,
            %end,
            symbols = group.len(),
            batch_size = plan.size,
            probes = plan.probes,
            batches = plan.batch_count(group.len()),
            "syncing group"
        );

        for (i, (keys, chunk)) in group.chunks(plan.size).zip(symbols.chunks(plan.size)).enumerate() {
            report.batches += 1;
            report.requests += 1;
            let batch_scope = format!("{scope} batch {}", i + 1);
            match self.provider.fetch(class, chunk, start, end) {
                Ok(FetchOutcome::Rows(rows)) => self.persist(keys, rows, report)?,
                Ok(FetchOutcome::EmptyNoData) => {
                    report.fail(FailureStage::EmptyBatch, batch_scope, "provider returned no rows")
                }
                Err(e) => report.fail(FailureStage::Batch, batch_scope, e),
            }
        }
        Ok(())
    }

    /// Attribute provider rows to the requested keys, store them, then archive them.
    fn persist(&mut self, keys: &[AssetKey], rows: Vec<ProviderBar>, report: &mut SyncReport) -> Result<(), SyncError> {
        report.rows_fetched += rows.len();
        let bars = attribute(keys, rows);
        let inserted = self.store.upsert_bars(&bars)?;
        report.rows_persisted += inserted;

        if let Some(archive) = self.archive {
            match archive.append(&bars) {
                Ok(n) => report.rows_archived += n,
                Err(e) => report.fail(FailureStage::Archive, archive.root().display().to_string(), e),
            }
        }
        Ok(())
    }
}

/// Stamp each row with the exchange(s) that requested its symbol; unrequested symbols are dropped.
fn attribute(keys: &[AssetKey], rows: Vec<ProviderBar>) -> Vec<Bar> {
    let mut exchanges: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for key in keys {
        exchanges.entry(key.symbol.as_str()).or_default().push(key.exchange.as_str());
    }

    let mut bars = Vec::with_capacity(rows.len());
    for row in rows {
        match exchanges.get(row.symbol.as_str()) {
            Some(list) => {
                let (last, rest) = match list.split_last() {
                    Some(split) => split,
                    None => continue,
                };
                for exchange in rest {
                    bars.push(row.clone().into_bar(exchange));
                }
                bars.push(row.into_bar(last));
            }
            None => tracing::warn!(symbol = %row.symbol, "provider returned an unrequested symbol"),
        }
    }
    bars
}
