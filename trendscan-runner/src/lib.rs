//! TrendScan Runner: persistence, incremental sync, screening and queries.
//!
//! This crate builds on `trendscan-core` to provide:
//! - SQLite store with first-write-wins upserts and additive schema extension
//! - Watermark tracking and adaptive batch planning
//! - The sync orchestrator (provider → store, plus the CSV archive)
//! - The screen pipeline (store → trend template → criteria table)
//! - Read-path queries and archive import

pub mod import;
pub mod planner;
pub mod query;
pub mod screen;
pub mod store;
pub mod sync;
pub mod watermark;

pub use import::{import_archive, ImportError, ImportReport};
pub use planner::{BatchPlan, BatchPlanner, PlanError};
pub use query::{
    assets_by_exchange, criteria_history, first_signal_date, history, signal_dates, watchlist,
    WatchlistEntry,
};
pub use screen::{run_screen, ScreenReport};
pub use store::{BarStore, SqliteStore, StoreError};
pub use sync::{FailureStage, SyncError, SyncFailure, SyncOrchestrator, SyncReport};
pub use watermark::{Partition, WatermarkTracker};
