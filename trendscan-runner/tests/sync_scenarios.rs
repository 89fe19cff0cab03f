//! End-to-end sync scenarios against a scripted in-process provider.
//!
//! Tests:
//! 1. Fresh symbol gets one full-backfill request and its rows persisted
//! 2. An up-to-date group costs zero requests and zero writes
//! 3. An empty backfill lands on the skip list and stops the run
//! 4. Batch discovery: 1000 and 500 fail, 250 succeeds → four batches
//! 5. Grouped-path failures are skipped and recorded
//! 6. Store failures abort the run
//! 7. Re-running a completed sync is a no-op

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{Duration, NaiveDate};
use trendscan_core::config::SyncConfig;
use trendscan_core::data::{
    BarArchive, BarProvider, FetchOutcome, ProviderBar, ProviderError, SkipList, Universe,
};
use trendscan_core::domain::{AssetClass, AssetKey, Bar};
use trendscan_runner::{
    BarStore, FailureStage, SqliteStore, StoreError, SyncError, SyncOrchestrator,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
struct Call {
    class: AssetClass,
    symbols: Vec<String>,
    start: NaiveDate,
    end: NaiveDate,
}

type Script = Box<dyn Fn(&Call) -> Result<FetchOutcome, ProviderError> + Send + Sync>;

/// Provider whose answers come from a closure; records every call.
struct ScriptedProvider {
    script: Script,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedProvider {
    fn new(script: impl Fn(&Call) -> Result<FetchOutcome, ProviderError> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// One bar per symbol per weekday in the window.
    fn daily() -> Self {
        Self::new(|call| Ok(FetchOutcome::from_rows(weekday_rows(call))))
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl BarProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch(
        &self,
        class: AssetClass,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchOutcome, ProviderError> {
        let call = Call {
            class,
            symbols: symbols.to_vec(),
            start,
            end,
        };
        let answer = (self.script)(&call);
        self.calls.lock().unwrap().push(call);
        answer
    }
}

fn weekday_rows(call: &Call) -> Vec<ProviderBar> {
    let mut rows = Vec::new();
    let mut date = call.start;
    while date <= call.end {
        let weekday = chrono::Datelike::weekday(&date).num_days_from_monday() < 5;
        if weekday || call.class == AssetClass::Crypto {
            for symbol in &call.symbols {
                rows.push(ProviderBar {
                    symbol: symbol.clone(),
                    date,
                    open: 10.0,
                    high: 11.0,
                    low: 9.5,
                    close: 10.5,
                    volume: 1000.0,
                    trade_count: Some(5.0),
                    vwap: Some(10.4),
                });
            }
        }
        date += Duration::days(1);
    }
    rows
}

fn stored_bar(exchange: &str, symbol: &str, date: NaiveDate) -> Bar {
    Bar {
        exchange: exchange.into(),
        symbol: symbol.into(),
        date,
        open: 1.0,
        high: 1.0,
        low: 1.0,
        close: 1.0,
        volume: 1.0,
        trade_count: None,
        vwap: None,
    }
}

fn universe(toml: &str) -> Universe {
    Universe::from_toml(toml).unwrap()
}

fn config() -> SyncConfig {
    SyncConfig {
        history_days: 30,
        ..SyncConfig::default()
    }
}

/// Store whose writes always fail.
struct BrokenStore;

impl BarStore for BrokenStore {
    fn latest_dates(&self) -> Result<BTreeMap<AssetKey, NaiveDate>, StoreError> {
        Ok(BTreeMap::new())
    }

    fn upsert_bars(&mut self, _bars: &[Bar]) -> Result<usize, StoreError> {
        Err(StoreError::InvalidIdentifier("disk on fire".into()))
    }
}

// ── 1. Fresh symbol ──────────────────────────────────────────────────

#[test]
fn fresh_symbol_gets_one_full_backfill() {
    let provider = ScriptedProvider::daily();
    let mut store = SqliteStore::in_memory().unwrap();
    let mut skip = SkipList::in_memory();
    let today = d(2024, 3, 6);

    let report = SyncOrchestrator::new(&provider, &mut store, &mut skip, &config())
        .run(&universe("[exchanges]\nNYSE = [\"IBM\"]\n"), today)
        .unwrap();

    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].symbols, vec!["IBM"]);
    assert_eq!(calls[0].end, d(2024, 3, 5));
    assert_eq!(calls[0].start, d(2024, 3, 5) - Duration::days(30));

    let expected = weekday_rows(&calls[0]).len();
    assert_eq!(report.rows_fetched, expected);
    assert_eq!(report.rows_persisted, expected);
    assert_eq!(store.row_count("bars").unwrap(), expected);
    assert!(skip.is_empty());
    assert!(report.failures.is_empty());
}

// ── 2. Up to date ────────────────────────────────────────────────────

#[test]
fn up_to_date_group_makes_no_calls() {
    let provider = ScriptedProvider::daily();
    let mut store = SqliteStore::in_memory().unwrap();
    // 2024-03-01 is a Friday; on Saturday it is the last completed session.
    store
        .upsert_bars(&[
            stored_bar("NYSE", "IBM", d(2024, 3, 1)),
            stored_bar("NYSE", "KO", d(2024, 3, 1)),
        ])
        .unwrap();
    let mut skip = SkipList::in_memory();

    let report = SyncOrchestrator::new(&provider, &mut store, &mut skip, &config())
        .run(&universe("[exchanges]\nNYSE = [\"IBM\", \"KO\"]\n"), d(2024, 3, 2))
        .unwrap();

    assert!(provider.calls().is_empty());
    assert_eq!(report.requests, 0);
    assert_eq!(report.groups, 1);
    assert_eq!(report.groups_up_to_date, 1);
    assert_eq!(report.rows_persisted, 0);
    assert_eq!(store.row_count("bars").unwrap(), 2);
}

#[test]
fn stale_group_fetches_from_day_after_watermark() {
    let provider = ScriptedProvider::daily();
    let mut store = SqliteStore::in_memory().unwrap();
    store
        .upsert_bars(&[
            stored_bar("NYSE", "IBM", d(2024, 3, 1)),
            stored_bar("NASDAQ", "AAPL", d(2024, 3, 1)),
        ])
        .unwrap();
    let mut skip = SkipList::in_memory();

    // Wednesday: Monday and Tuesday are missing.
    let report = SyncOrchestrator::new(&provider, &mut store, &mut skip, &config())
        .run(
            &universe("[exchanges]\nNYSE = [\"IBM\"]\nNASDAQ = [\"AAPL\"]\n"),
            d(2024, 3, 6),
        )
        .unwrap();

    let calls = provider.calls();
    // One probe plus one batch for the shared watermark group.
    assert_eq!(calls.len(), 2);
    for call in &calls {
        assert_eq!((call.start, call.end), (d(2024, 3, 2), d(2024, 3, 5)));
        assert_eq!(call.symbols.len(), 2);
    }
    assert_eq!(report.rows_persisted, 4);
    let latest = store.latest_dates().unwrap();
    assert_eq!(latest[&AssetKey::new("NASDAQ", "AAPL")], d(2024, 3, 5));
}

#[test]
fn crypto_is_grouped_and_fetched_separately() {
    let provider = ScriptedProvider::daily();
    let mut store = SqliteStore::in_memory().unwrap();
    store
        .upsert_bars(&[
            stored_bar("NYSE", "IBM", d(2024, 3, 1)),
            stored_bar("CRYPTO", "BTC/USD", d(2024, 3, 1)),
        ])
        .unwrap();
    let mut skip = SkipList::in_memory();

    // Sunday: equities are current, crypto is missing Saturday.
    SyncOrchestrator::new(&provider, &mut store, &mut skip, &config())
        .run(
            &universe("[exchanges]\nNYSE = [\"IBM\"]\nCRYPTO = [\"BTC/USD\"]\n"),
            d(2024, 3, 3),
        )
        .unwrap();

    let calls = provider.calls();
    assert!(!calls.is_empty());
    assert!(calls.iter().all(|c| c.class == AssetClass::Crypto));
    assert!(calls.iter().all(|c| c.symbols == vec!["BTC/USD"]));
    let latest = store.latest_dates().unwrap();
    assert_eq!(latest[&AssetKey::new("CRYPTO", "BTC/USD")], d(2024, 3, 2));
    assert_eq!(latest[&AssetKey::new("NYSE", "IBM")], d(2024, 3, 1));
}

// ── 3. Empty backfill ────────────────────────────────────────────────

#[test]
fn empty_backfill_skip_lists_and_aborts() {
    let provider = ScriptedProvider::new(|call| {
        if call.symbols == vec!["DEAD"] {
            Ok(FetchOutcome::EmptyNoData)
        } else {
            Ok(FetchOutcome::from_rows(weekday_rows(call)))
        }
    });
    let dir = tempfile::tempdir().unwrap();
    let skip_path = dir.path().join("skip.csv");
    let mut store = SqliteStore::in_memory().unwrap();
    let mut skip = SkipList::load(&skip_path).unwrap();

    // Keys are processed in sorted order: DEAD before LIVE.
    let err = SyncOrchestrator::new(&provider, &mut store, &mut skip, &config())
        .run(&universe("[exchanges]\nNYSE = [\"LIVE\", \"DEAD\"]\n"), d(2024, 3, 6))
        .unwrap_err();

    match err {
        SyncError::NeedsTriage { exchange, symbol } => {
            assert_eq!((exchange.as_str(), symbol.as_str()), ("NYSE", "DEAD"));
        }
        other => panic!("expected NeedsTriage, got {other:?}"),
    }
    assert!(skip.contains(&AssetKey::new("NYSE", "DEAD")));
    assert!(SkipList::load(&skip_path).unwrap().contains(&AssetKey::new("NYSE", "DEAD")));
    assert_eq!(provider.calls().len(), 1);
    assert_eq!(store.row_count("bars").unwrap(), 0);

    // Next run skips the triaged symbol.
    let report = SyncOrchestrator::new(&provider, &mut store, &mut skip, &config())
        .run(&universe("[exchanges]\nNYSE = [\"LIVE\", \"DEAD\"]\n"), d(2024, 3, 6))
        .unwrap();
    assert_eq!(report.universe, 1);
    assert!(provider.calls().iter().skip(1).all(|c| c.symbols == vec!["LIVE"]));
}

#[test]
fn backfill_provider_error_is_recorded_and_run_continues() {
    let provider = ScriptedProvider::new(|call| {
        if call.symbols == vec!["FLAKY"] {
            Err(ProviderError::NetworkUnreachable("connection reset".into()))
        } else {
            Ok(FetchOutcome::from_rows(weekday_rows(call)))
        }
    });
    let mut store = SqliteStore::in_memory().unwrap();
    let mut skip = SkipList::in_memory();

    let report = SyncOrchestrator::new(&provider, &mut store, &mut skip, &config())
        .run(&universe("[exchanges]\nNYSE = [\"FLAKY\", \"GOOD\"]\n"), d(2024, 3, 6))
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, FailureStage::Backfill);
    assert_eq!(report.failures[0].scope, "NYSE:FLAKY");
    assert!(skip.is_empty());
    assert_eq!(store.keys().unwrap(), vec![AssetKey::new("NYSE", "GOOD")]);
}

// ── 4. Batch discovery ───────────────────────────────────────────────

#[test]
fn thousand_symbol_group_settles_on_250() {
    let symbols: Vec<String> = (0..1000).map(|i| format!("S{i:04}")).collect();
    let mut store = SqliteStore::in_memory().unwrap();
    let seed: Vec<Bar> = symbols
        .iter()
        .map(|s| stored_bar("NYSE", s, d(2024, 3, 1)))
        .collect();
    store.upsert_bars(&seed).unwrap();

    let provider = ScriptedProvider::new(|call| {
        if call.symbols.len() > 250 {
            Err(ProviderError::Rejected {
                status: 400,
                message: "too many symbols".into(),
            })
        } else {
            Ok(FetchOutcome::from_rows(weekday_rows(call)))
        }
    });
    let mut skip = SkipList::in_memory();
    let list = symbols
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let report = SyncOrchestrator::new(&provider, &mut store, &mut skip, &config())
        .run(&universe(&format!("[exchanges]\nNYSE = [{list}]\n")), d(2024, 3, 5))
        .unwrap();

    let sizes: Vec<usize> = provider.calls().iter().map(|c| c.symbols.len()).collect();
    assert_eq!(sizes, vec![1000, 500, 250, 250, 250, 250, 250]);
    assert_eq!(report.batches, 4);
    assert_eq!(report.requests, 7);
    // Monday 2024-03-04 for every symbol.
    assert_eq!(report.rows_persisted, 1000);
    assert!(report.failures.is_empty());

    // Batches cover the group exactly once, in order.
    let covered: Vec<String> = provider.calls()[3..]
        .iter()
        .flat_map(|c| c.symbols.clone())
        .collect();
    assert_eq!(covered, symbols);
}

// ── 5. Grouped-path failures ─────────────────────────────────────────

#[test]
fn collapsed_group_is_skipped_and_recorded() {
    let mut store = SqliteStore::in_memory().unwrap();
    store
        .upsert_bars(&[
            stored_bar("NYSE", "A", d(2024, 3, 1)),
            stored_bar("NYSE", "B", d(2024, 3, 1)),
            stored_bar("NYSE", "C", d(2024, 2, 29)),
        ])
        .unwrap();
    // Every request touching the 03-01 group fails.
    let provider = ScriptedProvider::new(|call| {
        if call.start == d(2024, 3, 2) {
            Err(ProviderError::Other("HTTP 500".into()))
        } else {
            Ok(FetchOutcome::from_rows(weekday_rows(call)))
        }
    });
    let mut skip = SkipList::in_memory();

    let report = SyncOrchestrator::new(&provider, &mut store, &mut skip, &config())
        .run(&universe("[exchanges]\nNYSE = [\"A\", \"B\", \"C\"]\n"), d(2024, 3, 5))
        .unwrap();

    let plan_failures: Vec<_> = report
        .failures
        .iter()
        .filter(|f| f.stage == FailureStage::Plan)
        .collect();
    assert_eq!(plan_failures.len(), 1);
    // C's group (watermark 02-29) still synced.
    let latest = store.latest_dates().unwrap();
    assert_eq!(latest[&AssetKey::new("NYSE", "C")], d(2024, 3, 4));
    assert_eq!(latest[&AssetKey::new("NYSE", "A")], d(2024, 3, 1));
}

#[test]
fn empty_batch_is_recorded_not_skip_listed() {
    let mut store = SqliteStore::in_memory().unwrap();
    store
        .upsert_bars(&[stored_bar("NYSE", "QUIET", d(2024, 3, 1))])
        .unwrap();
    let provider = ScriptedProvider::new(|_| Ok(FetchOutcome::EmptyNoData));
    let mut skip = SkipList::in_memory();

    let report = SyncOrchestrator::new(&provider, &mut store, &mut skip, &config())
        .run(&universe("[exchanges]\nNYSE = [\"QUIET\"]\n"), d(2024, 3, 6))
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, FailureStage::EmptyBatch);
    assert!(skip.is_empty());
}

// ── 6. Store failure ─────────────────────────────────────────────────

#[test]
fn store_failure_aborts_run() {
    let provider = ScriptedProvider::daily();
    let mut store = BrokenStore;
    let mut skip = SkipList::in_memory();

    let err = SyncOrchestrator::new(&provider, &mut store, &mut skip, &config())
        .run(&universe("[exchanges]\nNYSE = [\"A\", \"B\"]\n"), d(2024, 3, 6))
        .unwrap_err();

    assert!(matches!(err, SyncError::Store(_)));
    // Stopped after the first backfill.
    assert_eq!(provider.calls().len(), 1);
}

// ── 7. Idempotent re-run, archive side channel ───────────────────────

#[test]
fn second_run_is_a_no_op_and_archive_mirrors_writes() {
    let provider = ScriptedProvider::daily();
    let mut store = SqliteStore::in_memory().unwrap();
    let mut skip = SkipList::in_memory();
    let dir = tempfile::tempdir().unwrap();
    let archive = BarArchive::new(dir.path());
    let u = universe("[exchanges]\nNYSE = [\"IBM\"]\nOTC = [\"PINK\"]\n");
    let today = d(2024, 3, 6);

    let first = SyncOrchestrator::new(&provider, &mut store, &mut skip, &config())
        .with_archive(&archive)
        .run(&u, today)
        .unwrap();
    // OTC is excluded by default.
    assert_eq!(first.universe, 1);
    assert_eq!(first.rows_archived, first.rows_persisted);
    assert_eq!(archive.read_all().unwrap().len(), first.rows_persisted);

    let second = SyncOrchestrator::new(&provider, &mut store, &mut skip, &config())
        .with_archive(&archive)
        .run(&u, today)
        .unwrap();
    assert_eq!(second.requests, 0);
    assert_eq!(second.groups_up_to_date, 1);
    assert_eq!(provider.calls().len(), 1);
}
