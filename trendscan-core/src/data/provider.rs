//! Bar-data provider trait and structured error types.
//!
//! The `BarProvider` trait abstracts over the market-data source so the sync
//! engine can be driven by the Alpaca HTTP client in production and by
//! scripted providers in tests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AssetClass, Bar};

/// Daily bar as returned by a provider, before it is attributed to an exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub trade_count: Option<f64>,
    pub vwap: Option<f64>,
}

impl ProviderBar {
    pub fn into_bar(self, exchange: &str) -> Bar {
        Bar {
            exchange: exchange.to_string(),
            symbol: self.symbol,
            date: self.date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            trade_count: self.trade_count,
            vwap: self.vwap,
        }
    }
}

/// Structured error types for provider requests.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    /// The provider refused the request itself: too many symbols, an invalid
    /// symbol, a malformed window.
    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("hard stop: provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("provider error: {0}")]
    Other(String),
}

/// Outcome of a request the provider accepted.
///
/// An empty answer is kept apart from rows so callers decide what "no data"
/// means for them. It cannot tell a delisted symbol from a quiet window or a
/// provider-side gap.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Rows(Vec<ProviderBar>),
    EmptyNoData,
}

impl FetchOutcome {
    pub fn from_rows(rows: Vec<ProviderBar>) -> Self {
        if rows.is_empty() {
            FetchOutcome::EmptyNoData
        } else {
            FetchOutcome::Rows(rows)
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            FetchOutcome::Rows(rows) => rows.len(),
            FetchOutcome::EmptyNoData => 0,
        }
    }
}

/// A source of daily bars for a set of symbols over an inclusive date window.
pub trait BarProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily bars for every symbol in `symbols` over `[start, end]`.
    fn fetch(
        &self,
        class: AssetClass,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchOutcome, ProviderError>;

    /// Check if the provider is currently available (not blocked).
    fn is_available(&self) -> bool {
        true
    }
}
