//! Alpaca market-data provider.
//!
//! Fetches daily bars for many symbols per request from Alpaca's multi-symbol
//! bars endpoints, following `next_page_token` until the answer is complete.
//! Handles retries with exponential backoff, response parsing, and the circuit
//! breaker.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use super::circuit_breaker::CircuitBreaker;
use super::provider::{BarProvider, FetchOutcome, ProviderBar, ProviderError};
use crate::config::{Credentials, ProviderConfig};
use crate::domain::AssetClass;

/// One page of the multi-symbol bars response.
#[derive(Debug, Deserialize)]
struct BarsPage {
    #[serde(default)]
    bars: Option<BTreeMap<String, Vec<AlpacaBar>>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    #[serde(default)]
    n: Option<f64>,
    #[serde(default)]
    vw: Option<f64>,
}

/// Alpaca data provider.
pub struct AlpacaProvider {
    client: reqwest::blocking::Client,
    config: ProviderConfig,
    credentials: Credentials,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl AlpacaProvider {
    pub fn new(
        config: ProviderConfig,
        credentials: Credentials,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            credentials,
            circuit_breaker,
        })
    }

    fn endpoint(&self, class: AssetClass) -> &str {
        match class {
            AssetClass::Equity => &self.config.stock_url,
            AssetClass::Crypto => &self.config.crypto_url,
        }
    }

    /// Query parameters for one page of a bars request.
    fn query(
        &self,
        class: AssetClass,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        page_token: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbols", symbols.join(",")),
            ("timeframe", "1Day".to_string()),
            ("start", start.format("%Y-%m-%d").to_string()),
            ("end", end.format("%Y-%m-%d").to_string()),
            ("limit", self.config.page_limit.to_string()),
        ];
        if class == AssetClass::Equity {
            params.push(("adjustment", self.config.adjustment.clone()));
            params.push(("feed", self.config.feed.clone()));
        }
        if let Some(token) = page_token {
            params.push(("page_token", token.to_string()));
        }
        params
    }

    /// Flatten one page into provider bars.
    fn parse_page(page: BarsPage) -> Vec<ProviderBar> {
        page.bars
            .unwrap_or_default()
            .into_iter()
            .flat_map(|(symbol, bars)| {
                bars.into_iter().map(move |bar| ProviderBar {
                    symbol: symbol.clone(),
                    date: bar.t.date_naive(),
                    open: bar.o,
                    high: bar.h,
                    low: bar.l,
                    close: bar.c,
                    volume: bar.v,
                    trade_count: bar.n,
                    vwap: bar.vw,
                })
            })
            .collect()
    }

    /// Execute a single page request with retry and circuit breaker logic.
    fn fetch_page_with_retry(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<BarsPage, ProviderError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(ProviderError::CircuitBreakerTripped);
        }

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.config.retry_base_delay_ms, attempt);
                tracing::debug!(attempt, ?delay, "retrying bars request");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(ProviderError::CircuitBreakerTripped);
            }

            let sent = self
                .client
                .get(url)
                .header("APCA-API-KEY-ID", &self.credentials.key_id)
                .header("APCA-API-SECRET-KEY", &self.credentials.secret_key)
                .query(params)
                .send();

            match sent {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::FORBIDDEN {
                        self.circuit_breaker.trip();
                        return Err(ProviderError::CircuitBreakerTripped);
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(ProviderError::AuthenticationRequired(
                            "Alpaca rejected the API key pair".into(),
                        ));
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        self.circuit_breaker.record_failure();
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(ProviderError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status.is_server_error() {
                        self.circuit_breaker.record_failure();
                        last_error = Some(ProviderError::Other(format!("HTTP {status}")));
                        continue;
                    }

                    if !status.is_success() {
                        let message = resp.text().unwrap_or_default();
                        return Err(ProviderError::Rejected {
                            status: status.as_u16(),
                            message,
                        });
                    }

                    let page: BarsPage = resp.json().map_err(|e| {
                        ProviderError::ResponseFormatChanged(format!(
                            "failed to parse bars response: {e}"
                        ))
                    })?;
                    self.circuit_breaker.record_success();
                    return Ok(page);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(ProviderError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(ProviderError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Other("max retries exceeded".into())))
    }
}

impl BarProvider for AlpacaProvider {
    fn name(&self) -> &str {
        "alpaca"
    }

    fn fetch(
        &self,
        class: AssetClass,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchOutcome, ProviderError> {
        let url = self.endpoint(class).to_string();
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let params = self.query(class, symbols, start, end, page_token.as_deref());
            let page = self.fetch_page_with_retry(&url, &params)?;
            pages += 1;
            page_token = page.next_page_token.clone().filter(|t| !t.is_empty());
            rows.extend(Self::parse_page(page));
            if page_token.is_none() {
                break;
            }
        }

        tracing::debug!(
            symbols = symbols.len(),
            %start,
            %end,
            pages,
            rows = rows.len(),
            "alpaca bars fetched"
        );
        Ok(FetchOutcome::from_rows(rows))
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

/// Exponential backoff before retry `attempt` (1-based), saturating instead of overflowing.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}
