//! Application configuration.
//!
//! Everything the sync and screen runs need is an explicit value loaded from a
//! TOML file; every section has defaults so a partial (or missing) file works.
//! Provider credentials never live in the file: they come from the environment,
//! optionally seeded from a `.env` file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::screen::CriteriaParams;

pub const KEY_ID_VAR: &str = "APCA_API_KEY_ID";
pub const SECRET_KEY_VAR: &str = "APCA_API_SECRET_KEY";
/// Upper bound on `provider.max_retries`.
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(&'static str),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub screen: CriteriaParams,
    pub paths: PathsConfig,
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, the defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sync = &self.sync;
        if sync.batch_floor == 0 {
            return Err(ConfigError::Invalid("sync.batch_floor must be at least 1".into()));
        }
        if sync.batch_floor > sync.batch_ceiling {
            return Err(ConfigError::Invalid(format!(
                "sync.batch_floor ({}) exceeds sync.batch_ceiling ({})",
                sync.batch_floor, sync.batch_ceiling
            )));
        }
        if sync.history_days <= 0 {
            return Err(ConfigError::Invalid("sync.history_days must be positive".into()));
        }
        if self.provider.max_retries > MAX_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "provider.max_retries ({}) exceeds {MAX_RETRIES}",
                self.provider.max_retries
            )));
        }
        if self.screen.atr_period == 0 || self.screen.vma_period == 0 {
            return Err(ConfigError::Invalid(
                "screen.atr_period and screen.vma_period must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Alpaca HTTP client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub stock_url: String,
    pub crypto_url: String,
    pub feed: String,
    pub adjustment: String,
    pub page_limit: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub breaker_cooldown_secs: u64,
    pub breaker_threshold: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            stock_url: "https://data.alpaca.markets/v2/stocks/bars".into(),
            crypto_url: "https://data.alpaca.markets/v1beta3/crypto/us/bars".into(),
            feed: "sip".into(),
            adjustment: "all".into(),
            page_limit: 10_000,
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 500,
            breaker_cooldown_secs: 30 * 60,
            breaker_threshold: 3,
        }
    }
}

/// SQLite store location and table names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub bars_table: String,
    pub criteria_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("trendscan.db"),
            bars_table: "bars".into(),
            criteria_table: "minervini".into(),
        }
    }
}

/// Sync engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Days of history requested for a symbol with no stored bars.
    pub history_days: i64,
    /// Largest batch the planner ever probes.
    pub batch_ceiling: usize,
    /// Smallest batch before the planner gives up on a group.
    pub batch_floor: usize,
    /// Exchanges never fetched (compared case-insensitively).
    pub excluded_exchanges: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            history_days: 7 * 365,
            batch_ceiling: 1000,
            batch_floor: 1,
            excluded_exchanges: vec!["OTC".into()],
        }
    }
}

impl SyncConfig {
    pub fn is_excluded(&self, exchange: &str) -> bool {
        self.excluded_exchanges
            .iter()
            .any(|e| e.eq_ignore_ascii_case(exchange))
    }
}

/// File locations for the universe and the side-channel files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub universe: PathBuf,
    pub skip_list: PathBuf,
    /// Per-symbol CSV archive; disabled when absent.
    pub archive_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            universe: PathBuf::from("universe.toml"),
            skip_list: PathBuf::from("skip_list.csv"),
            archive_dir: Some(PathBuf::from("archive")),
        }
    }
}

/// Alpaca API key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key_id: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("secret_key", &"***")
            .finish()
    }
}

impl Credentials {
    /// Read the key pair from the environment after loading an optional `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Ok(Self {
            key_id: read_var(KEY_ID_VAR)?,
            secret_key: read_var(SECRET_KEY_VAR)?,
        })
    }
}

fn read_var(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingCredential(name)),
    }
}
