//! Universe configuration: exchange-organized symbol lists.
//!
//! The universe is a TOML file mapping each exchange to its member symbols:
//!
//! ```toml
//! [exchanges]
//! NYSE = ["IBM", "KO", "TRUE"]
//! NASDAQ = ["AAPL", "MSFT"]
//! CRYPTO = ["BTC/USD", "ETH/USD"]
//! ```
//!
//! Symbols are always text. A TOML value that parses as a boolean or a number
//! (`true`, `1234`) is coerced back to its ticker spelling so it can never reach
//! the store as anything but a string.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::skip_list::SkipList;
use crate::config::SyncConfig;
use crate::domain::AssetKey;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("read universe file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse universe TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The complete universe configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    #[serde(deserialize_with = "exchanges_as_text")]
    pub exchanges: BTreeMap<String, Vec<String>>,
}

impl Universe {
    /// Load a universe from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path).map_err(|source| UniverseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a universe from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        Ok(toml::from_str(content)?)
    }

    /// Total number of listed symbols, duplicates included.
    pub fn symbol_count(&self) -> usize {
        self.exchanges.values().map(Vec::len).sum()
    }

    /// Every listed key, deduplicated and sorted.
    pub fn keys(&self) -> Vec<AssetKey> {
        self.exchanges
            .iter()
            .flat_map(|(exchange, symbols)| symbols.iter().map(move |s| AssetKey::new(exchange, s)))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Keys to sync this run: excluded exchanges and skip-listed keys removed.
    pub fn resolve(&self, sync: &SyncConfig, skip: &SkipList) -> Vec<AssetKey> {
        let all = self.keys();
        let total = all.len();
        let resolved: Vec<AssetKey> = all
            .into_iter()
            .filter(|k| !sync.is_excluded(&k.exchange))
            .filter(|k| !skip.contains(k))
            .collect();
        tracing::info!(
            listed = self.symbol_count(),
            unique = total,
            resolved = resolved.len(),
            skipped = skip.len(),
            "universe resolved"
        );
        resolved
    }
}

fn exchanges_as_text<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(transparent)]
    struct Symbols(#[serde(deserialize_with = "symbols_as_text")] Vec<String>);

    let raw = BTreeMap::<String, Symbols>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k, v.0)).collect())
}

fn symbols_as_text<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct SymbolList;

    impl<'de> Visitor<'de> for SymbolList {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a list of symbols")
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(SymbolText(s)) = seq.next_element()? {
                out.push(s);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_seq(SymbolList)
}

/// A single symbol, whatever scalar type the TOML parser gave it.
struct SymbolText(String);

impl<'de> Deserialize<'de> for SymbolText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Scalar;

        impl Visitor<'_> for Scalar {
            type Value = SymbolText;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a symbol string, boolean or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    return Err(E::custom("empty symbol"));
                }
                Ok(SymbolText(trimmed.to_string()))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                Ok(SymbolText(if v { "TRUE" } else { "FALSE" }.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(SymbolText(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(SymbolText(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(SymbolText(v.to_string()))
            }
        }

        deserializer.deserialize_any(Scalar)
    }
}
