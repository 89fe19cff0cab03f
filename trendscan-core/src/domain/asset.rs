//! Instrument identity: exchange + symbol, and the asset class derived from it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange name the provider uses for crypto pairs.
pub const CRYPTO_EXCHANGE: &str = "CRYPTO";

/// `(exchange, symbol)` pair identifying one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetKey {
    pub exchange: String,
    pub symbol: String,
}

impl AssetKey {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
        }
    }

    pub fn asset_class(&self) -> AssetClass {
        AssetClass::from_exchange(&self.exchange)
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

/// Calendar semantics of an instrument.
///
/// Equities trade in sessions (weekdays); crypto trades continuously. The two
/// are synced as separate groupings and hit different provider endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetClass {
    Equity,
    Crypto,
}

impl AssetClass {
    pub fn from_exchange(exchange: &str) -> Self {
        if exchange.eq_ignore_ascii_case(CRYPTO_EXCHANGE) {
            AssetClass::Crypto
        } else {
            AssetClass::Equity
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetClass::Equity => write!(f, "equity"),
            AssetClass::Crypto => write!(f, "crypto"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_exchange_is_case_insensitive() {
        assert_eq!(AssetClass::from_exchange("crypto"), AssetClass::Crypto);
        assert_eq!(AssetClass::from_exchange("CRYPTO"), AssetClass::Crypto);
        assert_eq!(AssetClass::from_exchange("NYSE"), AssetClass::Equity);
    }

    #[test]
    fn display_joins_with_colon() {
        assert_eq!(AssetKey::new("NYSE", "IBM").to_string(), "NYSE:IBM");
    }
}
