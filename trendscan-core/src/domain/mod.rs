//! Domain types for trendscan

pub mod asset;
pub mod bar;
pub mod criteria;

pub use asset::{AssetClass, AssetKey, CRYPTO_EXCHANGE};
pub use bar::Bar;
pub use criteria::{ColumnKind, CriteriaFlags, CriteriaRow, IndicatorSnapshot, DERIVED_COLUMNS};
