//! Market-data access: provider abstraction, Alpaca client, universe, and the
//! file side channels (skip list, CSV archive).

pub mod alpaca;
pub mod archive;
pub mod circuit_breaker;
pub mod provider;
pub mod skip_list;
pub mod universe;

pub use alpaca::AlpacaProvider;
pub use archive::{ArchiveError, BarArchive};
pub use circuit_breaker::CircuitBreaker;
pub use provider::{BarProvider, FetchOutcome, ProviderBar, ProviderError};
pub use skip_list::{SkipList, SkipListError};
pub use universe::{Universe, UniverseError};
