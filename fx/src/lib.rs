//! Bravo FX
//!
//! Upstream rate providers, the rate cache and conversion arithmetic for the
//! bravo currency service.
//!
//! # Features
//!
//! - Fiat table provider and two-step crypto provider (symbol listing, then prices)
//! - Atomic copy-then-swap rate snapshots with coalesced refreshes
//! - On-demand symbol index refresh and targeted single-code lookups
//! - Decimal conversion through USD with cent rounding
//!
//! # Example
//!
//! ```rust,ignore
//! use bravo_fx::{CoinGeckoProvider, ExchangeRateApiProvider, RateCache};
//! use bravo_common::{CurrencyCode, CurrencyKind};
//!
//! let cache = RateCache::new(Arc::new(fiat_provider), Arc::new(crypto_provider));
//! cache.refresh(&[CurrencyCode::new("BTC")]).await?;
//!
//! let btc = cache.rate_for(&CurrencyCode::new("BTC"), CurrencyKind::Crypto)?;
//! ```

pub mod provider;
pub mod cache;
pub mod conversion;
pub mod error;

pub use provider::{
    CoinGeckoProvider, CryptoRateProvider, ExchangeRateApiProvider, FiatRateProvider,
    HttpProviderConfig,
};
#[cfg(any(test, feature = "test-utils"))]
pub use provider::{MockCryptoProvider, MockFailure, MockFiatProvider};
pub use cache::{CacheStats, RateCache, RateCacheConfig, RateSnapshot, SharedRateCache};
pub use conversion::{convert_amount, Conversion};
pub use error::{FxError, FxResult};
