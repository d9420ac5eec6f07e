//! Rate cache holding the fiat and crypto tables and the symbol index.

use bravo_common::{CurrencyCode, CurrencyKind, RateTable, SymbolIndex};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{FxError, FxResult};
use crate::provider::{CryptoRateProvider, FiatRateProvider};

/// Configuration for the rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// A snapshot younger than this serves reads without refreshing.
    /// Zero refreshes before every read that needs live data.
    pub max_age: Duration,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::zero(),
        }
    }
}

/// Both rate tables as of one refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateSnapshot {
    pub fiat: RateTable,
    pub crypto: RateTable,
    /// Completion time of the last full refresh.
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl RateSnapshot {
    fn empty() -> Self {
        Self {
            fiat: RateTable::new(CurrencyKind::Fiat),
            crypto: RateTable::new(CurrencyKind::Crypto),
            refreshed_at: None,
        }
    }

    /// Table for a live currency kind.
    pub fn table(&self, kind: CurrencyKind) -> Option<&RateTable> {
        match kind {
            CurrencyKind::Fiat => Some(&self.fiat),
            CurrencyKind::Crypto => Some(&self.crypto),
            CurrencyKind::Fictitious => None,
        }
    }
}

/// Thread-safe cache of upstream rates.
///
/// Tables are never mutated in place: every update builds a new snapshot and
/// swaps the shared pointer, so readers see either the old or the new tables.
pub struct RateCache {
    fiat_provider: Arc<dyn FiatRateProvider>,
    crypto_provider: Arc<dyn CryptoRateProvider>,
    snapshot: RwLock<Arc<RateSnapshot>>,
    symbols: RwLock<Arc<SymbolIndex>>,
    refresh_gate: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    config: RateCacheConfig,
}

impl RateCache {
    /// Create a new rate cache with default configuration.
    pub fn new(
        fiat_provider: Arc<dyn FiatRateProvider>,
        crypto_provider: Arc<dyn CryptoRateProvider>,
    ) -> Self {
        Self::with_config(fiat_provider, crypto_provider, RateCacheConfig::default())
    }

    /// Create a new rate cache with custom configuration.
    pub fn with_config(
        fiat_provider: Arc<dyn FiatRateProvider>,
        crypto_provider: Arc<dyn CryptoRateProvider>,
        config: RateCacheConfig,
    ) -> Self {
        Self {
            fiat_provider,
            crypto_provider,
            snapshot: RwLock::new(Arc::new(RateSnapshot::empty())),
            symbols: RwLock::new(Arc::new(SymbolIndex::new())),
            refresh_gate: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            config,
        }
    }

    /// Fetch the full fiat table from the fiat provider.
    pub async fn fetch_fiat_rates(&self) -> FxResult<RateTable> {
        self.fiat_provider.fetch_fiat_rates().await
    }

    /// Fetch the symbol to id listing from the crypto provider.
    pub async fn fetch_symbol_index(&self) -> FxResult<SymbolIndex> {
        self.crypto_provider.fetch_symbol_index().await
    }

    /// Fetch USD prices for the given `code -> provider id` assignments.
    ///
    /// Codes whose id has no price are left out of the table.
    pub async fn fetch_crypto_rates(
        &self,
        ids: &BTreeMap<CurrencyCode, String>,
    ) -> FxResult<RateTable> {
        let mut table = RateTable::new(CurrencyKind::Crypto);
        if ids.is_empty() {
            return Ok(table);
        }

        let wanted: BTreeSet<String> = ids.values().cloned().collect();
        let prices = self.crypto_provider.fetch_usd_prices(&wanted).await?;

        for (code, id) in ids {
            match prices.get(id) {
                Some(price) => table.insert(code.clone(), *price),
                None => warn!(code = %code, id = %id, "Crypto provider returned no USD price"),
            }
        }
        Ok(table)
    }

    /// Refetch every table and swap them in together.
    ///
    /// `crypto_codes` are the crypto currencies to price. Any failure leaves
    /// the previous tables in place. A refresh that waited on another one
    /// finishing is skipped.
    pub async fn refresh(&self, crypto_codes: &[CurrencyCode]) -> FxResult<()> {
        let seen = self.generation.load(Ordering::Acquire);
        let _gate = self.refresh_gate.lock().await;
        if self.generation.load(Ordering::Acquire) != seen {
            debug!("Refresh coalesced with a concurrent one");
            return Ok(());
        }

        let fiat = self.fetch_fiat_rates().await?;
        let symbols = self.fetch_symbol_index().await?;

        let mut ids = BTreeMap::new();
        for code in crypto_codes {
            match symbols.id_for(code) {
                Some(id) => {
                    ids.insert(code.clone(), id.to_string());
                }
                None => warn!(code = %code, "Crypto symbol not listed by provider"),
            }
        }
        let crypto = self.fetch_crypto_rates(&ids).await?;

        let next = RateSnapshot {
            fiat,
            crypto,
            refreshed_at: Some(Utc::now()),
        };
        info!(
            fiat_rates = next.fiat.len(),
            crypto_rates = next.crypto.len(),
            symbols = symbols.len(),
            "Rates refreshed"
        );

        *self.symbols.write() = Arc::new(symbols);
        *self.snapshot.write() = Arc::new(next);
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Refresh unless the current snapshot is younger than the configured age.
    pub async fn refresh_if_stale(&self, crypto_codes: &[CurrencyCode]) -> FxResult<()> {
        if self.is_fresh() {
            debug!("Cache fresh, skipping refresh");
            return Ok(());
        }
        self.refresh(crypto_codes).await
    }

    fn is_fresh(&self) -> bool {
        if self.config.max_age <= Duration::zero() {
            return false;
        }
        self.snapshot
            .read()
            .refreshed_at
            .map(|at| Utc::now().signed_duration_since(at) < self.config.max_age)
            .unwrap_or(false)
    }

    /// Look up a cached USD rate.
    ///
    /// Fictitious currencies carry their own rate and are never found here.
    pub fn rate_for(&self, code: &CurrencyCode, kind: CurrencyKind) -> FxResult<Decimal> {
        let snapshot = self.snapshot();
        let rate = snapshot
            .table(kind)
            .and_then(|table| table.rate(code))
            .ok_or_else(|| FxError::RateNotAvailable(code.clone()))?;

        if rate <= Decimal::ZERO {
            return Err(FxError::InvalidRate {
                code: code.clone(),
                rate,
            });
        }

        debug!(code = %code, kind = %kind, rate = %rate, "Cache hit");
        Ok(rate)
    }

    /// Resolve a crypto symbol to the provider id.
    ///
    /// An unknown symbol triggers one listing refetch before giving up, which
    /// picks up assets listed since the last refresh.
    pub async fn resolve_crypto_id(&self, symbol: &CurrencyCode) -> FxResult<String> {
        let indexed = self.symbols.read().id_for(symbol).map(str::to_string);
        if let Some(id) = indexed {
            return Ok(id);
        }

        debug!(symbol = %symbol, "Symbol not indexed, refetching listing");
        let symbols = self.fetch_symbol_index().await?;
        let id = symbols.id_for(symbol).map(str::to_string);
        *self.symbols.write() = Arc::new(symbols);

        id.ok_or_else(|| FxError::RateNotAvailable(symbol.clone()))
    }

    /// Return the cached rate, fetching just this code when it is missing.
    pub async fn lookup_rate(&self, code: &CurrencyCode, kind: CurrencyKind) -> FxResult<Decimal> {
        match self.rate_for(code, kind) {
            Err(FxError::RateNotAvailable(_)) => {}
            cached => return cached,
        }

        match kind {
            CurrencyKind::Fiat => {
                let fiat = self.fetch_fiat_rates().await?;
                if !fiat.contains(code) {
                    return Err(FxError::RateNotAvailable(code.clone()));
                }
                self.update_snapshot(|snapshot| snapshot.fiat = fiat);
            }
            CurrencyKind::Crypto => {
                let id = self.resolve_crypto_id(code).await?;
                let ids = BTreeMap::from([(code.clone(), id)]);
                let priced = self.fetch_crypto_rates(&ids).await?;
                if priced.is_empty() {
                    return Err(FxError::RateNotAvailable(code.clone()));
                }
                self.update_snapshot(|snapshot| snapshot.crypto.merge(priced));
            }
            CurrencyKind::Fictitious => return Err(FxError::RateNotAvailable(code.clone())),
        }

        info!(code = %code, kind = %kind, "Fetched rate on demand");
        self.rate_for(code, kind)
    }

    fn update_snapshot(&self, apply: impl FnOnce(&mut RateSnapshot)) {
        let mut guard = self.snapshot.write();
        let mut next = RateSnapshot::clone(&guard);
        apply(&mut next);
        *guard = Arc::new(next);
    }

    /// Current tables.
    pub fn snapshot(&self) -> Arc<RateSnapshot> {
        self.snapshot.read().clone()
    }

    /// Current symbol index.
    pub fn symbol_index(&self) -> Arc<SymbolIndex> {
        self.symbols.read().clone()
    }

    /// Drop every cached table and symbol.
    pub fn clear(&self) {
        *self.snapshot.write() = Arc::new(RateSnapshot::empty());
        *self.symbols.write() = Arc::new(SymbolIndex::new());
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let snapshot = self.snapshot();
        CacheStats {
            fiat_entries: snapshot.fiat.len(),
            crypto_entries: snapshot.crypto.len(),
            indexed_symbols: self.symbols.read().len(),
            refreshes: self.generation.load(Ordering::Acquire),
            refreshed_at: snapshot.refreshed_at,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub fiat_entries: usize,
    pub crypto_entries: usize,
    pub indexed_symbols: usize,
    pub refreshes: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Shared rate cache.
pub type SharedRateCache = Arc<RateCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockCryptoProvider, MockFailure, MockFiatProvider};
    use rust_decimal_macros::dec;

    fn providers() -> (Arc<MockFiatProvider>, Arc<MockCryptoProvider>) {
        let fiat = Arc::new(MockFiatProvider::new("fiat"));
        fiat.set_rate("USD", dec!(1));
        fiat.set_rate("BRL", dec!(5));
        fiat.set_rate("EUR", dec!(0.85));
        fiat.set_rate("JPY", dec!(150));

        let crypto = Arc::new(MockCryptoProvider::new("crypto"));
        crypto.list_symbol("btc", "bitcoin");
        crypto.list_symbol("eth", "ethereum");
        crypto.set_price("bitcoin", dec!(45000));
        crypto.set_price("ethereum", dec!(3000));

        (fiat, crypto)
    }

    fn codes(list: &[&str]) -> Vec<CurrencyCode> {
        list.iter().map(CurrencyCode::new).collect()
    }

    #[tokio::test]
    async fn test_refresh_populates_tables() {
        let (fiat, crypto) = providers();
        let cache = RateCache::new(fiat, crypto);

        cache.refresh(&codes(&["BTC", "ETH"])).await.unwrap();

        let snapshot = cache.snapshot();
        // Every reported fiat code is kept, not only registered ones.
        assert_eq!(snapshot.fiat.len(), 4);
        assert_eq!(snapshot.crypto.len(), 2);
        assert!(snapshot.refreshed_at.is_some());
        assert_eq!(
            cache.rate_for(&CurrencyCode::new("BTC"), CurrencyKind::Crypto).unwrap(),
            dec!(45000)
        );
        assert_eq!(
            cache.rate_for(&CurrencyCode::new("eur"), CurrencyKind::Fiat).unwrap(),
            dec!(0.85)
        );
    }

    #[tokio::test]
    async fn test_rate_for_respects_kind() {
        let (fiat, crypto) = providers();
        let cache = RateCache::new(fiat, crypto);
        cache.refresh(&codes(&["BTC"])).await.unwrap();

        let btc = CurrencyCode::new("BTC");
        assert!(matches!(
            cache.rate_for(&btc, CurrencyKind::Fiat),
            Err(FxError::RateNotAvailable(_))
        ));
        assert!(matches!(
            cache.rate_for(&btc, CurrencyKind::Fictitious),
            Err(FxError::RateNotAvailable(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let (fiat, crypto) = providers();
        let cache = RateCache::new(fiat, crypto);

        cache.refresh(&codes(&["BTC", "ETH"])).await.unwrap();
        let first = cache.snapshot();
        let first_symbols = cache.symbol_index();

        cache.refresh(&codes(&["BTC", "ETH"])).await.unwrap();
        let second = cache.snapshot();

        assert_eq!(first.fiat, second.fiat);
        assert_eq!(first.crypto, second.crypto);
        assert_eq!(*first_symbols, *cache.symbol_index());
        assert_eq!(cache.stats().refreshes, 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_tables() {
        let (fiat, crypto) = providers();
        let cache = RateCache::new(fiat.clone(), crypto.clone());
        cache.refresh(&codes(&["BTC"])).await.unwrap();
        let before = cache.snapshot();

        fiat.set_rate("BRL", dec!(6));
        crypto.fail_listing_with(Some(MockFailure::Status(502)));
        let result = cache.refresh(&codes(&["BTC"])).await;

        assert!(matches!(result, Err(FxError::UnexpectedStatus { status: 502, .. })));
        assert_eq!(*cache.snapshot(), *before);
        assert_eq!(
            cache.rate_for(&CurrencyCode::new("BRL"), CurrencyKind::Fiat).unwrap(),
            dec!(5)
        );
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_without_retry() {
        let (fiat, crypto) = providers();
        fiat.fail_with(Some(MockFailure::RateLimited));
        let cache = RateCache::new(fiat.clone(), crypto.clone());

        let result = cache.refresh(&codes(&["BTC"])).await;

        assert!(matches!(result, Err(FxError::RateLimited { .. })));
        assert_eq!(fiat.calls(), 1);
        assert_eq!(crypto.listing_calls(), 0);
    }

    #[tokio::test]
    async fn test_unlisted_and_unpriced_crypto_are_skipped() {
        let (fiat, crypto) = providers();
        crypto.list_symbol("ghost", "ghost-coin");
        crypto.remove_price("ethereum");
        let cache = RateCache::new(fiat, crypto);

        cache.refresh(&codes(&["BTC", "ETH", "GHOST", "NOPE"])).await.unwrap();

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.crypto.len(), 1);
        assert!(snapshot.crypto.contains(&CurrencyCode::new("BTC")));
    }

    #[tokio::test]
    async fn test_resolve_crypto_id_refetches_listing_once() {
        let (fiat, crypto) = providers();
        let cache = RateCache::new(fiat, crypto.clone());
        cache.refresh(&[]).await.unwrap();
        assert_eq!(crypto.listing_calls(), 1);

        crypto.list_symbol("sol", "solana");
        let id = cache.resolve_crypto_id(&CurrencyCode::new("SOL")).await.unwrap();
        assert_eq!(id, "solana");
        assert_eq!(crypto.listing_calls(), 2);

        // Now indexed, no further listing call.
        cache.resolve_crypto_id(&CurrencyCode::new("sol")).await.unwrap();
        assert_eq!(crypto.listing_calls(), 2);

        let missing = cache.resolve_crypto_id(&CurrencyCode::new("NOPE")).await;
        assert!(matches!(missing, Err(FxError::RateNotAvailable(_))));
        assert_eq!(crypto.listing_calls(), 3);
    }

    #[tokio::test]
    async fn test_lookup_rate_fetches_missing_crypto() {
        let (fiat, crypto) = providers();
        let cache = RateCache::new(fiat, crypto.clone());
        cache.refresh(&codes(&["BTC"])).await.unwrap();

        crypto.list_symbol("sol", "solana");
        crypto.set_price("solana", dec!(150.25));
        let rate = cache
            .lookup_rate(&CurrencyCode::new("SOL"), CurrencyKind::Crypto)
            .await
            .unwrap();

        assert_eq!(rate, dec!(150.25));
        // Existing entries survive the targeted update.
        assert_eq!(cache.snapshot().crypto.len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_rate_unknown_fiat() {
        let (fiat, crypto) = providers();
        let cache = RateCache::new(fiat.clone(), crypto);

        let result = cache
            .lookup_rate(&CurrencyCode::new("XYZ"), CurrencyKind::Fiat)
            .await;
        assert!(matches!(result, Err(FxError::RateNotAvailable(_))));

        let rate = cache
            .lookup_rate(&CurrencyCode::new("JPY"), CurrencyKind::Fiat)
            .await
            .unwrap();
        assert_eq!(rate, dec!(150));
        assert_eq!(fiat.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_rate_is_provider_fault() {
        let (fiat, crypto) = providers();
        fiat.set_rate("ZWL", dec!(0));
        let cache = RateCache::new(fiat, crypto);
        cache.refresh(&[]).await.unwrap();

        let result = cache.rate_for(&CurrencyCode::new("ZWL"), CurrencyKind::Fiat);
        assert!(matches!(result, Err(FxError::InvalidRate { .. })));
    }

    #[tokio::test]
    async fn test_refresh_if_stale_honours_max_age() {
        let (fiat, crypto) = providers();
        let config = RateCacheConfig {
            max_age: Duration::minutes(5),
        };
        let cache = RateCache::with_config(fiat.clone(), crypto, config);

        cache.refresh_if_stale(&[]).await.unwrap();
        cache.refresh_if_stale(&[]).await.unwrap();
        assert_eq!(fiat.calls(), 1);

        let eager = {
            let (fiat, crypto) = providers();
            let cache = RateCache::new(fiat.clone(), crypto);
            cache.refresh_if_stale(&[]).await.unwrap();
            cache.refresh_if_stale(&[]).await.unwrap();
            fiat.calls()
        };
        assert_eq!(eager, 2);
    }

    /// Fiat provider that answers after a delay.
    struct SlowFiatProvider {
        inner: Arc<MockFiatProvider>,
        delay: std::time::Duration,
    }

    #[async_trait::async_trait]
    impl FiatRateProvider for SlowFiatProvider {
        fn name(&self) -> &str {
            "slow-fiat"
        }

        async fn fetch_fiat_rates(&self) -> FxResult<RateTable> {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch_fiat_rates().await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refreshes_coalesce() {
        let (fiat, crypto) = providers();
        let slow = Arc::new(SlowFiatProvider {
            inner: fiat.clone(),
            delay: std::time::Duration::from_millis(100),
        });
        let cache = Arc::new(RateCache::new(slow, crypto.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.refresh(&codes(&["BTC"])).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(fiat.calls(), 1);
        assert_eq!(crypto.listing_calls(), 1);
        assert_eq!(cache.stats().refreshes, 1);
        assert!(cache.rate_for(&CurrencyCode::new("BTC"), CurrencyKind::Crypto).is_ok());

        // A later refresh is not coalesced with the finished one.
        cache.refresh(&codes(&["BTC"])).await.unwrap();
        assert_eq!(fiat.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let (fiat, crypto) = providers();
        let cache = RateCache::new(fiat, crypto);
        cache.refresh(&codes(&["BTC"])).await.unwrap();

        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats.fiat_entries, 0);
        assert_eq!(stats.crypto_entries, 0);
        assert_eq!(stats.indexed_symbols, 0);
    }
}
