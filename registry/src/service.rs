//! Currency service: registry, rate cache and conversion engine together.

use std::sync::Arc;

use bravo_common::{CurrencyCode, CurrencyError, CurrencyKind, CurrencyResult, CurrencySnapshot};
use bravo_fx::{
    CacheStats, CoinGeckoProvider, Conversion, CryptoRateProvider, ExchangeRateApiProvider,
    FiatRateProvider, RateCache, RateCacheConfig, SharedRateCache,
};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::config::ServiceConfig;
use crate::registry::CurrencyRegistry;

/// The operations exposed to transport layers.
///
/// Every method returns a typed value or a [`CurrencyError`]; mapping errors
/// to transport status codes is left to the caller.
pub struct CurrencyService {
    registry: CurrencyRegistry,
    cache: SharedRateCache,
}

impl CurrencyService {
    /// Create a service over the given providers, seeded with the default
    /// currencies. No upstream call is made until [`initialize`](Self::initialize).
    pub fn new(
        fiat_provider: Arc<dyn FiatRateProvider>,
        crypto_provider: Arc<dyn CryptoRateProvider>,
        cache_config: RateCacheConfig,
    ) -> Self {
        let cache = Arc::new(RateCache::with_config(
            fiat_provider,
            crypto_provider,
            cache_config,
        ));
        Self {
            registry: CurrencyRegistry::seeded(cache.clone()),
            cache,
        }
    }

    /// Create a service talking to the configured HTTP providers.
    pub fn from_config(config: &ServiceConfig) -> CurrencyResult<Self> {
        let http = config.http_providers();
        let fiat = ExchangeRateApiProvider::new(http.fiat_url, http.timeout)?;
        let crypto =
            CoinGeckoProvider::new(http.crypto_listing_url, http.crypto_price_url, http.timeout)?;

        Ok(Self::new(Arc::new(fiat), Arc::new(crypto), config.cache()))
    }

    /// Fetch both providers for the registered currencies.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> CurrencyResult<()> {
        self.refresh().await?;
        info!(currencies = self.registry.len(), "Currency service initialized");
        Ok(())
    }

    /// Refetch every rate table now.
    pub async fn refresh(&self) -> CurrencyResult<()> {
        let crypto_codes = self.registry.crypto_codes();
        self.cache.refresh(&crypto_codes).await.map_err(|e| {
            warn!(error = %e, "Rate refresh failed, keeping previous rates");
            CurrencyError::from(e)
        })
    }

    async fn refresh_for_read(&self) -> CurrencyResult<()> {
        let crypto_codes = self.registry.crypto_codes();
        self.cache.refresh_if_stale(&crypto_codes).await.map_err(|e| {
            warn!(error = %e, "Rate refresh failed, keeping previous rates");
            CurrencyError::from(e)
        })
    }

    /// Convert `amount` of `from` into `to`.
    #[instrument(skip(self), fields(from = %from, to = %to, amount = %amount))]
    pub async fn quote(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        amount: Decimal,
    ) -> CurrencyResult<Conversion> {
        let source = self
            .registry
            .find(from)
            .ok_or_else(|| CurrencyError::CurrencyNotFound(from.clone()))?;
        let target = self
            .registry
            .find(to)
            .ok_or_else(|| CurrencyError::CurrencyNotFound(to.clone()))?;

        if source.kind().is_live() || target.kind().is_live() {
            self.refresh_for_read().await?;
        }

        let from_rate = self.registry.resolve_rate(&source).await?;
        let to_rate = self.registry.resolve_rate(&target).await?;
        let conversion = Conversion::compute(from.clone(), to.clone(), amount, from_rate, to_rate)?;

        info!(
            from_rate = %from_rate,
            to_rate = %to_rate,
            converted = %conversion.formatted(),
            "Conversion completed"
        );
        Ok(conversion)
    }

    /// Convert and render the result with two decimal places.
    pub async fn convert(
        &self,
        from: impl Into<CurrencyCode>,
        to: impl Into<CurrencyCode>,
        amount: Decimal,
    ) -> CurrencyResult<String> {
        let conversion = self.quote(&from.into(), &to.into(), amount).await?;
        Ok(conversion.formatted())
    }

    /// Register a currency.
    #[instrument(skip(self))]
    pub async fn add_currency(
        &self,
        code: &str,
        kind: CurrencyKind,
        fixed_rate_to_usd: Option<Decimal>,
    ) -> CurrencyResult<CurrencySnapshot> {
        self.registry
            .add(CurrencyCode::new(code), kind, fixed_rate_to_usd)
            .await
    }

    /// Unregister a currency.
    pub fn remove_currency(&self, code: impl Into<CurrencyCode>) -> CurrencyResult<()> {
        self.registry.remove(&code.into()).map(|_| ())
    }

    /// Get a currency with its live rate, or `None` when it is not registered.
    pub async fn get_currency(
        &self,
        code: impl Into<CurrencyCode>,
    ) -> CurrencyResult<Option<CurrencySnapshot>> {
        let code = code.into();
        let currency = match self.registry.find(&code) {
            Some(currency) => currency,
            None => return Ok(None),
        };

        if currency.kind().is_live() {
            self.refresh_for_read().await?;
        }

        match self.registry.get(&code).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(CurrencyError::CurrencyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List every currency with its live rate.
    pub async fn list_currencies(&self) -> CurrencyResult<Vec<CurrencySnapshot>> {
        if self.registry.has_live_currencies() {
            self.refresh_for_read().await?;
        }
        self.registry.list().await
    }

    /// Drop every registered currency and cached rate.
    pub fn reset(&self) {
        self.registry.clear();
        self.cache.clear();
        info!("Currency service reset");
    }

    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &SharedRateCache {
        &self.cache
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bravo_fx::{MockCryptoProvider, MockFiatProvider};
    use rust_decimal_macros::dec;

    fn setup() -> (CurrencyService, Arc<MockFiatProvider>, Arc<MockCryptoProvider>) {
        let fiat = Arc::new(MockFiatProvider::new("fiat"));
        fiat.set_rate("USD", dec!(1));
        fiat.set_rate("BRL", dec!(5));
        fiat.set_rate("EUR", dec!(0.85));

        let crypto = Arc::new(MockCryptoProvider::new("crypto"));
        crypto.list_symbol("btc", "bitcoin");
        crypto.list_symbol("eth", "ethereum");
        crypto.set_price("bitcoin", dec!(45000));
        crypto.set_price("ethereum", dec!(3000));

        let service = CurrencyService::new(fiat.clone(), crypto.clone(), RateCacheConfig::default());
        (service, fiat, crypto)
    }

    #[tokio::test]
    async fn test_initialize_lists_seed_currencies() {
        let (service, _, _) = setup();
        service.initialize().await.unwrap();

        let units: Vec<(String, String)> = service
            .list_currencies()
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.code.to_string(), s.unit))
            .collect();

        assert_eq!(
            units,
            vec![
                ("USD".to_string(), "1.00 USD".to_string()),
                ("BRL".to_string(), "5.00 USD".to_string()),
                ("EUR".to_string(), "0.85 USD".to_string()),
                ("BTC".to_string(), "45000.00 USD".to_string()),
                ("ETH".to_string(), "3000.00 USD".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_convert_refreshes_first() {
        let (service, fiat, _) = setup();
        service.initialize().await.unwrap();
        assert_eq!(service.convert("BRL", "USD", dec!(10)).await.unwrap(), "2.00");

        fiat.set_rate("BRL", dec!(4));
        assert_eq!(service.convert("brl", "usd", dec!(10)).await.unwrap(), "2.50");
        assert_eq!(fiat.calls(), 3);
    }

    #[tokio::test]
    async fn test_fictitious_conversion_skips_upstream() {
        let (service, fiat, _) = setup();
        service.reset();
        service
            .add_currency("GOLD", CurrencyKind::Fictitious, Some(dec!(2)))
            .await
            .unwrap();
        service
            .add_currency("SILVER", CurrencyKind::Fictitious, Some(dec!(8)))
            .await
            .unwrap();

        assert_eq!(service.convert("GOLD", "SILVER", dec!(1)).await.unwrap(), "4.00");
        assert_eq!(fiat.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_target_reported() {
        let (service, _, _) = setup();
        let result = service.convert("USD", "ABC", dec!(10)).await;
        assert_eq!(
            result,
            Err(CurrencyError::CurrencyNotFound(CurrencyCode::new("ABC")))
        );
    }

    #[tokio::test]
    async fn test_get_unregistered_is_none() {
        let (service, fiat, _) = setup();
        assert_eq!(service.get_currency("XAU").await.unwrap(), None);
        assert_eq!(fiat.calls(), 0);
    }
}
