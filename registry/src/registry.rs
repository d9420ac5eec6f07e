//! Currency registry.

use bravo_common::{
    Currency, CurrencyCode, CurrencyError, CurrencyKind, CurrencyResult, CurrencySnapshot,
};
use bravo_fx::SharedRateCache;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Currencies registered at startup.
pub const SEED_CURRENCIES: [(&str, CurrencyKind); 5] = [
    ("USD", CurrencyKind::Fiat),
    ("BRL", CurrencyKind::Fiat),
    ("EUR", CurrencyKind::Fiat),
    ("BTC", CurrencyKind::Crypto),
    ("ETH", CurrencyKind::Crypto),
];

/// The set of registered currencies.
///
/// The list sits behind one exclusive lock that is only taken for in-memory
/// reads and mutations; rate resolution always happens outside it.
pub struct CurrencyRegistry {
    currencies: RwLock<Vec<Currency>>,
    cache: SharedRateCache,
}

impl CurrencyRegistry {
    /// Create an empty registry reading rates from `cache`.
    pub fn new(cache: SharedRateCache) -> Self {
        Self {
            currencies: RwLock::new(Vec::new()),
            cache,
        }
    }

    /// Create a registry holding the seed currencies.
    pub fn seeded(cache: SharedRateCache) -> Self {
        let registry = Self::new(cache);
        registry.seed();
        registry
    }

    /// Replace the registered set with the seed currencies.
    pub fn seed(&self) {
        let seeded = SEED_CURRENCIES
            .iter()
            .map(|(code, kind)| match kind {
                CurrencyKind::Crypto => Currency::crypto(*code),
                _ => Currency::fiat(*code),
            })
            .collect();
        *self.currencies.write() = seeded;
    }

    /// Register a currency and return it with its current rate.
    ///
    /// Live kinds must be resolvable by their provider at registration time.
    pub async fn add(
        &self,
        code: impl Into<CurrencyCode>,
        kind: CurrencyKind,
        fixed_rate_to_usd: Option<Decimal>,
    ) -> CurrencyResult<CurrencySnapshot> {
        let code = code.into();
        if self.contains(&code) {
            return Err(CurrencyError::DuplicateCurrency(code));
        }

        let currency = Currency::new(code, kind, fixed_rate_to_usd)?;
        let rate = self.resolve_rate(&currency).await?;

        {
            let mut currencies = self.currencies.write();
            if currencies.iter().any(|c| c.code() == currency.code()) {
                return Err(CurrencyError::DuplicateCurrency(currency.code().clone()));
            }
            currencies.push(currency.clone());
        }

        info!(code = %currency.code(), kind = %kind, rate = %rate, "Currency registered");
        Ok(currency.snapshot(rate))
    }

    /// Unregister a currency.
    pub fn remove(&self, code: &CurrencyCode) -> CurrencyResult<Currency> {
        let removed = {
            let mut currencies = self.currencies.write();
            let index = currencies
                .iter()
                .position(|c| c.code() == code)
                .ok_or_else(|| CurrencyError::CurrencyNotFound(code.clone()))?;
            currencies.remove(index)
        };

        info!(code = %code, "Currency removed");
        Ok(removed)
    }

    /// Get a registered currency with its live rate.
    pub async fn get(&self, code: &CurrencyCode) -> CurrencyResult<CurrencySnapshot> {
        let currency = self
            .find(code)
            .ok_or_else(|| CurrencyError::CurrencyNotFound(code.clone()))?;
        let rate = self.resolve_rate(&currency).await?;
        Ok(currency.snapshot(rate))
    }

    /// List every registered currency with its live rate.
    ///
    /// Fails as a whole when any single rate cannot be resolved.
    pub async fn list(&self) -> CurrencyResult<Vec<CurrencySnapshot>> {
        let currencies = self.currencies();
        let mut snapshots = Vec::with_capacity(currencies.len());
        for currency in &currencies {
            let rate = self.resolve_rate(currency).await?;
            snapshots.push(currency.snapshot(rate));
        }
        Ok(snapshots)
    }

    /// Resolve the USD rate of a currency.
    ///
    /// Fictitious currencies use their fixed rate. Live kinds read the cache
    /// and fetch just their own rate when it is missing.
    pub async fn resolve_rate(&self, currency: &Currency) -> CurrencyResult<Decimal> {
        if let Some(rate) = currency.fixed_rate_to_usd() {
            return Ok(rate);
        }

        debug!(code = %currency.code(), kind = %currency.kind(), "Resolving live rate");
        Ok(self
            .cache
            .lookup_rate(currency.code(), currency.kind())
            .await?)
    }

    /// Find a registered currency.
    pub fn find(&self, code: &CurrencyCode) -> Option<Currency> {
        self.currencies
            .read()
            .iter()
            .find(|c| c.code() == code)
            .cloned()
    }

    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.currencies.read().iter().any(|c| c.code() == code)
    }

    /// Copy of the registered currencies, in registration order.
    pub fn currencies(&self) -> Vec<Currency> {
        self.currencies.read().clone()
    }

    /// Codes of the registered crypto currencies.
    pub fn crypto_codes(&self) -> Vec<CurrencyCode> {
        self.currencies
            .read()
            .iter()
            .filter(|c| c.kind() == CurrencyKind::Crypto)
            .map(|c| c.code().clone())
            .collect()
    }

    /// Whether any registered currency needs upstream rates.
    pub fn has_live_currencies(&self) -> bool {
        self.currencies.read().iter().any(|c| c.kind().is_live())
    }

    /// Drop every registered currency.
    pub fn clear(&self) {
        self.currencies.write().clear();
    }

    pub fn len(&self) -> usize {
        self.currencies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.read().is_empty()
    }
}
