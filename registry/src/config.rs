//! Service configuration.

use std::time::Duration;

use bravo_fx::{HttpProviderConfig, RateCacheConfig};

/// Placeholder in the fiat URL replaced by the API key.
const API_KEY_PLACEHOLDER: &str = "{key}";

/// Upstream provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Fiat endpoint, may contain `{key}`.
    pub fiat_url: String,
    /// API key substituted into the fiat endpoint.
    pub fiat_api_key: String,
    /// Crypto listing endpoint.
    pub crypto_listing_url: String,
    /// Crypto price endpoint.
    pub crypto_price_url: String,
    /// Timeout for every upstream request.
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            fiat_url: "https://v6.exchangerate-api.com/v6/{key}/latest/USD".to_string(),
            fiat_api_key: String::new(),
            crypto_listing_url:
                "https://api.coingecko.com/api/v3/coins/markets?vs_currency=usd&per_page=250"
                    .to_string(),
            crypto_price_url: "https://api.coingecko.com/api/v3/simple/price".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Provider configuration.
    pub providers: ProviderConfig,
    /// Snapshots younger than this skip the refresh before reads.
    pub rate_max_age: Duration,
    /// Log level.
    pub log_level: String,
    /// Emit JSON log lines.
    pub log_json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            providers: ProviderConfig::default(),
            rate_max_age: Duration::ZERO,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("FIAT_RATES_URL") {
            config.providers.fiat_url = url;
        }

        if let Some(key) = lookup("EXCHANGE_RATE_API_KEY") {
            config.providers.fiat_api_key = key;
        }

        if let Some(url) = lookup("CRYPTO_LISTING_URL") {
            config.providers.crypto_listing_url = url;
        }

        if let Some(url) = lookup("CRYPTO_PRICE_URL") {
            config.providers.crypto_price_url = url;
        }

        if let Some(ms) = lookup("PROVIDER_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.providers.timeout = Duration::from_millis(ms);
            }
        }

        if let Some(ms) = lookup("RATE_MAX_AGE_MS") {
            if let Ok(ms) = ms.parse() {
                config.rate_max_age = Duration::from_millis(ms);
            }
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(format) = lookup("LOG_FORMAT") {
            config.log_json = format.eq_ignore_ascii_case("json");
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        let providers = &self.providers;

        if providers.fiat_url.is_empty() {
            return Err("Fiat rates URL cannot be empty".to_string());
        }

        if providers.fiat_url.contains(API_KEY_PLACEHOLDER) && providers.fiat_api_key.is_empty() {
            return Err("Fiat rates URL needs EXCHANGE_RATE_API_KEY".to_string());
        }

        if providers.crypto_listing_url.is_empty() || providers.crypto_price_url.is_empty() {
            return Err("Crypto provider URLs cannot be empty".to_string());
        }

        if providers.timeout.is_zero() {
            return Err("Provider timeout cannot be 0".to_string());
        }

        Ok(())
    }

    /// Endpoints for the HTTP providers, with the API key filled in.
    pub fn http_providers(&self) -> HttpProviderConfig {
        let providers = &self.providers;
        HttpProviderConfig {
            fiat_url: providers
                .fiat_url
                .replace(API_KEY_PLACEHOLDER, &providers.fiat_api_key),
            crypto_listing_url: providers.crypto_listing_url.clone(),
            crypto_price_url: providers.crypto_price_url.clone(),
            timeout: providers.timeout,
        }
    }

    /// Rate cache settings.
    pub fn cache(&self) -> RateCacheConfig {
        RateCacheConfig {
            max_age: chrono::Duration::from_std(self.rate_max_age)
                .unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }
}
