//! Upstream rate provider traits and implementations.

use async_trait::async_trait;
use bravo_common::{decimal_from_json, CurrencyCode, CurrencyKind, RateTable, SymbolIndex};
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{FxError, FxResult};

/// Source of USD-based fiat exchange rates.
#[async_trait]
pub trait FiatRateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch the full rate table the provider reports.
    async fn fetch_fiat_rates(&self) -> FxResult<RateTable>;
}

/// Source of crypto prices, addressed by provider-internal ids.
#[async_trait]
pub trait CryptoRateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch the symbol to id listing.
    async fn fetch_symbol_index(&self) -> FxResult<SymbolIndex>;

    /// Fetch USD prices for exactly the given ids.
    ///
    /// Ids the provider does not price are absent from the result.
    async fn fetch_usd_prices(&self, ids: &BTreeSet<String>) -> FxResult<BTreeMap<String, Decimal>>;
}

/// Endpoints and limits for the HTTP providers.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Fiat endpoint returning `conversion_rates`.
    pub fiat_url: String,
    /// Crypto listing endpoint returning `[{id, symbol}]`.
    pub crypto_listing_url: String,
    /// Crypto price endpoint accepting `ids` and `vs_currencies`.
    pub crypto_price_url: String,
    /// Timeout applied to every upstream request.
    pub timeout: Duration,
}

fn build_client(provider: &str, timeout: Duration) -> FxResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("bravo/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| FxError::Transport {
            provider: provider.to_string(),
            message: e.to_string(),
        })
}

fn transport_error(provider: &str, err: reqwest::Error) -> FxError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    FxError::Transport {
        provider: provider.to_string(),
        message,
    }
}

/// Map 429 and other non-success statuses to typed errors.
fn check_status(provider: &str, response: Response) -> FxResult<Response> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        return Err(FxError::RateLimited {
            provider: provider.to_string(),
            retry_after_secs,
        });
    }
    if !status.is_success() {
        return Err(FxError::UnexpectedStatus {
            provider: provider.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

async fn read_body(provider: &str, response: Response) -> FxResult<Vec<u8>> {
    let response = check_status(provider, response)?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(provider, e))?;
    Ok(bytes.to_vec())
}

fn malformed(provider: &str, err: serde_json::Error) -> FxError {
    FxError::MalformedPayload {
        provider: provider.to_string(),
        message: err.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct FiatPayload {
    conversion_rates: BTreeMap<String, serde_json::Number>,
}

/// Parse a fiat provider payload into a table covering every reported code.
///
/// `USD` is always present with a rate of one.
pub fn parse_fiat_payload(provider: &str, body: &[u8]) -> FxResult<RateTable> {
    let payload: FiatPayload = serde_json::from_slice(body).map_err(|e| malformed(provider, e))?;

    let mut table = RateTable::new(CurrencyKind::Fiat);
    for (code, number) in &payload.conversion_rates {
        match decimal_from_json(number) {
            Some(rate) => table.insert(CurrencyCode::new(code), rate),
            None => warn!(provider, code = %code, value = %number, "Skipping unrepresentable fiat rate"),
        }
    }

    let usd = CurrencyCode::usd();
    if !table.contains(&usd) {
        table.insert(usd, Decimal::ONE);
    }

    Ok(table)
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
}

/// Parse a crypto listing payload into a symbol index.
pub fn parse_listing_payload(provider: &str, body: &[u8]) -> FxResult<SymbolIndex> {
    let listing: Vec<ListingEntry> =
        serde_json::from_slice(body).map_err(|e| malformed(provider, e))?;

    let pairs = listing
        .into_iter()
        .filter_map(|entry| Some((entry.symbol?, entry.id?)));
    Ok(SymbolIndex::from_listing(pairs))
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    #[serde(default)]
    usd: Option<serde_json::Number>,
}

/// Parse a crypto price payload, dropping entries without a `usd` price.
pub fn parse_price_payload(provider: &str, body: &[u8]) -> FxResult<BTreeMap<String, Decimal>> {
    let payload: HashMap<String, PriceEntry> =
        serde_json::from_slice(body).map_err(|e| malformed(provider, e))?;

    let mut prices = BTreeMap::new();
    for (id, entry) in payload {
        match entry.usd.as_ref().and_then(decimal_from_json) {
            Some(price) => {
                prices.insert(id, price);
            }
            None => debug!(provider, id = %id, "No USD price reported"),
        }
    }
    Ok(prices)
}

/// Fiat provider speaking the exchangerate-api `latest/USD` format.
pub struct ExchangeRateApiProvider {
    http: Client,
    url: String,
}

impl ExchangeRateApiProvider {
    pub const NAME: &'static str = "exchangerate-api";

    /// Create a provider for the given endpoint.
    pub fn new(url: impl Into<String>, timeout: Duration) -> FxResult<Self> {
        Ok(Self {
            http: build_client(Self::NAME, timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FiatRateProvider for ExchangeRateApiProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_fiat_rates(&self) -> FxResult<RateTable> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| transport_error(Self::NAME, e))?;
        let body = read_body(Self::NAME, response).await?;
        let table = parse_fiat_payload(Self::NAME, &body)?;

        debug!(provider = Self::NAME, rates = table.len(), "Fetched fiat rates");
        Ok(table)
    }
}

/// Crypto provider speaking the CoinGecko listing and simple price formats.
pub struct CoinGeckoProvider {
    http: Client,
    listing_url: String,
    price_url: String,
}

impl CoinGeckoProvider {
    pub const NAME: &'static str = "coingecko";

    /// Create a provider for the given listing and price endpoints.
    pub fn new(
        listing_url: impl Into<String>,
        price_url: impl Into<String>,
        timeout: Duration,
    ) -> FxResult<Self> {
        Ok(Self {
            http: build_client(Self::NAME, timeout)?,
            listing_url: listing_url.into(),
            price_url: price_url.into(),
        })
    }
}

#[async_trait]
impl CryptoRateProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_symbol_index(&self) -> FxResult<SymbolIndex> {
        let response = self
            .http
            .get(&self.listing_url)
            .send()
            .await
            .map_err(|e| transport_error(Self::NAME, e))?;
        let body = read_body(Self::NAME, response).await?;
        let index = parse_listing_payload(Self::NAME, &body)?;

        debug!(provider = Self::NAME, symbols = index.len(), "Fetched symbol index");
        Ok(index)
    }

    async fn fetch_usd_prices(&self, ids: &BTreeSet<String>) -> FxResult<BTreeMap<String, Decimal>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let joined = ids.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        let response = self
            .http
            .get(&self.price_url)
            .query(&[("ids", joined.as_str()), ("vs_currencies", "usd")])
            .send()
            .await
            .map_err(|e| transport_error(Self::NAME, e))?;
        let body = read_body(Self::NAME, response).await?;
        let prices = parse_price_payload(Self::NAME, &body)?;

        debug!(
            provider = Self::NAME,
            requested = ids.len(),
            priced = prices.len(),
            "Fetched crypto prices"
        );
        Ok(prices)
    }
}

/// Failure a mock provider can be told to return.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Behave like an unreachable host.
    Transport,
    /// Answer with the given HTTP status.
    Status(u16),
    /// Answer 429.
    RateLimited,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockFailure {
    fn into_error(self, provider: &str) -> FxError {
        match self {
            MockFailure::Transport => FxError::Transport {
                provider: provider.to_string(),
                message: "connection refused".to_string(),
            },
            MockFailure::Status(status) => FxError::UnexpectedStatus {
                provider: provider.to_string(),
                status,
            },
            MockFailure::RateLimited => FxError::RateLimited {
                provider: provider.to_string(),
                retry_after_secs: None,
            },
        }
    }
}

/// Mock fiat provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockFiatProvider {
    name: String,
    rates: dashmap::DashMap<CurrencyCode, Decimal>,
    failure: parking_lot::Mutex<Option<MockFailure>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockFiatProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: dashmap::DashMap::new(),
            failure: parking_lot::Mutex::new(None),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Set the rate reported for a code.
    pub fn set_rate(&self, code: &str, rate: Decimal) {
        self.rates.insert(CurrencyCode::new(code), rate);
    }

    /// Stop reporting a code.
    pub fn remove_rate(&self, code: &str) {
        self.rates.remove(&CurrencyCode::new(code));
    }

    /// Make every following call fail, or succeed again with `None`.
    pub fn fail_with(&self, failure: Option<MockFailure>) {
        *self.failure.lock() = failure;
    }

    /// Number of fetches served or failed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl FiatRateProvider for MockFiatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_fiat_rates(&self) -> FxResult<RateTable> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let failure = *self.failure.lock();
        if let Some(failure) = failure {
            return Err(failure.into_error(&self.name));
        }

        let mut table = RateTable::new(CurrencyKind::Fiat);
        table.extend(self.rates.iter().map(|r| (r.key().clone(), *r.value())));
        Ok(table)
    }
}

/// Mock crypto provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockCryptoProvider {
    name: String,
    listing: dashmap::DashMap<CurrencyCode, String>,
    prices: dashmap::DashMap<String, Decimal>,
    listing_failure: parking_lot::Mutex<Option<MockFailure>>,
    price_failure: parking_lot::Mutex<Option<MockFailure>>,
    listing_calls: std::sync::atomic::AtomicUsize,
    price_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockCryptoProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listing: dashmap::DashMap::new(),
            prices: dashmap::DashMap::new(),
            listing_failure: parking_lot::Mutex::new(None),
            price_failure: parking_lot::Mutex::new(None),
            listing_calls: std::sync::atomic::AtomicUsize::new(0),
            price_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// List a symbol under a provider id.
    pub fn list_symbol(&self, symbol: &str, id: &str) {
        self.listing.insert(CurrencyCode::new(symbol), id.to_string());
    }

    /// Set the USD price reported for an id.
    pub fn set_price(&self, id: &str, usd: Decimal) {
        self.prices.insert(id.to_string(), usd);
    }

    /// Stop pricing an id.
    pub fn remove_price(&self, id: &str) {
        self.prices.remove(id);
    }

    pub fn fail_listing_with(&self, failure: Option<MockFailure>) {
        *self.listing_failure.lock() = failure;
    }

    pub fn fail_prices_with(&self, failure: Option<MockFailure>) {
        *self.price_failure.lock() = failure;
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl CryptoRateProvider for MockCryptoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_symbol_index(&self) -> FxResult<SymbolIndex> {
        self.listing_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let failure = *self.listing_failure.lock();
        if let Some(failure) = failure {
            return Err(failure.into_error(&self.name));
        }

        Ok(SymbolIndex::from_listing(
            self.listing
                .iter()
                .map(|r| (r.key().as_str().to_string(), r.value().clone())),
        ))
    }

    async fn fetch_usd_prices(&self, ids: &BTreeSet<String>) -> FxResult<BTreeMap<String, Decimal>> {
        self.price_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let failure = *self.price_failure.lock();
        if let Some(failure) = failure {
            return Err(failure.into_error(&self.name));
        }

        Ok(ids
            .iter()
            .filter_map(|id| self.prices.get(id).map(|p| (id.clone(), *p.value())))
            .collect())
    }
}
