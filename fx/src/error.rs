//! FX error types.

use bravo_common::{CurrencyCode, CurrencyError};
use thiserror::Error;

/// Errors raised by rate providers and the rate cache.
#[derive(Debug, Error)]
pub enum FxError {
    /// No provider reported a rate for the code.
    #[error("Rate not available for {0}")]
    RateNotAvailable(CurrencyCode),

    /// Provider could not be reached or timed out.
    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    /// Provider answered with a non-success status.
    #[error("{provider} returned HTTP {status}")]
    UnexpectedStatus { provider: String, status: u16 },

    /// Provider answered 429.
    #[error("{provider} rate limited the request")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// Provider payload did not have the expected shape.
    #[error("{provider} returned a malformed payload: {message}")]
    MalformedPayload { provider: String, message: String },

    /// A rate of zero or below reached the conversion arithmetic.
    #[error("Non-positive rate {rate} for {code}")]
    InvalidRate {
        code: CurrencyCode,
        rate: rust_decimal::Decimal,
    },

    /// Decimal arithmetic overflowed.
    #[error("Conversion overflow: {0}")]
    Overflow(String),
}

impl From<FxError> for CurrencyError {
    fn from(err: FxError) -> Self {
        match err {
            FxError::RateNotAvailable(code) => CurrencyError::RateNotFound(code),
            FxError::RateLimited {
                provider,
                retry_after_secs,
            } => CurrencyError::RateLimited {
                provider,
                retry_after_secs,
            },
            FxError::Overflow(_) => CurrencyError::invalid_field("amount", "amount out of range"),
            other => CurrencyError::Provider(other.to_string()),
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
