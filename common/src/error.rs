//! Error types for the bravo currency service.

use crate::CurrencyCode;
use thiserror::Error;

/// Main error type for registry, cache and conversion operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    /// Bad input shape or value.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Currency is not registered.
    #[error("Unsupported currency: {0}")]
    CurrencyNotFound(CurrencyCode),

    /// Currency is already registered.
    #[error("Currency already exists: {0}")]
    DuplicateCurrency(CurrencyCode),

    /// No provider could resolve a rate for the code.
    #[error("Rate not found for {0}")]
    RateNotFound(CurrencyCode),

    /// Network, status or payload failure talking to an upstream provider.
    #[error("Rate provider error: {0}")]
    Provider(String),

    /// Upstream provider answered 429.
    #[error("Rate provider {provider} rate limited the request")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },
}

impl CurrencyError {
    /// Create a validation error pointing at a field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        CurrencyError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Whether the caller sent a request that cannot succeed as is.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CurrencyError::Validation { .. }
                | CurrencyError::CurrencyNotFound(_)
                | CurrencyError::DuplicateCurrency(_)
                | CurrencyError::RateNotFound(_)
        )
    }

    /// Whether the failure originates from an upstream outage.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            CurrencyError::Provider(_) | CurrencyError::RateLimited { .. }
        )
    }

    /// Get suggested retry delay in seconds, as reported upstream.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            CurrencyError::RateLimited { retry_after_secs, .. } => *retry_after_secs,
            _ => None,
        }
    }

    /// Get a stable error code for transport layers.
    pub fn error_code(&self) -> &'static str {
        match self {
            CurrencyError::Validation { .. } => "VALIDATION_ERROR",
            CurrencyError::CurrencyNotFound(_) => "CURRENCY_NOT_FOUND",
            CurrencyError::DuplicateCurrency(_) => "DUPLICATE_CURRENCY",
            CurrencyError::RateNotFound(_) => "RATE_NOT_FOUND",
            CurrencyError::Provider(_) => "PROVIDER_ERROR",
            CurrencyError::RateLimited { .. } => "RATE_LIMITED",
        }
    }
}

/// Result type alias for currency operations.
pub type CurrencyResult<T> = std::result::Result<T, CurrencyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let not_found = CurrencyError::CurrencyNotFound(CurrencyCode::new("abc"));
        assert!(not_found.is_client_error());
        assert!(!not_found.is_upstream());
        assert_eq!(not_found.to_string(), "Unsupported currency: ABC");

        let limited = CurrencyError::RateLimited {
            provider: "coingecko".to_string(),
            retry_after_secs: Some(30),
        };
        assert!(limited.is_upstream());
        assert!(!limited.is_client_error());
        assert_eq!(limited.retry_after_secs(), Some(30));
        assert_eq!(limited.error_code(), "RATE_LIMITED");
    }

    #[test]
    fn test_validation_field() {
        let err = CurrencyError::invalid_field("fixedRateToUSD", "must be positive");
        assert_eq!(
            err,
            CurrencyError::Validation {
                message: "must be positive".to_string(),
                field: Some("fixedRateToUSD".to_string()),
            }
        );
    }
}
