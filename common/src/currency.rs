//! Currency identity and registration types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CurrencyError, CurrencyResult};
use crate::monetary::format_cents;

/// Case-normalized currency code.
///
/// Codes are opaque: they are not checked against ISO 4217, so operators may
/// register arbitrary symbols such as `GOLD`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Create a new code, trimming and uppercasing the input.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    /// Get the normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CurrencyCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// Where a currency's USD rate comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyKind {
    /// Government-issued currency priced by the fiat provider.
    Fiat,
    /// Cryptocurrency priced by the crypto provider via symbol resolution.
    Crypto,
    /// Synthetic currency with an operator-supplied fixed rate.
    Fictitious,
}

impl CurrencyKind {
    /// Whether the rate is resolved through an upstream provider.
    pub fn is_live(&self) -> bool {
        !matches!(self, CurrencyKind::Fictitious)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CurrencyKind::Fiat => "FIAT",
            CurrencyKind::Crypto => "CRYPTO",
            CurrencyKind::Fictitious => "FICTITIOUS",
        }
    }
}

impl fmt::Display for CurrencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyKind {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FIAT" => Ok(CurrencyKind::Fiat),
            "CRYPTO" => Ok(CurrencyKind::Crypto),
            "FICTITIOUS" => Ok(CurrencyKind::Fictitious),
            other => Err(CurrencyError::invalid_field(
                "type",
                format!("Invalid currency type: {}", other),
            )),
        }
    }
}

/// A registered currency.
///
/// `fixed_rate_to_usd` is present and positive exactly when the kind is
/// [`CurrencyKind::Fictitious`]; live kinds always read the rate cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CurrencyRecord")]
pub struct Currency {
    code: CurrencyCode,
    #[serde(rename = "type")]
    kind: CurrencyKind,
    #[serde(
        rename = "fixedRateToUSD",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    fixed_rate_to_usd: Option<Decimal>,
}

impl Currency {
    /// Create a currency, enforcing the fixed-rate invariant.
    ///
    /// A fixed rate supplied for a live kind is discarded.
    pub fn new(
        code: impl Into<CurrencyCode>,
        kind: CurrencyKind,
        fixed_rate_to_usd: Option<Decimal>,
    ) -> CurrencyResult<Self> {
        let code = code.into();
        if code.is_empty() {
            return Err(CurrencyError::invalid_field("code", "Currency code cannot be empty"));
        }

        let fixed_rate_to_usd = match kind {
            CurrencyKind::Fictitious => match fixed_rate_to_usd {
                Some(rate) if rate > Decimal::ZERO => Some(rate),
                Some(_) => {
                    return Err(CurrencyError::invalid_field(
                        "fixedRateToUSD",
                        "Fictitious currencies require a positive fixed rate",
                    ))
                }
                None => {
                    return Err(CurrencyError::invalid_field(
                        "fixedRateToUSD",
                        "Fictitious currencies require a fixed rate",
                    ))
                }
            },
            CurrencyKind::Fiat | CurrencyKind::Crypto => None,
        };

        Ok(Self {
            code,
            kind,
            fixed_rate_to_usd,
        })
    }

    pub fn fiat(code: impl Into<CurrencyCode>) -> Self {
        Self {
            code: code.into(),
            kind: CurrencyKind::Fiat,
            fixed_rate_to_usd: None,
        }
    }

    pub fn crypto(code: impl Into<CurrencyCode>) -> Self {
        Self {
            code: code.into(),
            kind: CurrencyKind::Crypto,
            fixed_rate_to_usd: None,
        }
    }

    pub fn code(&self) -> &CurrencyCode {
        &self.code
    }

    pub fn kind(&self) -> CurrencyKind {
        self.kind
    }

    /// Fixed USD rate, only ever set for fictitious currencies.
    pub fn fixed_rate_to_usd(&self) -> Option<Decimal> {
        self.fixed_rate_to_usd
    }

    /// Build a snapshot with the given resolved rate.
    pub fn snapshot(&self, unit_to_usd: Decimal) -> CurrencySnapshot {
        CurrencySnapshot::new(self.code.clone(), self.kind, unit_to_usd)
    }
}

/// Wire shape of [`Currency`], validated on the way in.
#[derive(Deserialize)]
struct CurrencyRecord {
    code: CurrencyCode,
    #[serde(rename = "type")]
    kind: CurrencyKind,
    #[serde(rename = "fixedRateToUSD", default)]
    fixed_rate_to_usd: Option<Decimal>,
}

impl TryFrom<CurrencyRecord> for Currency {
    type Error = CurrencyError;

    fn try_from(record: CurrencyRecord) -> Result<Self, Self::Error> {
        Currency::new(record.code, record.kind, record.fixed_rate_to_usd)
    }
}

/// A currency as reported to callers, with its rate resolved at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencySnapshot {
    pub code: CurrencyCode,
    #[serde(rename = "type")]
    pub kind: CurrencyKind,
    /// Rate rendered as `"<rate> USD"` with two decimal places.
    pub unit: String,
    #[serde(skip)]
    pub unit_to_usd: Decimal,
}

impl CurrencySnapshot {
    pub fn new(code: CurrencyCode, kind: CurrencyKind, unit_to_usd: Decimal) -> Self {
        Self {
            code,
            kind,
            unit: format!("{} USD", format_cents(unit_to_usd)),
            unit_to_usd,
        }
    }
}
