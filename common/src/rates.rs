//! Cached rate tables and the crypto symbol index.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{CurrencyCode, CurrencyKind};

/// One cached quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEntry {
    pub code: CurrencyCode,
    #[serde(rename = "type")]
    pub kind: CurrencyKind,
    /// Provider value taken verbatim: units per USD for fiat tables, USD per
    /// unit for crypto prices. Conversion divides by the source value and
    /// multiplies by the target value for both kinds alike.
    #[serde(rename = "unitToUSD")]
    pub unit_to_usd: Decimal,
}

/// Rates from one provider family, keyed by currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    kind: CurrencyKind,
    entries: BTreeMap<CurrencyCode, RateEntry>,
}

impl RateTable {
    /// Create an empty table for the given provider family.
    pub fn new(kind: CurrencyKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> CurrencyKind {
        self.kind
    }

    /// Insert or replace the rate for a code.
    pub fn insert(&mut self, code: CurrencyCode, unit_to_usd: Decimal) {
        let entry = RateEntry {
            code: code.clone(),
            kind: self.kind,
            unit_to_usd,
        };
        self.entries.insert(code, entry);
    }

    /// Merge every entry of `other` into this table, replacing duplicates.
    pub fn merge(&mut self, other: RateTable) {
        for (code, entry) in other.entries {
            self.insert(code, entry.unit_to_usd);
        }
    }

    pub fn get(&self, code: &CurrencyCode) -> Option<&RateEntry> {
        self.entries.get(code)
    }

    pub fn rate(&self, code: &CurrencyCode) -> Option<Decimal> {
        self.entries.get(code).map(|e| e.unit_to_usd)
    }

    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.entries.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Extend<(CurrencyCode, Decimal)> for RateTable {
    fn extend<T: IntoIterator<Item = (CurrencyCode, Decimal)>>(&mut self, iter: T) {
        for (code, rate) in iter {
            self.insert(code, rate);
        }
    }
}

/// Maps crypto ticker symbols to the provider's internal identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolIndex {
    ids: BTreeMap<CurrencyCode, String>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from `(symbol, id)` pairs.
    ///
    /// Later pairs win when a symbol repeats; pairs with an empty symbol or id
    /// are skipped.
    pub fn from_listing<I, S, T>(listing: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: Into<String>,
    {
        let mut index = Self::new();
        for (symbol, id) in listing {
            index.insert(symbol, id);
        }
        index
    }

    pub fn insert(&mut self, symbol: impl AsRef<str>, id: impl Into<String>) {
        let symbol = CurrencyCode::new(symbol);
        let id = id.into();
        if symbol.is_empty() || id.trim().is_empty() {
            return;
        }
        self.ids.insert(symbol, id);
    }

    /// Look up the provider id for a symbol, in any case.
    pub fn id_for(&self, symbol: &CurrencyCode) -> Option<&str> {
        self.ids.get(symbol).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
