//! Currency conversion arithmetic and records.

use bravo_common::{format_cents, round_cents, CurrencyCode};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FxError, FxResult};

/// Convert `amount` through USD: `amount / from_rate * to_rate`.
///
/// The result is exact up to decimal precision; rounding happens when the
/// conversion is reported. Zero and negative amounts pass through unchanged in
/// sign. A non-positive rate is an upstream fault and never divides.
pub fn convert_amount(
    amount: Decimal,
    from: (&CurrencyCode, Decimal),
    to: (&CurrencyCode, Decimal),
) -> FxResult<Decimal> {
    let (from_code, from_rate) = from;
    let (to_code, to_rate) = to;

    for (code, rate) in [(from_code, from_rate), (to_code, to_rate)] {
        if rate <= Decimal::ZERO {
            return Err(FxError::InvalidRate {
                code: code.clone(),
                rate,
            });
        }
    }

    if amount.is_zero() {
        return Ok(Decimal::ZERO);
    }

    amount
        .checked_div(from_rate)
        .ok_or_else(|| FxError::Overflow(format!("{} / {}", amount, from_rate)))?
        .checked_mul(to_rate)
        .ok_or_else(|| FxError::Overflow(format!("{} {} to {}", amount, from_code, to_code)))
}

/// A completed conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversion {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    /// Input amount.
    pub amount: Decimal,
    /// USD rate used for the source currency.
    pub from_rate: Decimal,
    /// USD rate used for the target currency.
    pub to_rate: Decimal,
    /// Unrounded result.
    pub exact: Decimal,
    /// When the conversion was computed.
    pub executed_at: DateTime<Utc>,
}

impl Conversion {
    /// Compute a conversion from resolved rates.
    pub fn compute(
        from: CurrencyCode,
        to: CurrencyCode,
        amount: Decimal,
        from_rate: Decimal,
        to_rate: Decimal,
    ) -> FxResult<Self> {
        let exact = convert_amount(amount, (&from, from_rate), (&to, to_rate))?;
        Ok(Self {
            from,
            to,
            amount,
            from_rate,
            to_rate,
            exact,
            executed_at: Utc::now(),
        })
    }

    /// Result rounded to cents.
    pub fn rounded(&self) -> Decimal {
        round_cents(self.exact)
    }

    /// Result as a fixed-point string with two decimal places.
    pub fn formatted(&self) -> String {
        format_cents(self.exact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::new(s)
    }

    #[test]
    fn test_brl_to_usd() {
        let conversion = Conversion::compute(code("BRL"), code("USD"), dec!(10), dec!(5), dec!(1)).unwrap();

        assert_eq!(conversion.exact, dec!(2));
        assert_eq!(conversion.formatted(), "2.00");
    }

    #[test]
    fn test_zero_and_negative_amounts() {
        let zero = convert_amount(dec!(0), (&code("EUR"), dec!(0.85)), (&code("BRL"), dec!(5))).unwrap();
        assert_eq!(zero, Decimal::ZERO);

        let debit = Conversion::compute(code("USD"), code("BRL"), dec!(-10), dec!(1), dec!(5)).unwrap();
        assert_eq!(debit.formatted(), "-50.00");
    }

    #[test]
    fn test_rounds_half_away_from_zero() {
        // 1 / 8 * 1 = 0.125
        let conversion = Conversion::compute(code("A"), code("B"), dec!(1), dec!(8), dec!(1)).unwrap();
        assert_eq!(conversion.formatted(), "0.13");

        let conversion = Conversion::compute(code("A"), code("B"), dec!(-1), dec!(8), dec!(1)).unwrap();
        assert_eq!(conversion.formatted(), "-0.13");
    }

    #[test]
    fn test_zero_rate_is_provider_fault() {
        let result = convert_amount(dec!(10), (&code("BRL"), Decimal::ZERO), (&code("USD"), dec!(1)));
        assert!(matches!(result, Err(FxError::InvalidRate { ref code, .. }) if code.as_str() == "BRL"));

        let result = convert_amount(dec!(0), (&code("BRL"), dec!(5)), (&code("USD"), dec!(-1)));
        assert!(matches!(result, Err(FxError::InvalidRate { .. })));
    }

    #[test]
    fn test_overflow_reported() {
        let result = convert_amount(Decimal::MAX, (&code("USD"), dec!(1)), (&code("BRL"), dec!(5)));
        assert!(matches!(result, Err(FxError::Overflow(_))));
    }

    proptest! {
        #[test]
        fn prop_round_trip_within_a_cent(
            cents in 1i64..100_000_000,
            from_milli in 1i64..10_000_000,
            to_milli in 1i64..10_000_000,
        ) {
            let amount = Decimal::new(cents, 2);
            let from_rate = Decimal::new(from_milli, 3);
            let to_rate = Decimal::new(to_milli, 3);

            let there = Conversion::compute(code("A"), code("B"), amount, from_rate, to_rate).unwrap();
            let back = Conversion::compute(code("B"), code("A"), there.exact, to_rate, from_rate).unwrap();

            prop_assert!((back.rounded() - amount).abs() <= dec!(0.01));
        }
    }
}
