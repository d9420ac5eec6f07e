//! Monetary rounding and formatting helpers.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Decimal places used for every reported amount and rate.
pub const CENT_PLACES: u32 = 2;

/// Round to two decimal places, midpoint away from zero.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CENT_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Render a value as a fixed-point string with exactly two decimal places.
///
/// Values that round to zero are always rendered as `0.00`.
pub fn format_cents(value: Decimal) -> String {
    let mut rounded = round_cents(value);
    rounded.rescale(CENT_PLACES);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded.to_string()
}

/// Convert a JSON number into a decimal without going through binary floats.
///
/// Returns `None` when the number cannot be represented.
pub fn decimal_from_json(number: &serde_json::Number) -> Option<Decimal> {
    if let Some(i) = number.as_i64() {
        return Some(Decimal::from(i));
    }
    if let Some(u) = number.as_u64() {
        return Some(Decimal::from(u));
    }

    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round_cents(dec!(2.345)), dec!(2.35));
        assert_eq!(round_cents(dec!(-2.345)), dec!(-2.35));
        assert_eq!(round_cents(dec!(2.344)), dec!(2.34));
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(dec!(2)), "2.00");
        assert_eq!(format_cents(dec!(1800)), "1800.00");
        assert_eq!(format_cents(dec!(0.845)), "0.85");
        assert_eq!(format_cents(dec!(-12.5)), "-12.50");
        assert_eq!(format_cents(dec!(-0.001)), "0.00");
        assert_eq!(format_cents(Decimal::ZERO), "0.00");
    }

    #[test]
    fn test_decimal_from_json() {
        let value: serde_json::Value = serde_json::from_str(r#"[1, 0.85, 45000.5, 1e-7]"#).unwrap();
        let numbers: Vec<Decimal> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| match v {
                serde_json::Value::Number(n) => decimal_from_json(n).unwrap(),
                other => panic!("not a number: {}", other),
            })
            .collect();

        assert_eq!(numbers[0], dec!(1));
        assert_eq!(numbers[1], dec!(0.85));
        assert_eq!(numbers[2], dec!(45000.5));
        assert_eq!(numbers[3], dec!(0.0000001));
    }
}
