//! Money conversion helpers.
//!
//! Amounts are `rust_decimal::Decimal` in the currency's standard unit
//! (dollars). Integer cents appear only at the payment-provider boundary;
//! these two helpers are the single place that conversion happens.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Convert a decimal dollar amount to integer cents, rounding to the nearest
/// cent. Saturates at zero for negative inputs (provider amounts are never
/// negative).
#[must_use]
pub fn decimal_to_cents(amount: Decimal) -> i64 {
    let cents = (amount * Decimal::from(100)).round();
    cents.to_i64().unwrap_or(0).max(0)
}

/// Convert integer cents to a decimal dollar amount.
#[must_use]
pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_to_cents() {
        assert_eq!(decimal_to_cents(Decimal::new(7999, 2)), 7999); // 79.99
        assert_eq!(decimal_to_cents(Decimal::new(100, 2)), 100); // 1.00
        assert_eq!(decimal_to_cents(Decimal::ZERO), 0);
    }

    #[test]
    fn test_decimal_to_cents_rounds() {
        // 11.59855 -> 1159.855 cents -> 1160
        assert_eq!(decimal_to_cents(Decimal::new(1_159_855, 5)), 1160);
    }

    #[test]
    fn test_cents_to_decimal() {
        assert_eq!(cents_to_decimal(7999), Decimal::new(7999, 2));
        assert_eq!(cents_to_decimal(0), Decimal::ZERO.round_dp(2));
    }

    #[test]
    fn test_round_trip() {
        let amount = Decimal::new(15_998, 2); // 159.98
        assert_eq!(cents_to_decimal(decimal_to_cents(amount)), amount);
    }
}
