//! Sales tax calculation.
//!
//! A manual per-state rate table for the states where we collect. Unknown or
//! missing regions get a zero rate rather than an error; tax collection is a
//! business rule, not a validation failure.

use rust_decimal::Decimal;

/// US states with a configured rate, for admin display.
pub const NEXUS_STATES: &[&str] = &["CA", "TX", "NY", "FL", "WA"];

/// Outcome of a tax calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxCalculation {
    /// Applied rate as a fraction (0.0725 for CA).
    pub rate: Decimal,
    /// Tax amount, rounded to cents.
    pub amount: Decimal,
    /// Normalized two-letter state code the rate was looked up under.
    pub state: String,
}

fn state_rate(state: &str) -> Decimal {
    match state {
        "CA" => Decimal::new(725, 4),  // 7.25%
        "TX" => Decimal::new(625, 4),  // 6.25%
        "NY" => Decimal::new(8, 2),    // 8%
        "FL" => Decimal::new(6, 2),    // 6%
        "WA" => Decimal::new(65, 3),   // 6.5%
        _ => Decimal::ZERO,
    }
}

/// Whether we collect tax for the given region.
#[must_use]
pub fn has_nexus(region: &str) -> bool {
    !state_rate(&region.trim().to_uppercase()).is_zero()
}

/// Compute tax on a subtotal for a shipping region. The region is trimmed
/// and uppercased before lookup; unknown regions tax at zero.
#[must_use]
pub fn calculate_tax(subtotal: Decimal, region: &str) -> TaxCalculation {
    let state = region.trim().to_uppercase();
    let rate = state_rate(&state);
    TaxCalculation {
        rate,
        amount: (subtotal * rate).round_dp(2),
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_california_rate() {
        // 7.25% of $159.98 is $11.59855, rounded to $11.60.
        let tax = calculate_tax(Decimal::new(15_998, 2), "CA");
        assert_eq!(tax.rate, Decimal::new(725, 4));
        assert_eq!(tax.amount, Decimal::new(1160, 2));
    }

    #[test]
    fn test_all_configured_states() {
        for &state in NEXUS_STATES {
            assert!(has_nexus(state), "{state} should have a rate");
            assert!(!calculate_tax(Decimal::ONE_HUNDRED, state).amount.is_zero());
        }
    }

    #[test]
    fn test_unknown_region_is_zero() {
        let tax = calculate_tax(Decimal::ONE_HUNDRED, "OR");
        assert_eq!(tax.amount, Decimal::ZERO);
        assert!(!has_nexus("OR"));
        assert!(!has_nexus(""));
    }

    #[test]
    fn test_region_normalization() {
        let tax = calculate_tax(Decimal::ONE_HUNDRED, "  ca ");
        assert_eq!(tax.state, "CA");
        assert_eq!(tax.amount, Decimal::new(725, 2));
    }

    #[test]
    fn test_zero_subtotal() {
        assert_eq!(calculate_tax(Decimal::ZERO, "NY").amount, Decimal::ZERO);
    }
}
