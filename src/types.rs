//! Shared money and rate aliases plus decimal helpers

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{PlannerError, PlannerResult};

/// Dollar amount. Always exact decimal.
pub type Money = Decimal;

/// Annual rate expressed as a fraction (0.04 = 4%).
pub type Rate = Decimal;

/// Compute (1 + r)^n by repeated multiplication.
pub fn compound(rate: Rate, n: u32) -> Decimal {
    let factor = Decimal::ONE + rate;
    let mut result = Decimal::ONE;
    for _ in 0..n {
        result *= factor;
    }
    result
}

/// Round to whole cents, half away from zero.
pub fn round_cents(amount: Money) -> Money {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a sampled f64 into a Decimal rate with 8 fractional digits.
///
/// Rounding happens here so that every downstream decimal operation is
/// reproducible bit-for-bit.
pub fn rate_from_f64(value: f64) -> PlannerResult<Rate> {
    if !value.is_finite() {
        return Err(PlannerError::Arithmetic(format!(
            "non-finite sampled value {value}"
        )));
    }
    Decimal::from_f64(value)
        .map(|d| d.round_dp(8))
        .ok_or_else(|| PlannerError::Arithmetic(format!("value {value} out of decimal range")))
}

/// Lossy conversion for statistics and display.
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Fraction `part / whole`, zero when `whole` is zero.
pub fn ratio(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        part / whole
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_compound() {
        assert_eq!(compound(dec!(0.10), 0), Decimal::ONE);
        assert_eq!(compound(dec!(0.10), 2), dec!(1.21));
        assert_eq!(compound(dec!(-0.5), 3), dec!(0.125));
    }

    #[test]
    fn test_round_cents_is_half_away_from_zero() {
        assert_eq!(round_cents(dec!(10.005)), dec!(10.01));
        assert_eq!(round_cents(dec!(-10.005)), dec!(-10.01));
        assert_eq!(round_cents(dec!(10.004)), dec!(10.00));
    }

    #[test]
    fn test_rate_from_f64() {
        assert_eq!(rate_from_f64(0.1071).unwrap(), dec!(0.1071));
        assert!(rate_from_f64(f64::NAN).is_err());
        assert!(rate_from_f64(f64::INFINITY).is_err());
    }

    #[test]
    fn test_ratio_guards_zero() {
        assert_eq!(ratio(dec!(5), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(ratio(dec!(5), dec!(20)), dec!(0.25));
    }
}
