//! Benefit formula parameters for the pension and the government benefit

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::Rate;

/// Defined-benefit pension formula
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PensionRules {
    /// Multiplier per year of service
    pub multiplier: Rate,

    /// Enhanced multiplier when retiring at `enhanced_age` with
    /// `enhanced_service_years` or more
    pub enhanced_multiplier: Rate,
    pub enhanced_age: u32,
    pub enhanced_service_years: u32,

    /// Reduction per year under `unreduced_age` for reduced retirements
    pub early_reduction_per_year: Rate,
    pub unreduced_age: u32,

    /// Retiring at this age with `full_service_age_years` of service is unreduced
    pub full_service_age: u32,
    pub full_service_age_years: u32,

    /// Any age with this much service is unreduced
    pub full_service_years: u32,

    /// Annuity reduction for a 50% survivor election
    pub full_survivor_reduction: Rate,

    /// Annuity reduction for a 25% survivor election
    pub partial_survivor_reduction: Rate,

    /// Supplement is paid until this age
    pub supplement_end_age: u32,

    /// Supplement = benefit at 62 x service / divisor
    pub supplement_service_divisor: Decimal,
}

impl Default for PensionRules {
    fn default() -> Self {
        Self {
            multiplier: dec!(0.010),
            enhanced_multiplier: dec!(0.011),
            enhanced_age: 62,
            enhanced_service_years: 20,
            early_reduction_per_year: dec!(0.05),
            unreduced_age: 62,
            full_service_age: 60,
            full_service_age_years: 20,
            full_service_years: 30,
            full_survivor_reduction: dec!(0.10),
            partial_survivor_reduction: dec!(0.05),
            supplement_end_age: 62,
            supplement_service_divisor: dec!(40),
        }
    }
}

/// Tiered pension cost-of-living adjustment
///
/// Index at or below `low_threshold` passes through in full; between the
/// thresholds the adjustment is capped at `low_threshold`; above
/// `high_threshold` it is the index minus `high_offset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColaPolicy {
    pub eligible_age: u32,
    pub low_threshold: Rate,
    pub high_threshold: Rate,
    pub high_offset: Rate,
}

impl Default for ColaPolicy {
    fn default() -> Self {
        Self {
            eligible_age: 62,
            low_threshold: dec!(0.02),
            high_threshold: dec!(0.03),
            high_offset: dec!(0.01),
        }
    }
}

impl ColaPolicy {
    /// Adjustment for a reference index; deflation never cuts the annuity
    pub fn adjustment(&self, index: Rate) -> Rate {
        if index <= Decimal::ZERO {
            Decimal::ZERO
        } else if index <= self.low_threshold {
            index
        } else if index <= self.high_threshold {
            self.low_threshold
        } else {
            index - self.high_offset
        }
    }
}

/// Claiming-age adjustment for the government retirement benefit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernmentBenefitRules {
    pub earliest_claim_age: u32,
    pub latest_credit_age: u32,

    /// Months early charged at `early_rate_first` per month
    pub early_first_months: u32,
    pub early_rate_first: Rate,
    pub early_rate_beyond: Rate,

    /// Credit per month claimed after full retirement age
    pub delayed_rate: Rate,
}

impl Default for GovernmentBenefitRules {
    fn default() -> Self {
        Self {
            earliest_claim_age: 62,
            latest_credit_age: 70,
            early_first_months: 36,
            early_rate_first: dec!(5) / dec!(900),
            early_rate_beyond: dec!(5) / dec!(1200),
            delayed_rate: dec!(2) / dec!(300),
        }
    }
}

impl GovernmentBenefitRules {
    /// Full retirement age in months for a birth cohort
    pub fn full_retirement_age_months(&self, birth_year: i32) -> u32 {
        match birth_year {
            y if y <= 1937 => 65 * 12,
            y if y <= 1942 => 65 * 12 + 2 * (y - 1937) as u32,
            y if y <= 1954 => 66 * 12,
            y if y <= 1959 => 66 * 12 + 2 * (y - 1954) as u32,
            _ => 67 * 12,
        }
    }

    /// Multiplier applied to the full-retirement-age amount
    pub fn claim_factor(&self, claim_age_months: u32, fra_months: u32) -> Decimal {
        if claim_age_months < fra_months {
            let early = fra_months - claim_age_months;
            let first = early.min(self.early_first_months);
            let beyond = early - first;
            Decimal::ONE
                - Decimal::from(first) * self.early_rate_first
                - Decimal::from(beyond) * self.early_rate_beyond
        } else {
            let capped = claim_age_months.min(self.latest_credit_age * 12);
            let delayed = capped.saturating_sub(fra_months);
            Decimal::ONE + Decimal::from(delayed) * self.delayed_rate
        }
    }
}

/// All benefit formula parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenefitRules {
    pub pension: PensionRules,
    pub cola: ColaPolicy,
    pub government: GovernmentBenefitRules,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::round_cents;

    #[test]
    fn test_cola_tiers() {
        let cola = ColaPolicy::default();
        assert_eq!(cola.adjustment(dec!(-0.01)), dec!(0));
        assert_eq!(cola.adjustment(dec!(0.015)), dec!(0.015));
        assert_eq!(cola.adjustment(dec!(0.02)), dec!(0.02));
        assert_eq!(cola.adjustment(dec!(0.025)), dec!(0.02));
        assert_eq!(cola.adjustment(dec!(0.03)), dec!(0.02));
        assert_eq!(cola.adjustment(dec!(0.045)), dec!(0.035));
    }

    #[test]
    fn test_full_retirement_age() {
        let rules = GovernmentBenefitRules::default();
        assert_eq!(rules.full_retirement_age_months(1950), 792);
        assert_eq!(rules.full_retirement_age_months(1957), 66 * 12 + 6);
        assert_eq!(rules.full_retirement_age_months(1966), 804);
    }

    #[test]
    fn test_claim_factor() {
        let rules = GovernmentBenefitRules::default();
        let fra = 67 * 12;

        assert_eq!(rules.claim_factor(fra, fra), Decimal::ONE);
        // Claiming at 62 with FRA 67: 36 x 5/9% + 24 x 5/12% = 30%
        assert_eq!(round_cents(rules.claim_factor(62 * 12, fra)), dec!(0.70));
        // Claiming at 70: 36 months x 2/3% = 24%
        assert_eq!(round_cents(rules.claim_factor(70 * 12, fra)), dec!(1.24));
        // No credit past 70
        assert_eq!(
            rules.claim_factor(72 * 12, fra),
            rules.claim_factor(70 * 12, fra)
        );
    }
}
