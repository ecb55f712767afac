//! Pension and government retirement benefit calculation

mod government;
mod pension;

pub use government::{ClaimSchedule, GovernmentBenefitCalculator};
pub use pension::{worked_months, PensionAward, PensionCalculator};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Age at which the government benefit is claimed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimAge {
    pub years: u32,
    #[serde(default)]
    pub months: u32,
}

impl ClaimAge {
    pub fn new(years: u32, months: u32) -> Self {
        Self { years, months }
    }

    pub fn years(years: u32) -> Self {
        Self { years, months: 0 }
    }

    pub fn total_months(&self) -> u32 {
        self.years * 12 + self.months
    }
}

/// Pension survivor annuity election
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SurvivorElection {
    #[default]
    None,
    /// 25% survivor annuity
    Partial,
    /// 50% survivor annuity
    Full,
}

impl SurvivorElection {
    /// Share of the basic annuity paid to the survivor
    pub fn percentage(&self) -> Decimal {
        match self {
            SurvivorElection::None => Decimal::ZERO,
            SurvivorElection::Partial => dec!(0.25),
            SurvivorElection::Full => dec!(0.50),
        }
    }
}
