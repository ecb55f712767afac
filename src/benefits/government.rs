//! Government retirement benefit: claiming-age adjustment and first-year
//! proration

use chrono::Datelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ClaimAge;
use crate::assumptions::GovernmentBenefitRules;
use crate::error::{PlannerError, PlannerResult};
use crate::household::Participant;
use crate::types::{round_cents, Money};

/// When and at what level the benefit starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSchedule {
    pub claim_year: i32,
    /// 1-based calendar month of the first payment
    pub claim_month: u32,
    pub claim_age_months: u32,
    pub full_retirement_age_months: u32,
    /// Claiming-age multiplier on the full-retirement-age amount
    pub factor: Decimal,
    /// Annual benefit at claim, before proration and COLA
    pub annual_benefit: Money,
}

impl ClaimSchedule {
    /// Months of eligibility in the claim year
    pub fn first_year_months(&self) -> u32 {
        13 - self.claim_month
    }
}

pub struct GovernmentBenefitCalculator<'a> {
    rules: &'a GovernmentBenefitRules,
}

impl<'a> GovernmentBenefitCalculator<'a> {
    pub fn new(rules: &'a GovernmentBenefitRules) -> Self {
        Self { rules }
    }

    pub fn schedule(&self, participant: &Participant, claim_age: ClaimAge) -> PlannerResult<ClaimSchedule> {
        let claim_age_months = claim_age.total_months();
        if claim_age_months < self.rules.earliest_claim_age * 12 {
            return Err(PlannerError::config(
                "benefit_claim_age",
                format!(
                    "{} claims at {}y{}m, earliest is {}",
                    participant.name, claim_age.years, claim_age.months, self.rules.earliest_claim_age
                ),
            ));
        }

        let fra = self.rules.full_retirement_age_months(participant.birth_year());
        let factor = self.rules.claim_factor(claim_age_months, fra);

        let offset = participant.birth_date.month0() + claim_age_months;
        let claim_year = participant.birth_year() + (offset / 12) as i32;
        let claim_month = offset % 12 + 1;

        Ok(ClaimSchedule {
            claim_year,
            claim_month,
            claim_age_months,
            full_retirement_age_months: fra,
            factor,
            annual_benefit: round_cents(participant.government_benefit_at_fra * factor * Decimal::from(12)),
        })
    }

    /// Annual benefit if claimed at the earliest age
    pub fn annual_at_earliest(&self, participant: &Participant) -> Money {
        let fra = self.rules.full_retirement_age_months(participant.birth_year());
        let factor = self.rules.claim_factor(self.rules.earliest_claim_age * 12, fra);
        round_cents(participant.government_benefit_at_fra * factor * Decimal::from(12))
    }
}
