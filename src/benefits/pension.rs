//! Defined-benefit pension award

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::SurvivorElection;
use crate::assumptions::{ColaPolicy, PensionRules};
use crate::household::Participant;
use crate::types::{round_cents, Money, Rate};

/// Annuity terms fixed at retirement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PensionAward {
    pub retirement_date: NaiveDate,
    pub service_years: Decimal,
    pub high3: Money,
    pub multiplier: Rate,
    /// Before early and survivor reductions
    pub basic_annuity: Money,
    pub early_reduction: Rate,
    pub survivor_reduction: Rate,
    /// Payable to the annuitant, annual
    pub annual_annuity: Money,
    /// Paid until the supplement end age, no COLA
    pub annual_supplement: Money,
    /// Payable to the spouse after the annuitant's death, annual
    pub survivor_annuity: Money,
}

impl PensionAward {
    /// Months of annuity paid in the retirement year. Payments start the
    /// month after the last day worked.
    pub fn first_year_months(&self) -> u32 {
        12 - worked_months(self.retirement_date)
    }
}

/// Whole months worked in the calendar year of `retirement_date`
pub fn worked_months(retirement_date: NaiveDate) -> u32 {
    if retirement_date.day() == 1 {
        retirement_date.month() - 1
    } else {
        retirement_date.month()
    }
}

pub struct PensionCalculator<'a> {
    rules: &'a PensionRules,
    cola: &'a ColaPolicy,
}

impl<'a> PensionCalculator<'a> {
    pub fn new(rules: &'a PensionRules, cola: &'a ColaPolicy) -> Self {
        Self { rules, cola }
    }

    /// Fix the annuity at retirement. `None` when the participant has no
    /// pension or no creditable service.
    ///
    /// `benefit_at_62` is the annual government benefit the participant
    /// would draw at 62, used to size the supplement.
    pub fn award(
        &self,
        participant: &Participant,
        retirement_date: NaiveDate,
        survivor: SurvivorElection,
        high3: Money,
        benefit_at_62: Money,
    ) -> Option<PensionAward> {
        if !participant.has_pension {
            return None;
        }
        let service_years = participant.service_years_at(retirement_date);
        if service_years <= Decimal::ZERO {
            return None;
        }
        let age_months = participant.age_months_at(retirement_date);
        let age_years = age_months / 12;
        let rules = self.rules;

        let multiplier = if age_years >= rules.enhanced_age
            && service_years >= Decimal::from(rules.enhanced_service_years)
        {
            rules.enhanced_multiplier
        } else {
            rules.multiplier
        };
        let basic_annuity = round_cents(high3 * service_years * multiplier);

        let unreduced = age_years >= rules.unreduced_age
            || (age_years >= rules.full_service_age
                && service_years >= Decimal::from(rules.full_service_age_years))
            || service_years >= Decimal::from(rules.full_service_years);

        let early_reduction = if unreduced {
            Decimal::ZERO
        } else {
            let months_short = (rules.unreduced_age * 12).saturating_sub(age_months);
            (rules.early_reduction_per_year * Decimal::from(months_short) / Decimal::from(12))
                .min(Decimal::ONE)
        };

        let survivor_reduction = match survivor {
            SurvivorElection::None => Decimal::ZERO,
            SurvivorElection::Partial => rules.partial_survivor_reduction,
            SurvivorElection::Full => rules.full_survivor_reduction,
        };

        let annual_annuity = round_cents(
            basic_annuity * (Decimal::ONE - early_reduction) * (Decimal::ONE - survivor_reduction),
        );

        let annual_supplement = if unreduced && age_years < rules.supplement_end_age {
            round_cents(benefit_at_62 * service_years / rules.supplement_service_divisor)
        } else {
            Decimal::ZERO
        };

        Some(PensionAward {
            retirement_date,
            service_years,
            high3,
            multiplier,
            basic_annuity,
            early_reduction,
            survivor_reduction,
            annual_annuity,
            annual_supplement,
            survivor_annuity: round_cents(basic_annuity * survivor.percentage()),
        })
    }

    /// COLA for a year: nothing before the eligible age, tiered after
    pub fn cola(&self, index: Rate, age: u32) -> Rate {
        if age < self.cola.eligible_age {
            Decimal::ZERO
        } else {
            self.cola.adjustment(index)
        }
    }

    pub fn supplement_end_age(&self) -> u32 {
        self.rules.supplement_end_age
    }
}
