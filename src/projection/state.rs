//! Projection state tracking for one household

use std::collections::BTreeMap;

use chrono::Datelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::benefits::{worked_months, ClaimSchedule, PensionAward};
use crate::household::{FilingStatus, Household, Participant};
use crate::scenario::ParticipantElection;
use crate::types::{compound, round_cents, Money, Rate};
use crate::withdrawal::{SourceBalances, StrategyState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmploymentStatus {
    Working,
    PartialYearRetired,
    Retired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenefitStatus {
    NotClaimed,
    Claimed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RmdStatus {
    PreRmd,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifeStatus {
    Alive,
    Deceased,
}

/// Snapshot of one participant's states for a year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantStatus {
    pub age: u32,
    pub employment: EmploymentStatus,
    pub benefit: BenefitStatus,
    pub rmd: RmdStatus,
    pub life: LifeStatus,
}

/// Per-participant state carried across years
#[derive(Debug, Clone)]
pub struct ParticipantState {
    pub status: ParticipantStatus,

    /// Months of wages earned this year
    pub worked_months: u32,

    /// Full-year salary for the current year
    pub salary: Money,

    pub retirement_year: i32,
    pub rmd_onset_age: u32,

    pub pension: Option<PensionAward>,
    /// Current annual annuity (full-year basis, COLA applied)
    pub pension_annuity: Money,
    /// Current annual survivor annuity (full-year basis, COLA applied)
    pub survivor_annuity: Money,

    pub claim: ClaimSchedule,
    /// Current annual government benefit (full-year basis, COLA applied)
    pub government_benefit: Money,
}

impl ParticipantState {
    pub fn new(
        election: &ParticipantElection,
        pension: Option<PensionAward>,
        claim: ClaimSchedule,
        rmd_onset_age: u32,
    ) -> Self {
        Self {
            status: ParticipantStatus {
                age: 0,
                employment: EmploymentStatus::Working,
                benefit: BenefitStatus::NotClaimed,
                rmd: RmdStatus::PreRmd,
                life: LifeStatus::Alive,
            },
            worked_months: 12,
            salary: Decimal::ZERO,
            retirement_year: election.retirement_date.year(),
            rmd_onset_age,
            pension_annuity: pension.as_ref().map(|a| a.annual_annuity).unwrap_or_default(),
            survivor_annuity: pension.as_ref().map(|a| a.survivor_annuity).unwrap_or_default(),
            pension,
            government_benefit: claim.annual_benefit,
            claim,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status.life == LifeStatus::Alive
    }

    /// Whether the pension paid anything before `year`
    fn pension_started_before(&self, year: i32) -> bool {
        self.pension.is_some() && self.retirement_year < year
    }

    /// Cross the boundary into `year`
    ///
    /// `pension_cola` and `benefit_cola` are the adjustments effective this
    /// year; they only touch amounts already in payment.
    pub fn advance_year(
        &mut self,
        participant: &Participant,
        election: &ParticipantElection,
        year: i32,
        start_year: i32,
        pension_cola: Rate,
        benefit_cola: Rate,
    ) {
        let age = participant.age_in(year);
        self.status.age = age;

        self.status.life = if participant.is_alive_in(year) {
            LifeStatus::Alive
        } else {
            LifeStatus::Deceased
        };

        let (employment, months) = if year < self.retirement_year {
            (EmploymentStatus::Working, 12)
        } else if year == self.retirement_year {
            match worked_months(election.retirement_date) {
                12 => (EmploymentStatus::Working, 12),
                0 => (EmploymentStatus::Retired, 0),
                m => (EmploymentStatus::PartialYearRetired, m),
            }
        } else {
            (EmploymentStatus::Retired, 0)
        };
        self.status.employment = employment;
        self.worked_months = if self.is_alive() { months } else { 0 };

        let elapsed = (year - start_year).max(0) as u32;
        self.salary = round_cents(participant.annual_salary * compound(participant.salary_growth, elapsed));

        if year > start_year && self.pension_started_before(year) {
            self.pension_annuity = round_cents(self.pension_annuity * (Decimal::ONE + pension_cola));
            self.survivor_annuity = round_cents(self.survivor_annuity * (Decimal::ONE + pension_cola));
        }

        if year > self.claim.claim_year && year > start_year {
            self.government_benefit = round_cents(self.government_benefit * (Decimal::ONE + benefit_cola));
        }
        self.status.benefit = if year >= self.claim.claim_year {
            BenefitStatus::Claimed
        } else {
            BenefitStatus::NotClaimed
        };

        self.status.rmd = if age >= self.rmd_onset_age {
            RmdStatus::Active
        } else {
            RmdStatus::PreRmd
        };
    }

    /// Annuity paid to the participant this year
    pub fn pension_income(&self, year: i32) -> Money {
        let Some(award) = &self.pension else {
            return Decimal::ZERO;
        };
        if !self.is_alive() || year < self.retirement_year {
            return Decimal::ZERO;
        }
        if year == self.retirement_year {
            round_cents(self.pension_annuity * Decimal::from(award.first_year_months()) / Decimal::from(12))
        } else {
            self.pension_annuity
        }
    }

    /// Supplement paid this year (until the supplement end age)
    pub fn supplement_income(&self, year: i32, end_age: u32) -> Money {
        let Some(award) = &self.pension else {
            return Decimal::ZERO;
        };
        if !self.is_alive() || year < self.retirement_year || self.status.age >= end_age {
            return Decimal::ZERO;
        }
        if year == self.retirement_year {
            round_cents(award.annual_supplement * Decimal::from(award.first_year_months()) / Decimal::from(12))
        } else {
            award.annual_supplement
        }
    }

    /// Government benefit paid to the participant in their own right
    pub fn own_government_benefit(&self, year: i32) -> Money {
        if !self.is_alive() || year < self.claim.claim_year {
            return Decimal::ZERO;
        }
        if year == self.claim.claim_year {
            round_cents(
                self.government_benefit * Decimal::from(self.claim.first_year_months()) / Decimal::from(12),
            )
        } else {
            self.government_benefit
        }
    }

    /// Full-year benefit in payment, whether or not alive; used for the
    /// survivor comparison
    pub fn benefit_in_payment(&self, year: i32) -> Money {
        if year > self.claim.claim_year {
            self.government_benefit
        } else {
            Decimal::ZERO
        }
    }
}

/// Whole-household state carried across years
#[derive(Debug, Clone)]
pub struct ProjectionState {
    pub year: i32,
    pub participants: Vec<ParticipantState>,
    pub balances: SourceBalances,
    pub strategy: StrategyState,
    pub filing_status: FilingStatus,

    /// Cumulative price change since the start year
    pub price_index: Decimal,

    /// Modified income by year, for the lagged surcharge
    pub modified_income: BTreeMap<i32, Money>,

    /// Set once every living participant is fully retired
    pub withdrawals_active: bool,
    pub first_withdrawal_year: Option<i32>,
    pub depletion_year: Option<i32>,
}

impl ProjectionState {
    pub fn from_household(household: &Household, participants: Vec<ParticipantState>, start_year: i32) -> Self {
        Self {
            year: start_year - 1,
            participants,
            balances: SourceBalances::from_household(household),
            strategy: StrategyState::new(),
            filing_status: household.filing_status,
            price_index: Decimal::ONE,
            modified_income: BTreeMap::new(),
            withdrawals_active: false,
            first_withdrawal_year: None,
            depletion_year: None,
        }
    }

    pub fn any_alive(&self) -> bool {
        self.participants.iter().any(|p| p.is_alive())
    }

    pub fn all_alive_retired(&self) -> bool {
        self.participants
            .iter()
            .filter(|p| p.is_alive())
            .all(|p| p.status.employment == EmploymentStatus::Retired)
    }

    /// Handle deaths that took effect this year: accounts roll to the
    /// survivor and the household files single from now on. In the first
    /// year every death before it counts.
    pub fn apply_deaths(&mut self, household: &Household, first_year: bool) {
        let year = self.year;
        let newly_deceased: Vec<usize> = household
            .participants
            .iter()
            .enumerate()
            .filter(|(_, p)| match p.death_year {
                Some(d) if first_year => d < year,
                Some(d) => d == year - 1,
                None => false,
            })
            .map(|(i, _)| i)
            .collect();
        if newly_deceased.is_empty() {
            return;
        }
        if let Some(survivor) = self.participants.iter().position(|p| p.is_alive()) {
            for from in newly_deceased {
                self.balances.roll_over(from, survivor);
            }
        }
        self.filing_status = FilingStatus::Single;
    }
}
