//! Household and participant records

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, PlannerResult};
use crate::types::{Money, Rate};

/// Tax filing status of the household
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilingStatus {
    Single,
    MarriedJoint,
}

/// One person in the household
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Display name, used in logs and reports
    pub name: String,

    pub birth_date: NaiveDate,

    /// Start of creditable service for the pension (None = no service)
    #[serde(default)]
    pub hire_date: Option<NaiveDate>,

    /// Current annual salary
    pub annual_salary: Money,

    /// Annual salary growth while working
    #[serde(default)]
    pub salary_growth: Rate,

    /// Current high-3 average salary for the pension formula
    #[serde(default)]
    pub high3_salary: Money,

    /// Whether the participant is covered by the defined-benefit pension
    #[serde(default)]
    pub has_pension: bool,

    /// Employee contribution rate into the tax-deferred account
    #[serde(default)]
    pub contribution_rate: Rate,

    /// Employer match as a fraction of wages
    #[serde(default)]
    pub employer_match_rate: Rate,

    /// Tax-deferred (traditional) account balance
    #[serde(default)]
    pub tax_deferred_balance: Money,

    /// Tax-free (Roth) account balance
    #[serde(default)]
    pub tax_free_balance: Money,

    /// Monthly government benefit payable at full retirement age, today's dollars
    #[serde(default)]
    pub government_benefit_at_fra: Money,

    /// Calendar year of death. Alive through the end of this year.
    #[serde(default)]
    pub death_year: Option<i32>,
}

impl Participant {
    pub fn new(name: impl Into<String>, birth_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            birth_date,
            hire_date: None,
            annual_salary: Decimal::ZERO,
            salary_growth: Decimal::ZERO,
            high3_salary: Decimal::ZERO,
            has_pension: false,
            contribution_rate: Decimal::ZERO,
            employer_match_rate: Decimal::ZERO,
            tax_deferred_balance: Decimal::ZERO,
            tax_free_balance: Decimal::ZERO,
            government_benefit_at_fra: Decimal::ZERO,
            death_year: None,
        }
    }

    pub fn birth_year(&self) -> i32 {
        self.birth_date.year()
    }

    /// Age attained during the given calendar year
    pub fn age_in(&self, year: i32) -> u32 {
        (year - self.birth_year()).max(0) as u32
    }

    pub fn is_alive_in(&self, year: i32) -> bool {
        self.death_year.map_or(true, |d| year <= d)
    }

    /// Whole months of creditable service up to `date`
    pub fn service_months_at(&self, date: NaiveDate) -> u32 {
        let Some(hire) = self.hire_date else {
            return 0;
        };
        if date <= hire {
            return 0;
        }
        let mut months = (date.year() - hire.year()) * 12 + date.month() as i32 - hire.month() as i32;
        if date.day() < hire.day() {
            months -= 1;
        }
        months.max(0) as u32
    }

    /// Creditable service in years (fractional, whole months only)
    pub fn service_years_at(&self, date: NaiveDate) -> Decimal {
        Decimal::from(self.service_months_at(date)) / Decimal::from(12)
    }

    /// Age in whole months on `date`
    pub fn age_months_at(&self, date: NaiveDate) -> u32 {
        let b = self.birth_date;
        let mut months = (date.year() - b.year()) * 12 + date.month() as i32 - b.month() as i32;
        if date.day() < b.day() {
            months -= 1;
        }
        months.max(0) as u32
    }

    fn validate(&self, idx: usize) -> PlannerResult<()> {
        let field = |name: &str| format!("participants[{idx}].{name}");

        for (name, value) in [
            ("annual_salary", self.annual_salary),
            ("high3_salary", self.high3_salary),
            ("government_benefit_at_fra", self.government_benefit_at_fra),
        ] {
            if value < Decimal::ZERO {
                return Err(PlannerError::config(field(name), "must not be negative"));
            }
        }

        for (name, value) in [
            ("tax_deferred_balance", self.tax_deferred_balance),
            ("tax_free_balance", self.tax_free_balance),
        ] {
            if value < Decimal::ZERO {
                return Err(PlannerError::Arithmetic(format!(
                    "{} is negative ({value})",
                    field(name)
                )));
            }
        }

        for (name, value) in [
            ("contribution_rate", self.contribution_rate),
            ("employer_match_rate", self.employer_match_rate),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(PlannerError::config(field(name), "must be between 0 and 1"));
            }
        }

        if let Some(hire) = self.hire_date {
            if hire < self.birth_date {
                return Err(PlannerError::config(field("hire_date"), "precedes birth date"));
            }
        }
        if self.has_pension && self.hire_date.is_none() {
            return Err(PlannerError::config(
                field("hire_date"),
                "required when has_pension is set",
            ));
        }

        Ok(())
    }
}

/// The planning unit: one or two participants sharing a taxable account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Household {
    pub participants: Vec<Participant>,

    pub filing_status: FilingStatus,

    /// Jointly held taxable brokerage balance
    #[serde(default)]
    pub taxable_balance: Money,

    /// Annual private health insurance premium in today's dollars
    #[serde(default)]
    pub annual_health_premium: Money,
}

impl Household {
    pub fn single(participant: Participant) -> Self {
        Self {
            participants: vec![participant],
            filing_status: FilingStatus::Single,
            taxable_balance: Decimal::ZERO,
            annual_health_premium: Decimal::ZERO,
        }
    }

    pub fn couple(first: Participant, second: Participant) -> Self {
        Self {
            participants: vec![first, second],
            filing_status: FilingStatus::MarriedJoint,
            taxable_balance: Decimal::ZERO,
            annual_health_premium: Decimal::ZERO,
        }
    }

    /// Sum of every savings balance
    pub fn total_savings(&self) -> Money {
        self.taxable_balance
            + self
                .participants
                .iter()
                .map(|p| p.tax_deferred_balance + p.tax_free_balance)
                .sum::<Decimal>()
    }

    /// Check structural validity before projecting
    ///
    /// Negative balances are reported as arithmetic errors; everything else
    /// is a configuration error.
    pub fn validate(&self) -> PlannerResult<()> {
        match self.participants.len() {
            1 | 2 => {}
            n => {
                return Err(PlannerError::config(
                    "participants",
                    format!("expected 1 or 2 participants, found {n}"),
                ))
            }
        }
        if self.filing_status == FilingStatus::MarriedJoint && self.participants.len() != 2 {
            return Err(PlannerError::config(
                "filing_status",
                "joint filing requires two participants",
            ));
        }
        if self.taxable_balance < Decimal::ZERO {
            return Err(PlannerError::Arithmetic(format!(
                "taxable_balance is negative ({})",
                self.taxable_balance
            )));
        }
        if self.annual_health_premium < Decimal::ZERO {
            return Err(PlannerError::config("annual_health_premium", "must not be negative"));
        }
        for (idx, p) in self.participants.iter().enumerate() {
            p.validate(idx)?;
        }
        Ok(())
    }
}
