//! Built-in demo household used by the CLI and tests

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use super::{FilingStatus, Household, Participant};
use crate::error::{PlannerError, PlannerResult};

pub(crate) fn ymd(year: i32, month: u32, day: u32) -> PlannerResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        PlannerError::config("date", format!("{year}-{month:02}-{day:02} is not a calendar date"))
    })
}

/// Dual-income couple: one pension-covered career employee and one
/// private-sector earner, both mid-career savers.
pub fn demo_household() -> PlannerResult<Household> {
    let mut alex = Participant::new("Alex", ymd(1966, 3, 10)?);
    alex.hire_date = Some(ymd(1996, 6, 1)?);
    alex.annual_salary = dec!(124000);
    alex.salary_growth = dec!(0.02);
    alex.high3_salary = dec!(119500);
    alex.has_pension = true;
    alex.contribution_rate = dec!(0.05);
    alex.employer_match_rate = dec!(0.05);
    alex.tax_deferred_balance = dec!(640000);
    alex.tax_free_balance = dec!(115000);
    alex.government_benefit_at_fra = dec!(2650);

    let mut jordan = Participant::new("Jordan", ymd(1968, 8, 22)?);
    jordan.annual_salary = dec!(86000);
    jordan.salary_growth = dec!(0.025);
    jordan.contribution_rate = dec!(0.08);
    jordan.employer_match_rate = dec!(0.04);
    jordan.tax_deferred_balance = dec!(285000);
    jordan.tax_free_balance = dec!(62000);
    jordan.government_benefit_at_fra = dec!(2150);

    Ok(Household {
        participants: vec![alex, jordan],
        filing_status: FilingStatus::MarriedJoint,
        taxable_balance: dec!(150000),
        annual_health_premium: dec!(7200),
    })
}
