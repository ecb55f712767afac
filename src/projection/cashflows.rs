//! Annual cash-flow records and projection summaries

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::state::ParticipantStatus;
use crate::tax::SurchargeStatus;
use crate::types::Money;

/// One calendar year of household cash flows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnualCashFlow {
    pub year: i32,
    pub participants: Vec<ParticipantStatus>,

    // Income by source
    pub wages: Money,
    pub employee_contributions: Money,
    pub employer_contributions: Money,
    pub pension_income: Money,
    pub annuity_supplement: Money,
    pub government_benefit: Money,

    // Withdrawals by tax character
    pub withdrawal_requested: Money,
    pub required_minimum: Money,
    pub withdrawal_taxable: Money,
    pub withdrawal_tax_deferred: Money,
    pub withdrawal_tax_free: Money,
    pub unmet_withdrawal: Money,

    /// Take-home wages plus benefits plus withdrawals
    pub gross_income: Money,

    // Taxes and premiums
    pub federal_tax: Money,
    pub state_tax: Money,
    pub local_tax: Money,
    pub payroll_tax: Money,
    pub surcharge: Money,
    pub premiums: Money,

    /// gross - (federal + state + local + payroll + surcharge + premiums)
    pub net_income: Money,

    // Surcharge detail
    pub modified_income: Money,
    pub lagged_modified_income: Money,
    pub surcharge_tier: usize,
    pub surcharge_tier_label: Option<String>,
    pub surcharge_status: SurchargeStatus,
    pub surcharge_reduction_needed: Option<Money>,
    pub surcharge_headroom: Option<Money>,

    // End-of-year balances
    pub investment_return: Money,
    pub taxable_balance: Money,
    pub tax_deferred_balance: Money,
    pub tax_free_balance: Money,
    pub total_balance: Money,
}

impl AnnualCashFlow {
    pub fn total_withdrawals(&self) -> Money {
        self.withdrawal_taxable + self.withdrawal_tax_deferred + self.withdrawal_tax_free
    }

    pub fn total_taxes(&self) -> Money {
        self.federal_tax + self.state_tax + self.local_tax + self.payroll_tax + self.surcharge
    }
}

/// A year flagged for surcharge exposure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurchargeRiskYear {
    pub year: i32,
    pub status: SurchargeStatus,
    pub tier_label: Option<String>,
    pub surcharge: Money,
    pub lagged_modified_income: Money,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurchargeRiskSummary {
    pub breach_years: Vec<i32>,
    pub warning_years: Vec<i32>,
    pub total_surcharge: Money,
    /// Breach years whose surcharge exceeds the high-risk threshold
    pub high_risk_years: Vec<SurchargeRiskYear>,
    /// Every breach and warning year with its recommendation
    pub flagged_years: Vec<SurchargeRiskYear>,
}

/// Headline figures for one projected scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub scenario_name: String,
    pub start_year: i32,
    pub end_year: i32,
    /// First year withdrawals were active, if ever
    pub retirement_year: Option<i32>,
    pub first_year_net_income: Money,
    pub average_net_income: Money,
    /// Year savings ran out, if they did
    pub depletion_year: Option<i32>,
    pub final_balance: Money,
    pub lifetime_income: Money,
    pub surcharge_risk: SurchargeRiskSummary,
}

/// Complete projection result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionResult {
    pub scenario_name: String,
    pub cashflows: Vec<AnnualCashFlow>,
    pub retirement_year: Option<i32>,
    pub depletion_year: Option<i32>,
    pub high_risk_threshold: Money,
    pub surcharge_lag_years: u32,
}

impl ProjectionResult {
    pub fn new(scenario_name: impl Into<String>, high_risk_threshold: Money, surcharge_lag_years: u32) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            cashflows: Vec::new(),
            retirement_year: None,
            depletion_year: None,
            high_risk_threshold,
            surcharge_lag_years,
        }
    }

    pub fn add_row(&mut self, row: AnnualCashFlow) {
        self.cashflows.push(row);
    }

    fn retirement_rows(&self) -> &[AnnualCashFlow] {
        let start = self
            .retirement_year
            .and_then(|y| self.cashflows.iter().position(|r| r.year == y))
            .unwrap_or(0);
        &self.cashflows[start..]
    }

    pub fn first_year_net_income(&self) -> Money {
        self.retirement_rows()
            .first()
            .map(|r| r.net_income)
            .unwrap_or_default()
    }

    /// Mean net income over the withdrawal years (all years if none)
    pub fn average_net_income(&self) -> Money {
        let rows = self.retirement_rows();
        if rows.is_empty() {
            return Decimal::ZERO;
        }
        let total: Decimal = rows.iter().map(|r| r.net_income).sum();
        (total / Decimal::from(rows.len())).round_dp(2)
    }

    pub fn final_balance(&self) -> Money {
        self.cashflows.last().map(|r| r.total_balance).unwrap_or_default()
    }

    /// Get summary statistics
    pub fn summary(&self) -> ScenarioSummary {
        ScenarioSummary {
            scenario_name: self.scenario_name.clone(),
            start_year: self.cashflows.first().map(|r| r.year).unwrap_or_default(),
            end_year: self.cashflows.last().map(|r| r.year).unwrap_or_default(),
            retirement_year: self.retirement_year,
            first_year_net_income: self.first_year_net_income(),
            average_net_income: self.average_net_income(),
            depletion_year: self.depletion_year,
            final_balance: self.final_balance(),
            lifetime_income: self.cashflows.iter().map(|r| r.net_income).sum(),
            surcharge_risk: self.surcharge_risk(),
        }
    }

    fn surcharge_risk(&self) -> SurchargeRiskSummary {
        let mut summary = SurchargeRiskSummary::default();
        let lag = self.surcharge_lag_years as i32;

        for row in &self.cashflows {
            summary.total_surcharge += row.surcharge;
            let income_year = row.year - lag;

            let recommendation = match row.surcharge_status {
                SurchargeStatus::Safe => continue,
                SurchargeStatus::Breach => {
                    summary.breach_years.push(row.year);
                    format!(
                        "Reduce {income_year} modified income by ${} to drop below {}",
                        row.surcharge_reduction_needed.unwrap_or_default().round_dp(0),
                        row.surcharge_tier_label.as_deref().unwrap_or("the current tier"),
                    )
                }
                SurchargeStatus::Warning => {
                    summary.warning_years.push(row.year);
                    format!(
                        "Only ${} of {income_year} modified income headroom before the first surcharge tier",
                        row.surcharge_headroom.unwrap_or_default().round_dp(0),
                    )
                }
            };

            let flagged = SurchargeRiskYear {
                year: row.year,
                status: row.surcharge_status,
                tier_label: row.surcharge_tier_label.clone(),
                surcharge: row.surcharge,
                lagged_modified_income: row.lagged_modified_income,
                recommendation,
            };
            if row.surcharge_status == SurchargeStatus::Breach && row.surcharge > self.high_risk_threshold {
                summary.high_risk_years.push(flagged.clone());
            }
            summary.flagged_years.push(flagged);
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(year: i32, net: Money, balance: Money) -> AnnualCashFlow {
        AnnualCashFlow {
            year,
            participants: Vec::new(),
            wages: Decimal::ZERO,
            employee_contributions: Decimal::ZERO,
            employer_contributions: Decimal::ZERO,
            pension_income: Decimal::ZERO,
            annuity_supplement: Decimal::ZERO,
            government_benefit: Decimal::ZERO,
            withdrawal_requested: Decimal::ZERO,
            required_minimum: Decimal::ZERO,
            withdrawal_taxable: Decimal::ZERO,
            withdrawal_tax_deferred: Decimal::ZERO,
            withdrawal_tax_free: Decimal::ZERO,
            unmet_withdrawal: Decimal::ZERO,
            gross_income: net,
            federal_tax: Decimal::ZERO,
            state_tax: Decimal::ZERO,
            local_tax: Decimal::ZERO,
            payroll_tax: Decimal::ZERO,
            surcharge: Decimal::ZERO,
            premiums: Decimal::ZERO,
            net_income: net,
            modified_income: Decimal::ZERO,
            lagged_modified_income: Decimal::ZERO,
            surcharge_tier: 0,
            surcharge_tier_label: None,
            surcharge_status: SurchargeStatus::Safe,
            surcharge_reduction_needed: None,
            surcharge_headroom: None,
            investment_return: Decimal::ZERO,
            taxable_balance: balance,
            tax_deferred_balance: Decimal::ZERO,
            tax_free_balance: Decimal::ZERO,
            total_balance: balance,
        }
    }

    #[test]
    fn test_summary_uses_retirement_years() {
        let mut result = ProjectionResult::new("test", dec!(2000), 2);
        result.add_row(row(2026, dec!(150000), dec!(900000)));
        result.add_row(row(2027, dec!(80000), dec!(880000)));
        result.add_row(row(2028, dec!(90000), dec!(850000)));
        result.retirement_year = Some(2027);

        let summary = result.summary();
        assert_eq!(summary.first_year_net_income, dec!(80000));
        assert_eq!(summary.average_net_income, dec!(85000));
        assert_eq!(summary.lifetime_income, dec!(320000));
        assert_eq!(summary.final_balance, dec!(850000));
        assert_eq!(summary.start_year, 2026);
        assert_eq!(summary.end_year, 2028);
    }

    #[test]
    fn test_surcharge_risk_flags_and_recommendations() {
        let mut result = ProjectionResult::new("test", dec!(2000), 2);

        let mut breach = row(2031, dec!(90000), dec!(500000));
        breach.surcharge = dec!(2643.60);
        breach.surcharge_status = SurchargeStatus::Breach;
        breach.surcharge_tier_label = Some("Tier 2".to_string());
        breach.surcharge_reduction_needed = Some(dec!(4000));
        result.add_row(breach);

        let mut small = row(2032, dec!(90000), dec!(500000));
        small.surcharge = dec!(1052.40);
        small.surcharge_status = SurchargeStatus::Breach;
        small.surcharge_tier_label = Some("Tier 1".to_string());
        small.surcharge_reduction_needed = Some(dec!(1500));
        result.add_row(small);

        let mut warning = row(2033, dec!(90000), dec!(500000));
        warning.surcharge_status = SurchargeStatus::Warning;
        warning.surcharge_headroom = Some(dec!(9000));
        result.add_row(warning);

        let risk = result.summary().surcharge_risk;
        assert_eq!(risk.breach_years, vec![2031, 2032]);
        assert_eq!(risk.warning_years, vec![2033]);
        assert_eq!(risk.total_surcharge, dec!(3696.00));
        assert_eq!(risk.high_risk_years.len(), 1);
        assert_eq!(risk.high_risk_years[0].year, 2031);
        assert!(risk.high_risk_years[0].recommendation.contains("2029"));
        assert!(risk.high_risk_years[0].recommendation.contains("$4000"));
        assert!(risk.flagged_years[2].recommendation.contains("$9000"));
    }
}
