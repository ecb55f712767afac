//! Annual tax and healthcare surcharge calculation
//!
//! Federal tax uses the bracket schedule and standard deduction for the
//! filing status. State tax is a flat rate with retirement income optionally
//! exempt. Local tax is a flat rate on wages. Payroll tax is per worker,
//! with the old-age portion capped at the wage base. The healthcare
//! surcharge is driven by modified income from two years earlier.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::TaxTables;
use crate::error::{PlannerError, PlannerResult};
use crate::household::FilingStatus;
use crate::types::{round_cents, Money, Rate};

/// State and local flat rates for where the household lives
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocalityTaxes {
    pub state_rate: Rate,
    /// Pension and tax-deferred withdrawals excluded from state income
    pub state_exempts_retirement_income: bool,
    /// Applied to wages only
    pub local_wage_rate: Rate,
}

impl Default for LocalityTaxes {
    fn default() -> Self {
        Self {
            state_rate: dec!(0.0307),
            state_exempts_retirement_income: true,
            local_wage_rate: dec!(0.01),
        }
    }
}

/// Classification thresholds for surcharge risk
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SurchargeRiskPolicy {
    /// Within this fraction below the first tier counts as a warning
    pub warning_margin: Rate,
    /// Breach years with an annual surcharge above this are high risk
    pub high_risk_threshold: Money,
}

impl Default for SurchargeRiskPolicy {
    fn default() -> Self {
        Self {
            warning_margin: dec!(0.10),
            high_risk_threshold: dec!(2000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurchargeStatus {
    Safe,
    Warning,
    Breach,
}

/// Surcharge outcome for one year
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurchargeAssessment {
    /// Modified income from two years earlier
    pub lagged_income: Money,
    /// 0 when below every tier
    pub tier: usize,
    pub tier_label: Option<String>,
    pub annual_surcharge: Money,
    pub status: SurchargeStatus,
    /// Income reduction needed to drop one tier (breach years)
    pub reduction_to_lower_tier: Option<Money>,
    /// Room left below the first tier (safe and warning years)
    pub headroom: Option<Money>,
}

impl SurchargeAssessment {
    fn not_covered(lagged_income: Money) -> Self {
        Self {
            lagged_income,
            tier: 0,
            tier_label: None,
            annual_surcharge: Decimal::ZERO,
            status: SurchargeStatus::Safe,
            reduction_to_lower_tier: None,
            headroom: None,
        }
    }
}

/// One year's income mix as seen by the tax rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxInputs {
    pub year: i32,
    pub filing_status: FilingStatus,
    /// Wages per working participant
    pub wages: Vec<Money>,
    /// Employee contributions excluded from federal and state wages
    pub pre_tax_contributions: Money,
    /// Pension annuity plus supplement
    pub pension_income: Money,
    pub government_benefit: Money,
    pub tax_deferred_withdrawals: Money,
    pub taxable_withdrawals: Money,
    pub tax_free_withdrawals: Money,
    pub lagged_modified_income: Money,
    /// Participants old enough for healthcare coverage
    pub covered_participants: u32,
}

impl TaxInputs {
    pub fn new(year: i32, filing_status: FilingStatus) -> Self {
        Self {
            year,
            filing_status,
            wages: Vec::new(),
            pre_tax_contributions: Decimal::ZERO,
            pension_income: Decimal::ZERO,
            government_benefit: Decimal::ZERO,
            tax_deferred_withdrawals: Decimal::ZERO,
            taxable_withdrawals: Decimal::ZERO,
            tax_free_withdrawals: Decimal::ZERO,
            lagged_modified_income: Decimal::ZERO,
            covered_participants: 0,
        }
    }

    pub fn total_wages(&self) -> Money {
        self.wages.iter().copied().sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub federal: Money,
    pub state: Money,
    pub local: Money,
    pub payroll: Money,
    pub surcharge: Money,
    pub adjusted_gross_income: Money,
    pub taxable_income: Money,
    pub taxable_government_benefit: Money,
    /// This year's modified income, feeds the surcharge two years later
    pub modified_income: Money,
    pub assessment: SurchargeAssessment,
}

impl TaxBreakdown {
    /// Taxes plus surcharge
    pub fn total(&self) -> Money {
        self.federal + self.state + self.local + self.payroll + self.surcharge
    }
}

pub struct TaxCalculator<'a> {
    tables: &'a TaxTables,
    locality: LocalityTaxes,
    risk: SurchargeRiskPolicy,
}

impl<'a> TaxCalculator<'a> {
    pub fn new(tables: &'a TaxTables, locality: LocalityTaxes, risk: SurchargeRiskPolicy) -> Self {
        Self {
            tables,
            locality,
            risk,
        }
    }

    /// Compute every tax and the surcharge for one year
    pub fn calculate(&self, inputs: &TaxInputs) -> PlannerResult<TaxBreakdown> {
        let year = inputs.year;
        let federal_schedule = self
            .tables
            .federal_for(year)
            .ok_or_else(|| PlannerError::missing_data("tax:federal", year))?;
        let payroll_schedule = self
            .tables
            .payroll_for(year)
            .ok_or_else(|| PlannerError::missing_data("tax:payroll", year))?;

        let wages = inputs.total_wages();
        let net_wages = (wages - inputs.pre_tax_contributions).max(Decimal::ZERO);
        let ordinary = net_wages + inputs.pension_income + inputs.tax_deferred_withdrawals;

        let taxable_government_benefit =
            self.taxable_benefit(inputs.filing_status, ordinary, inputs.government_benefit);
        let adjusted_gross_income = ordinary + taxable_government_benefit;

        let schedule = federal_schedule.for_status(inputs.filing_status);
        let taxable_income = (adjusted_gross_income - schedule.standard_deduction).max(Decimal::ZERO);
        let federal = schedule.tax_on(taxable_income);

        let state_base = if self.locality.state_exempts_retirement_income {
            net_wages
        } else {
            ordinary
        };
        let state = round_cents(state_base * self.locality.state_rate);
        let local = round_cents(wages * self.locality.local_wage_rate);

        let payroll = round_cents(
            inputs
                .wages
                .iter()
                .map(|&w| {
                    w.min(payroll_schedule.wage_base) * payroll_schedule.old_age_rate
                        + w * payroll_schedule.hospital_rate
                })
                .sum::<Decimal>(),
        );

        let assessment = self.assess_surcharge(
            year,
            inputs.filing_status,
            inputs.lagged_modified_income,
            inputs.covered_participants,
        )?;

        Ok(TaxBreakdown {
            federal,
            state,
            local,
            payroll,
            surcharge: assessment.annual_surcharge,
            adjusted_gross_income,
            taxable_income,
            taxable_government_benefit,
            modified_income: adjusted_gross_income,
            assessment,
        })
    }

    /// Taxable portion of the government benefit (provisional income rule)
    pub fn taxable_benefit(&self, status: FilingStatus, other_income: Money, benefit: Money) -> Money {
        if benefit <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let (base, adjusted_base) = self.tables.benefit_thresholds.for_status(status);
        let half = dec!(0.5);
        let provisional = other_income + benefit * half;

        let taxable = if provisional <= base {
            Decimal::ZERO
        } else if provisional <= adjusted_base {
            ((provisional - base) * half).min(benefit * half)
        } else {
            let first_tier = ((adjusted_base - base) * half).min(benefit * half);
            (dec!(0.85) * (provisional - adjusted_base) + first_tier).min(dec!(0.85) * benefit)
        };
        round_cents(taxable)
    }

    /// Tier, dollar surcharge and risk status from lagged modified income
    pub fn assess_surcharge(
        &self,
        year: i32,
        status: FilingStatus,
        lagged_income: Money,
        covered_participants: u32,
    ) -> PlannerResult<SurchargeAssessment> {
        if covered_participants == 0 {
            return Ok(SurchargeAssessment::not_covered(lagged_income));
        }
        let schedule = self
            .tables
            .surcharge_for(year)
            .ok_or_else(|| PlannerError::missing_data("tax:surcharge", year))?;
        let tiers = schedule.tiers(status);
        let Some(first) = tiers.first() else {
            return Ok(SurchargeAssessment::not_covered(lagged_income));
        };

        let tier = tiers.iter().filter(|t| lagged_income > t.threshold).count();
        if tier == 0 {
            let headroom = first.threshold - lagged_income;
            let warning_floor = first.threshold * (Decimal::ONE - self.risk.warning_margin);
            let status = if lagged_income >= warning_floor {
                SurchargeStatus::Warning
            } else {
                SurchargeStatus::Safe
            };
            return Ok(SurchargeAssessment {
                lagged_income,
                tier: 0,
                tier_label: None,
                annual_surcharge: Decimal::ZERO,
                status,
                reduction_to_lower_tier: None,
                headroom: Some(headroom),
            });
        }

        let current = &tiers[tier - 1];
        Ok(SurchargeAssessment {
            lagged_income,
            tier,
            tier_label: Some(current.label.clone()),
            annual_surcharge: round_cents(current.annual_surcharge * Decimal::from(covered_participants)),
            status: SurchargeStatus::Breach,
            reduction_to_lower_tier: Some(lagged_income - current.threshold),
            headroom: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator(tables: &TaxTables) -> TaxCalculator<'_> {
        TaxCalculator::new(tables, LocalityTaxes::default(), SurchargeRiskPolicy::default())
    }

    #[test]
    fn test_wage_year() {
        let tables = TaxTables::default();
        let calc = calculator(&tables);

        let mut inputs = TaxInputs::new(2025, FilingStatus::Single);
        inputs.wages = vec![dec!(200000)];
        inputs.pre_tax_contributions = dec!(10000);

        let tax = calc.calculate(&inputs).unwrap();
        assert_eq!(tax.adjusted_gross_income, dec!(190000));
        assert_eq!(tax.taxable_income, dec!(175000));
        // 5578.50 + 22% x 54875 + 24% x 71650 (2025 single)
        assert_eq!(tax.federal, dec!(34847.00));
        // Payroll: 176100 x 6.2% + 200000 x 1.45%
        assert_eq!(tax.payroll, dec!(13818.20));
        assert_eq!(tax.state, dec!(5833.00));
        assert_eq!(tax.local, dec!(2000.00));
        assert_eq!(tax.surcharge, dec!(0));
    }

    #[test]
    fn test_retirement_income_is_state_exempt_and_payroll_free() {
        let tables = TaxTables::default();
        let calc = calculator(&tables);

        let mut inputs = TaxInputs::new(2025, FilingStatus::MarriedJoint);
        inputs.pension_income = dec!(40000);
        inputs.tax_deferred_withdrawals = dec!(30000);
        inputs.tax_free_withdrawals = dec!(20000);
        inputs.taxable_withdrawals = dec!(5000);

        let tax = calc.calculate(&inputs).unwrap();
        assert_eq!(tax.adjusted_gross_income, dec!(70000));
        assert_eq!(tax.state, dec!(0));
        assert_eq!(tax.local, dec!(0));
        assert_eq!(tax.payroll, dec!(0));

        let taxing = TaxCalculator::new(
            &tables,
            LocalityTaxes {
                state_exempts_retirement_income: false,
                ..LocalityTaxes::default()
            },
            SurchargeRiskPolicy::default(),
        );
        assert_eq!(taxing.calculate(&inputs).unwrap().state, dec!(2149.00));
    }

    #[test]
    fn test_taxable_government_benefit_tiers() {
        let tables = TaxTables::default();
        let calc = calculator(&tables);
        let status = FilingStatus::Single;

        // Provisional 20000: nothing taxable
        assert_eq!(calc.taxable_benefit(status, dec!(10000), dec!(20000)), dec!(0));
        // Provisional 30000: half of the excess over 25000
        assert_eq!(calc.taxable_benefit(status, dec!(20000), dec!(20000)), dec!(2500.00));
        // Provisional 60000: 0.85 x 26000 + 4500 = 26600, capped at 85% of benefit
        assert_eq!(calc.taxable_benefit(status, dec!(50000), dec!(20000)), dec!(17000.00));
    }

    #[test]
    fn test_surcharge_classification() {
        let tables = TaxTables::default();
        let calc = calculator(&tables);
        let status = FilingStatus::MarriedJoint;

        let safe = calc.assess_surcharge(2025, status, dec!(150000), 2).unwrap();
        assert_eq!(safe.status, SurchargeStatus::Safe);
        assert_eq!(safe.headroom, Some(dec!(62000)));

        let warning = calc.assess_surcharge(2025, status, dec!(200000), 2).unwrap();
        assert_eq!(warning.status, SurchargeStatus::Warning);
        assert_eq!(warning.annual_surcharge, dec!(0));

        // Exactly on the threshold is not above it
        let edge = calc.assess_surcharge(2025, status, dec!(212000), 2).unwrap();
        assert_eq!(edge.tier, 0);

        let breach = calc.assess_surcharge(2025, status, dec!(270000), 2).unwrap();
        assert_eq!(breach.status, SurchargeStatus::Breach);
        assert_eq!(breach.tier, 2);
        assert_eq!(breach.tier_label.as_deref(), Some("Tier 2"));
        assert_eq!(breach.annual_surcharge, dec!(5287.20));
        assert_eq!(breach.reduction_to_lower_tier, Some(dec!(4000)));

        let uncovered = calc.assess_surcharge(2025, status, dec!(900000), 0).unwrap();
        assert_eq!(uncovered.annual_surcharge, dec!(0));
        assert_eq!(uncovered.status, SurchargeStatus::Safe);
    }

    #[test]
    fn test_total_includes_surcharge() {
        let tables = TaxTables::default();
        let calc = calculator(&tables);

        let mut inputs = TaxInputs::new(2025, FilingStatus::Single);
        inputs.pension_income = dec!(60000);
        inputs.lagged_modified_income = dec!(140000);
        inputs.covered_participants = 1;

        let tax = calc.calculate(&inputs).unwrap();
        assert_eq!(tax.surcharge, dec!(2643.60));
        assert_eq!(
            tax.total(),
            tax.federal + tax.state + tax.local + tax.payroll + dec!(2643.60)
        );
    }
}
