//! Core projection engine for annual household cash flows

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Datelike;
use log::{debug, info};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::cashflows::{AnnualCashFlow, ProjectionResult};
use super::state::{ParticipantState, ProjectionState, RmdStatus};
use crate::assumptions::Assumptions;
use crate::benefits::{GovernmentBenefitCalculator, PensionCalculator};
use crate::error::{PlannerError, PlannerResult};
use crate::household::FilingStatus;
use crate::scenario::Scenario;
use crate::tax::{LocalityTaxes, SurchargeRiskPolicy, TaxBreakdown, TaxCalculator, TaxInputs};
use crate::types::{compound, round_cents, Money, Rate};
use crate::withdrawal::{WithdrawalEngine, WithdrawalOutcome, WithdrawalStrategy};

/// Configuration for a projection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// First projected calendar year
    pub start_year: i32,

    /// Last projected calendar year (inclusive)
    pub end_year: i32,

    /// Deterministic annual portfolio return
    pub investment_return: Rate,

    /// Deterministic annual inflation, also the COLA reference index
    pub inflation: Rate,

    pub locality: LocalityTaxes,

    pub surcharge_risk: SurchargeRiskPolicy,

    /// Years between the income year and the surcharge year
    pub surcharge_lag_years: u32,

    /// Modified income for years before `start_year`
    #[serde(default)]
    pub prior_modified_income: BTreeMap<i32, Money>,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            start_year: 2026,
            end_year: 2065,
            investment_return: dec!(0.05),
            inflation: dec!(0.025),
            locality: LocalityTaxes::default(),
            surcharge_risk: SurchargeRiskPolicy::default(),
            surcharge_lag_years: 2,
            prior_modified_income: BTreeMap::new(),
        }
    }
}

impl ProjectionConfig {
    pub fn horizon_years(&self) -> u32 {
        (self.end_year - self.start_year + 1).max(0) as u32
    }

    pub fn validate(&self) -> PlannerResult<()> {
        if self.end_year < self.start_year {
            return Err(PlannerError::config(
                "projection.end_year",
                format!("{} is before start year {}", self.end_year, self.start_year),
            ));
        }
        if self.investment_return <= -Decimal::ONE {
            return Err(PlannerError::config("projection.investment_return", "must exceed -100%"));
        }
        Ok(())
    }
}

/// Where each year's return and inflation come from
#[derive(Debug, Clone, Copy)]
pub enum GrowthSource<'a> {
    /// Config's fixed return and inflation every year
    Deterministic,
    /// One entry per projected year
    Path {
        returns: &'a [Rate],
        inflation: &'a [Rate],
    },
}

impl GrowthSource<'_> {
    fn year(&self, idx: usize, year: i32, config: &ProjectionConfig) -> PlannerResult<(Rate, Rate)> {
        match self {
            GrowthSource::Deterministic => Ok((config.investment_return, config.inflation)),
            GrowthSource::Path { returns, inflation } => {
                let r = returns
                    .get(idx)
                    .ok_or_else(|| PlannerError::missing_data("path:returns", year))?;
                let i = inflation
                    .get(idx)
                    .ok_or_else(|| PlannerError::missing_data("path:inflation", year))?;
                Ok((*r, *i))
            }
        }
    }
}

/// Income that does not depend on this year's withdrawal
struct YearIncome {
    wages: Vec<Money>,
    employee_contributions: Vec<Money>,
    employer_contributions: Vec<Money>,
    pension: Money,
    supplement: Money,
    government_benefit: Money,
    covered: u32,
    premiums: Money,
    lagged_modified_income: Money,
}

impl YearIncome {
    fn take_home_wages(&self) -> Money {
        self.wages.iter().copied().sum::<Decimal>() - self.employee_contributions.iter().copied().sum::<Decimal>()
    }

    fn gross(&self, withdrawal: &WithdrawalOutcome) -> Money {
        self.take_home_wages() + self.pension + self.supplement + self.government_benefit + withdrawal.realized()
    }
}

/// Main projection engine
pub struct ProjectionEngine {
    assumptions: Arc<Assumptions>,
    config: ProjectionConfig,
}

impl ProjectionEngine {
    /// Create a new projection engine with given assumptions and config
    pub fn new(assumptions: Arc<Assumptions>, config: ProjectionConfig) -> Self {
        Self { assumptions, config }
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    pub fn assumptions(&self) -> &Assumptions {
        &self.assumptions
    }

    /// Run a deterministic projection
    pub fn project(&self, scenario: &Scenario) -> PlannerResult<ProjectionResult> {
        self.project_with_growth(scenario, GrowthSource::Deterministic)
    }

    /// Run a projection with returns and inflation from `growth`
    pub fn project_with_growth(&self, scenario: &Scenario, growth: GrowthSource<'_>) -> PlannerResult<ProjectionResult> {
        self.config.validate()?;
        scenario.validate()?;

        let household = &scenario.household;
        let rules = &self.assumptions.benefits;
        let pension_calc = PensionCalculator::new(&rules.pension, &rules.cola);
        let benefit_calc = GovernmentBenefitCalculator::new(&rules.government);

        let mut participants = Vec::with_capacity(household.participants.len());
        for (participant, election) in household.participants.iter().zip(&scenario.elections) {
            let claim = benefit_calc.schedule(participant, election.benefit_claim_age)?;
            let years_to_retirement =
                (election.retirement_date.year() - self.config.start_year).max(0) as u32;
            let high3 = round_cents(participant.high3_salary * compound(participant.salary_growth, years_to_retirement));
            let award = pension_calc.award(
                participant,
                election.retirement_date,
                election.survivor_election,
                high3,
                benefit_calc.annual_at_earliest(participant),
            );
            let onset = self.assumptions.rmd.onset_age(participant.birth_year());
            participants.push(ParticipantState::new(election, award, claim, onset));
        }

        let mut state = ProjectionState::from_household(household, participants, self.config.start_year);
        let mut result = ProjectionResult::new(
            scenario.name.clone(),
            self.config.surcharge_risk.high_risk_threshold,
            self.config.surcharge_lag_years,
        );

        debug!(
            "Projecting '{}' {}-{} ({} participants)",
            scenario.name,
            self.config.start_year,
            self.config.end_year,
            household.participants.len()
        );

        for (idx, year) in (self.config.start_year..=self.config.end_year).enumerate() {
            let (investment_return, inflation) = growth.year(idx, year, &self.config)?;
            self.advance_year(scenario, &mut state, year, inflation, &pension_calc);

            // Stop once nobody is left
            if !state.any_alive() {
                break;
            }

            let row = self.calculate_year(scenario, &mut state, investment_return, inflation, &pension_calc)?;
            result.add_row(row);
        }

        result.retirement_year = state.first_withdrawal_year;
        result.depletion_year = state.depletion_year;

        debug!(
            "Projection '{}' finished: {} years, final balance {}",
            scenario.name,
            result.cashflows.len(),
            result.final_balance()
        );
        Ok(result)
    }

    /// Move every state machine across the year boundary
    fn advance_year(
        &self,
        scenario: &Scenario,
        state: &mut ProjectionState,
        year: i32,
        inflation: Rate,
        pension_calc: &PensionCalculator<'_>,
    ) {
        let first_year = year == self.config.start_year;
        state.year = year;
        if !first_year {
            state.price_index *= Decimal::ONE + inflation;
        }

        let benefit_cola = inflation.max(Decimal::ZERO);
        for ((ps, participant), election) in state
            .participants
            .iter_mut()
            .zip(&scenario.household.participants)
            .zip(&scenario.elections)
        {
            let pension_cola = pension_calc.cola(inflation, participant.age_in(year));
            ps.advance_year(participant, election, year, self.config.start_year, pension_cola, benefit_cola);
        }

        state.apply_deaths(&scenario.household, first_year);

        if !state.withdrawals_active && state.all_alive_retired() {
            state.withdrawals_active = true;
            state.first_withdrawal_year = Some(year);
            debug!("'{}': withdrawals start in {year}", scenario.name);
        }
    }

    /// Calculate cash flows for a single year
    fn calculate_year(
        &self,
        scenario: &Scenario,
        state: &mut ProjectionState,
        investment_return: Rate,
        inflation: Rate,
        pension_calc: &PensionCalculator<'_>,
    ) -> PlannerResult<AnnualCashFlow> {
        let year = state.year;
        let household = &scenario.household;
        let tax_calc = TaxCalculator::new(&self.assumptions.tax, self.config.locality, self.config.surcharge_risk);
        let withdrawal_engine = WithdrawalEngine::new(&self.assumptions.rmd);

        let income = self.year_income(scenario, state, pension_calc)?;

        // Required minimums per deferred account
        let owners: Vec<Option<(u32, i32)>> = state
            .participants
            .iter()
            .zip(&household.participants)
            .map(|(ps, p)| {
                (ps.is_alive() && ps.status.rmd == RmdStatus::Active).then(|| (ps.status.age, p.birth_year()))
            })
            .collect();
        let minimums = withdrawal_engine.required_minimums(&state.balances, &owners);

        let order = scenario.withdrawal.source_order;
        let start_balance = state.balances.total();

        let requested = if !state.withdrawals_active {
            Decimal::ZERO
        } else if let WithdrawalStrategy::TargetIncome { monthly_net } = &scenario.withdrawal.strategy {
            let target = round_cents(*monthly_net * Decimal::from(12) * state.price_index);
            let balances = &state.balances;
            let need = withdrawal_engine.solve_need(target, start_balance, |w| {
                let mut trial = balances.clone();
                let outcome = withdrawal_engine.withdraw(&mut trial, w, &minimums, order)?;
                let taxes = self.taxes(&tax_calc, year, state.filing_status, &income, &outcome)?;
                Ok(income.gross(&outcome) - taxes.total() - income.premiums)
            })?;
            state.strategy.record(start_balance, need);
            need
        } else {
            state
                .strategy
                .next_amount(&scenario.withdrawal.strategy, start_balance, inflation)
        };

        let withdrawal = withdrawal_engine.withdraw(&mut state.balances, requested, &minimums, order)?;
        let taxes = self.taxes(&tax_calc, year, state.filing_status, &income, &withdrawal)?;
        state.modified_income.insert(year, taxes.modified_income);

        if state.withdrawals_active
            && state.depletion_year.is_none()
            && requested > Decimal::ZERO
            && (withdrawal.unmet > Decimal::ZERO || state.balances.total() <= Decimal::ZERO)
        {
            state.depletion_year = Some(year);
            info!("'{}': savings depleted in {year}", scenario.name);
        }

        // Contributions land after withdrawals, before growth
        for (idx, (employee, employer)) in income
            .employee_contributions
            .iter()
            .zip(&income.employer_contributions)
            .enumerate()
        {
            if let Some(balance) = state.balances.tax_deferred.get_mut(idx) {
                *balance += *employee + *employer;
            }
        }
        let growth = state.balances.apply_growth(investment_return)?;
        state.balances.check_non_negative()?;

        let gross_income = income.gross(&withdrawal);
        let net_income = gross_income
            - (taxes.federal + taxes.state + taxes.local + taxes.payroll + taxes.surcharge + income.premiums);

        Ok(AnnualCashFlow {
            year,
            participants: state.participants.iter().map(|p| p.status).collect(),
            wages: income.wages.iter().copied().sum(),
            employee_contributions: income.employee_contributions.iter().copied().sum(),
            employer_contributions: income.employer_contributions.iter().copied().sum(),
            pension_income: income.pension,
            annuity_supplement: income.supplement,
            government_benefit: income.government_benefit,
            withdrawal_requested: requested,
            required_minimum: withdrawal.required_minimum,
            withdrawal_taxable: withdrawal.taxable,
            withdrawal_tax_deferred: withdrawal.tax_deferred,
            withdrawal_tax_free: withdrawal.tax_free,
            unmet_withdrawal: withdrawal.unmet,
            gross_income,
            federal_tax: taxes.federal,
            state_tax: taxes.state,
            local_tax: taxes.local,
            payroll_tax: taxes.payroll,
            surcharge: taxes.surcharge,
            premiums: income.premiums,
            net_income,
            modified_income: taxes.modified_income,
            lagged_modified_income: income.lagged_modified_income,
            surcharge_tier: taxes.assessment.tier,
            surcharge_tier_label: taxes.assessment.tier_label.clone(),
            surcharge_status: taxes.assessment.status,
            surcharge_reduction_needed: taxes.assessment.reduction_to_lower_tier,
            surcharge_headroom: taxes.assessment.headroom,
            investment_return: growth,
            taxable_balance: state.balances.taxable,
            tax_deferred_balance: state.balances.tax_deferred_total(),
            tax_free_balance: state.balances.tax_free_total(),
            total_balance: state.balances.total(),
        })
    }

    fn year_income(
        &self,
        scenario: &Scenario,
        state: &ProjectionState,
        pension_calc: &PensionCalculator<'_>,
    ) -> PlannerResult<YearIncome> {
        let year = state.year;
        let household = &scenario.household;
        let surcharge_schedule = self
            .assumptions
            .tax
            .surcharge_for(year)
            .ok_or_else(|| PlannerError::missing_data("tax:surcharge", year))?;

        let mut income = YearIncome {
            wages: Vec::with_capacity(state.participants.len()),
            employee_contributions: Vec::with_capacity(state.participants.len()),
            employer_contributions: Vec::with_capacity(state.participants.len()),
            pension: Decimal::ZERO,
            supplement: Decimal::ZERO,
            government_benefit: Decimal::ZERO,
            covered: 0,
            premiums: Decimal::ZERO,
            lagged_modified_income: self.lagged_modified_income(state, year),
        };

        for (idx, (ps, participant)) in state.participants.iter().zip(&household.participants).enumerate() {
            let wages = round_cents(ps.salary * Decimal::from(ps.worked_months) / Decimal::from(12));
            income.wages.push(wages);
            income
                .employee_contributions
                .push(round_cents(wages * participant.contribution_rate));
            income
                .employer_contributions
                .push(round_cents(wages * participant.employer_match_rate));

            if !ps.is_alive() {
                continue;
            }

            income.pension += ps.pension_income(year);
            income.supplement += ps.supplement_income(year, pension_calc.supplement_end_age());

            // A survivor draws the larger of their own and the deceased's benefit,
            // plus any elected survivor annuity
            let spouse = state
                .participants
                .iter()
                .enumerate()
                .find(|(i, other)| *i != idx && !other.is_alive())
                .map(|(_, other)| other);
            let own = ps.own_government_benefit(year);
            income.government_benefit += match spouse {
                Some(deceased) => own.max(deceased.benefit_in_payment(year)),
                None => own,
            };
            if let Some(deceased) = spouse {
                if deceased.pension.is_some() && deceased.retirement_year < year {
                    income.pension += deceased.survivor_annuity;
                }
            }

            if ps.status.age >= surcharge_schedule.coverage_age {
                income.covered += 1;
            }
        }

        income.premiums = round_cents(
            surcharge_schedule.base_premium * Decimal::from(income.covered)
                + household.annual_health_premium * state.price_index,
        );
        Ok(income)
    }

    fn lagged_modified_income(&self, state: &ProjectionState, year: i32) -> Money {
        let lag_year = year - self.config.surcharge_lag_years as i32;
        state
            .modified_income
            .get(&lag_year)
            .or_else(|| self.config.prior_modified_income.get(&lag_year))
            .copied()
            .unwrap_or_default()
    }

    fn taxes(
        &self,
        calc: &TaxCalculator<'_>,
        year: i32,
        filing_status: FilingStatus,
        income: &YearIncome,
        withdrawal: &WithdrawalOutcome,
    ) -> PlannerResult<TaxBreakdown> {
        let mut inputs = TaxInputs::new(year, filing_status);
        inputs.wages = income.wages.clone();
        inputs.pre_tax_contributions = income.employee_contributions.iter().copied().sum();
        inputs.pension_income = income.pension + income.supplement;
        inputs.government_benefit = income.government_benefit;
        inputs.tax_deferred_withdrawals = withdrawal.tax_deferred;
        inputs.taxable_withdrawals = withdrawal.taxable;
        inputs.tax_free_withdrawals = withdrawal.tax_free;
        inputs.lagged_modified_income = income.lagged_modified_income;
        inputs.covered_participants = income.covered;
        calc.calculate(&inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benefits::{ClaimAge, SurvivorElection};
    use crate::household::{Household, Participant};
    use crate::projection::state::{LifeStatus, RmdStatus};
    use crate::scenario::ParticipantElection;
    use crate::withdrawal::WithdrawalPlan;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn engine(config: ProjectionConfig) -> ProjectionEngine {
        ProjectionEngine::new(Arc::new(Assumptions::default_us()), config)
    }

    /// Retiree with only a taxable account, already retired at the start
    fn retiree(balance: Money, strategy: WithdrawalStrategy) -> Scenario {
        let participant = Participant::new("Sam", ymd(1960, 5, 5));
        let mut household = Household::single(participant);
        household.taxable_balance = balance;
        Scenario::new(
            "retiree",
            household,
            vec![ParticipantElection {
                retirement_date: ymd(2025, 6, 30),
                benefit_claim_age: ClaimAge::years(67),
                survivor_election: SurvivorElection::None,
            }],
            WithdrawalPlan {
                strategy,
                ..WithdrawalPlan::default()
            },
        )
    }

    #[test]
    fn test_net_income_identity_every_year() {
        let scenario = Scenario::demo().unwrap();
        let result = engine(ProjectionConfig::default()).project(&scenario).unwrap();
        assert_eq!(result.cashflows.len(), 40);

        for row in &result.cashflows {
            let deductions = row.federal_tax
                + row.state_tax
                + row.local_tax
                + row.payroll_tax
                + row.surcharge
                + row.premiums;
            assert_eq!(row.net_income, row.gross_income - deductions, "year {}", row.year);
            assert!(row.total_balance >= Decimal::ZERO);
        }
        assert_eq!(result.retirement_year, Some(2031));
    }

    #[test]
    fn test_required_minimum_always_withdrawn() {
        let scenario = Scenario::demo().unwrap();
        let result = engine(ProjectionConfig::default()).project(&scenario).unwrap();

        let rmd_rows: Vec<_> = result
            .cashflows
            .iter()
            .filter(|r| r.participants.iter().any(|p| p.rmd == RmdStatus::Active))
            .collect();
        assert!(!rmd_rows.is_empty());
        for row in rmd_rows {
            assert!(row.required_minimum > Decimal::ZERO);
            assert!(row.withdrawal_tax_deferred >= row.required_minimum, "year {}", row.year);
        }
    }

    #[test]
    fn test_pension_cola_waits_for_eligible_age() {
        let mut p = Participant::new("Lee", ymd(1970, 1, 15));
        p.hire_date = Some(ymd(1995, 1, 1));
        p.has_pension = true;
        p.high3_salary = dec!(100000);
        let scenario = Scenario::new(
            "early pension",
            Household::single(p),
            vec![ParticipantElection {
                retirement_date: ymd(2026, 12, 31),
                benefit_claim_age: ClaimAge::years(67),
                survivor_election: SurvivorElection::None,
            }],
            WithdrawalPlan {
                strategy: WithdrawalStrategy::None,
                ..WithdrawalPlan::default()
            },
        );
        let config = ProjectionConfig {
            end_year: 2034,
            ..ProjectionConfig::default()
        };
        let result = engine(config).project(&scenario).unwrap();
        let pension = |year: i32| {
            result
                .cashflows
                .iter()
                .find(|r| r.year == year)
                .map(|r| r.pension_income)
                .unwrap()
        };

        assert_eq!(pension(2026), Decimal::ZERO);
        assert!(pension(2027) > Decimal::ZERO);
        // Age 57 through 61: flat
        assert_eq!(pension(2027), pension(2031));
        // Age 62: 2.5% index falls in the middle band, capped at 2%
        assert_eq!(pension(2032), round_cents(pension(2031) * dec!(1.02)));
    }

    #[test]
    fn test_depletion_year_and_clipping() {
        let scenario = retiree(dec!(100000), WithdrawalStrategy::FixedAmount { annual: dec!(30000) });
        let config = ProjectionConfig {
            end_year: 2032,
            investment_return: Decimal::ZERO,
            inflation: Decimal::ZERO,
            ..ProjectionConfig::default()
        };
        let result = engine(config).project(&scenario).unwrap();

        assert_eq!(result.depletion_year, Some(2029));
        let row = &result.cashflows[3];
        assert_eq!(row.year, 2029);
        assert_eq!(row.total_withdrawals(), dec!(10000));
        assert_eq!(row.unmet_withdrawal, dec!(20000));
        for later in &result.cashflows[4..] {
            assert_eq!(later.total_withdrawals(), Decimal::ZERO);
            assert_eq!(later.total_balance, Decimal::ZERO);
        }
    }

    #[test]
    fn test_survivor_keeps_larger_benefit_and_annuity() {
        let mut scenario = Scenario::demo().unwrap();
        scenario.household.participants[0].death_year = Some(2040);
        let result = engine(ProjectionConfig::default()).project(&scenario).unwrap();

        let before = result.cashflows.iter().find(|r| r.year == 2040).unwrap();
        let after = result.cashflows.iter().find(|r| r.year == 2041).unwrap();
        assert_eq!(after.participants[0].life, LifeStatus::Deceased);
        assert_eq!(after.participants[1].life, LifeStatus::Alive);
        // Survivor annuity continues, at a reduced level
        assert!(after.pension_income > Decimal::ZERO);
        assert!(after.pension_income < before.pension_income);
        assert_eq!(after.tax_deferred_balance + after.tax_free_balance + after.taxable_balance, after.total_balance);
    }

    #[test]
    fn test_short_growth_path_is_data_error() {
        let scenario = retiree(dec!(100000), WithdrawalStrategy::FixedAmount { annual: dec!(1000) });
        let returns = vec![dec!(0.05); 3];
        let inflation = vec![dec!(0.02); 3];
        let err = engine(ProjectionConfig::default())
            .project_with_growth(
                &scenario,
                GrowthSource::Path {
                    returns: &returns,
                    inflation: &inflation,
                },
            )
            .unwrap_err();
        assert!(matches!(err, PlannerError::Data { year: 2029, .. }));
    }

    #[test]
    fn test_target_income_reaches_target() {
        let scenario = retiree(
            dec!(2000000),
            WithdrawalStrategy::TargetIncome {
                monthly_net: dec!(5000),
            },
        );
        let config = ProjectionConfig {
            end_year: 2028,
            inflation: Decimal::ZERO,
            ..ProjectionConfig::default()
        };
        let result = engine(config).project(&scenario).unwrap();
        for row in &result.cashflows {
            assert!((row.net_income - dec!(60000)).abs() <= dec!(1), "year {}", row.year);
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn test_balances_never_negative(
            annual in 0u32..200_000,
            return_pct in -40i32..40,
        ) {
            let scenario = retiree(dec!(500000), WithdrawalStrategy::FixedAmount { annual: Decimal::from(annual) });
            let config = ProjectionConfig { end_year: 2045, ..ProjectionConfig::default() };
            let years = config.horizon_years() as usize;
            let returns = vec![Decimal::new(return_pct as i64, 2); years];
            let inflation = vec![dec!(0.03); years];
            let result = engine(config)
                .project_with_growth(&scenario, GrowthSource::Path { returns: &returns, inflation: &inflation })
                .unwrap();
            for row in &result.cashflows {
                prop_assert!(row.taxable_balance >= Decimal::ZERO);
                prop_assert!(row.total_balance >= Decimal::ZERO);
                prop_assert!(row.unmet_withdrawal >= Decimal::ZERO);
            }
        }
    }
}
