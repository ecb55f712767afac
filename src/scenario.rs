//! Scenarios and the runner that projects them
//!
//! A `Scenario` is the caller's choice set for one household. The runner
//! loads assumptions once, then projects, simulates or solves as many
//! scenarios as needed against them.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::Assumptions;
use crate::benefits::{ClaimAge, SurvivorElection};
use crate::error::{PlannerError, PlannerResult};
use crate::household::{sample, Household};
use crate::projection::{ProjectionConfig, ProjectionEngine, ProjectionResult, ScenarioSummary};
use crate::simulation::{CancellationToken, MonteCarloSimulator, SimulationParams, SimulationResult};
use crate::solver::{BreakEvenSolver, SolverConfig, SolverResult};
use crate::withdrawal::{SourceOrder, WithdrawalPlan, WithdrawalStrategy};

/// One participant's elections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantElection {
    /// Last day of employment
    pub retirement_date: NaiveDate,

    pub benefit_claim_age: ClaimAge,

    #[serde(default)]
    pub survivor_election: SurvivorElection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub household: Household,
    /// One per participant, in household order
    pub elections: Vec<ParticipantElection>,
    #[serde(default)]
    pub withdrawal: WithdrawalPlan,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        household: Household,
        elections: Vec<ParticipantElection>,
        withdrawal: WithdrawalPlan,
    ) -> Self {
        Self {
            name: name.into(),
            household,
            elections,
            withdrawal,
        }
    }

    /// Demo household retiring at 62, drawing 4% inflation-indexed
    pub fn demo() -> PlannerResult<Self> {
        Ok(Self::new(
            "Demo: retire at 62",
            sample::demo_household()?,
            vec![
                ParticipantElection {
                    retirement_date: sample::ymd(2028, 12, 31)?,
                    benefit_claim_age: ClaimAge::years(67),
                    survivor_election: SurvivorElection::Full,
                },
                ParticipantElection {
                    retirement_date: sample::ymd(2030, 6, 30)?,
                    benefit_claim_age: ClaimAge::years(67),
                    survivor_election: SurvivorElection::None,
                },
            ],
            WithdrawalPlan {
                strategy: WithdrawalStrategy::InflationIndexed {
                    initial_rate: dec!(0.04),
                },
                source_order: SourceOrder::TaxFreeFirst,
            },
        ))
    }

    pub fn validate(&self) -> PlannerResult<()> {
        self.household.validate()?;
        if self.elections.len() != self.household.participants.len() {
            return Err(PlannerError::config(
                "elections",
                format!(
                    "{} elections for {} participants",
                    self.elections.len(),
                    self.household.participants.len()
                ),
            ));
        }
        for (idx, (election, participant)) in self.elections.iter().zip(&self.household.participants).enumerate() {
            if election.retirement_date <= participant.birth_date {
                return Err(PlannerError::config(
                    format!("elections[{idx}].retirement_date"),
                    "must be after the birth date",
                ));
            }
            if election.benefit_claim_age.months >= 12 {
                return Err(PlannerError::config(
                    format!("elections[{idx}].benefit_claim_age.months"),
                    "must be below 12",
                ));
            }
        }
        self.withdrawal.strategy.validate()
    }

    /// Copy with a different withdrawal strategy
    pub fn with_strategy(&self, strategy: WithdrawalStrategy) -> Self {
        let mut scenario = self.clone();
        scenario.withdrawal.strategy = strategy;
        scenario
    }
}

/// Pre-loaded runner for batch projections
///
/// # Example
/// ```ignore
/// let runner = ScenarioRunner::new();
/// let scenario = Scenario::demo()?;
/// for rate in [dec!(0.03), dec!(0.04), dec!(0.05)] {
///     let s = scenario.with_strategy(scenario.withdrawal.strategy.with_rate(rate)?);
///     let result = runner.run(&s, ProjectionConfig::default())?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    assumptions: Arc<Assumptions>,
}

impl ScenarioRunner {
    /// Runner over the built-in US assumptions
    pub fn new() -> Self {
        Self {
            assumptions: Arc::new(Assumptions::default_us()),
        }
    }

    /// Runner with historical data and RMD divisors read from `path`
    pub fn from_csv_path(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            assumptions: Arc::new(Assumptions::from_csv_path(path)?),
        })
    }

    pub fn with_assumptions(assumptions: Assumptions) -> Self {
        Self {
            assumptions: Arc::new(assumptions),
        }
    }

    fn engine(&self, config: ProjectionConfig) -> ProjectionEngine {
        ProjectionEngine::new(Arc::clone(&self.assumptions), config)
    }

    pub fn run(&self, scenario: &Scenario, config: ProjectionConfig) -> PlannerResult<ProjectionResult> {
        self.engine(config).project(scenario)
    }

    /// Project several scenarios under one config
    pub fn run_batch(&self, scenarios: &[Scenario], config: ProjectionConfig) -> PlannerResult<Vec<ProjectionResult>> {
        let engine = self.engine(config);
        scenarios.iter().map(|s| engine.project(s)).collect()
    }

    /// Summaries ranked by lifetime net income, highest first
    pub fn compare(&self, scenarios: &[Scenario], config: ProjectionConfig) -> PlannerResult<Vec<ScenarioSummary>> {
        let mut summaries: Vec<ScenarioSummary> = self
            .run_batch(scenarios, config)?
            .iter()
            .map(ProjectionResult::summary)
            .collect();
        summaries.sort_by(|a, b| {
            b.lifetime_income
                .cmp(&a.lifetime_income)
                .then_with(|| a.scenario_name.cmp(&b.scenario_name))
        });
        Ok(summaries)
    }

    pub fn simulate(&self, params: &SimulationParams) -> PlannerResult<SimulationResult> {
        MonteCarloSimulator::new(Arc::clone(&self.assumptions)).run(params, &CancellationToken::new())
    }

    pub fn solve(&self, scenario: &Scenario, config: ProjectionConfig, solver: &SolverConfig) -> PlannerResult<SolverResult> {
        BreakEvenSolver::new(self.engine(config), solver.clone()).solve(scenario)
    }

    pub fn assumptions(&self) -> &Assumptions {
        &self.assumptions
    }
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Order summaries by depletion: never-depleted first, then latest depletion
pub fn longevity_order(a: &ScenarioSummary, b: &ScenarioSummary) -> Ordering {
    match (a.depletion_year, b.depletion_year) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => y.cmp(&x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_scenario_is_valid() {
        let scenario = Scenario::demo().unwrap();
        scenario.validate().unwrap();
        assert_eq!(scenario.elections.len(), 2);
    }

    #[test]
    fn test_mismatched_elections_rejected() {
        let mut scenario = Scenario::demo().unwrap();
        scenario.elections.pop();
        let err = scenario.validate().unwrap_err();
        assert!(matches!(err, PlannerError::Configuration { .. }));
    }

    #[test]
    fn test_scenario_runner_batch() {
        let runner = ScenarioRunner::new();
        let scenario = Scenario::demo().unwrap();
        let scenarios: Vec<_> = [dec!(0.03), dec!(0.04), dec!(0.05)]
            .iter()
            .map(|&rate| {
                let mut s = scenario.with_strategy(scenario.withdrawal.strategy.with_rate(rate).unwrap());
                s.name = format!("{rate}");
                s
            })
            .collect();

        let results = runner.run_batch(&scenarios, ProjectionConfig::default()).unwrap();
        assert_eq!(results.len(), 3);

        // Drawing more leaves less behind
        assert!(results[2].final_balance() < results[0].final_balance());
        assert!(results[2].first_year_net_income() > results[0].first_year_net_income());
    }

    #[test]
    fn test_compare_ranks_by_lifetime_income() {
        let runner = ScenarioRunner::new();
        let scenario = Scenario::demo().unwrap();
        let mut none = scenario.with_strategy(WithdrawalStrategy::None);
        none.name = "no withdrawals".to_string();

        let ranked = runner
            .compare(&[none, scenario.clone()], ProjectionConfig::default())
            .unwrap();
        assert_eq!(ranked[0].scenario_name, scenario.name);
        assert!(ranked[0].lifetime_income >= ranked[1].lifetime_income);
    }

    #[test]
    fn test_run_does_not_mutate_scenario() {
        let runner = ScenarioRunner::new();
        let scenario = Scenario::demo().unwrap();
        let before = serde_json::to_string(&scenario).unwrap();
        runner.run(&scenario, ProjectionConfig::default()).unwrap();
        assert_eq!(serde_json::to_string(&scenario).unwrap(), before);
        assert!(!runner.assumptions().historical.is_empty());
    }

    #[test]
    fn test_longevity_order() {
        let runner = ScenarioRunner::new();
        let mut summaries = runner
            .compare(&[Scenario::demo().unwrap()], ProjectionConfig::default())
            .unwrap();
        let mut depleted = summaries[0].clone();
        depleted.depletion_year = Some(2050);
        summaries.insert(0, depleted);
        summaries.sort_by(longevity_order);
        assert_eq!(summaries[0].depletion_year, None);
    }
}
