//! Break-even solver for a single scenario parameter
//!
//! Finds the parameter value whose projected outcome hits a target,
//! assuming the outcome is monotonic in the parameter over the search
//! interval. Each probe is a full deterministic projection.

use log::{debug, info};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, PlannerResult};
use crate::projection::{ProjectionEngine, ProjectionResult, ScenarioSummary};
use crate::scenario::Scenario;
use crate::types::{round_cents, Money};
use crate::withdrawal::WithdrawalStrategy;

/// The scenario input being solved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveParameter {
    /// Rate of a rate-based withdrawal strategy
    WithdrawalRate,
    /// Monthly net income of a target-income strategy
    TargetMonthlyIncome,
}

/// The projected outcome compared against the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeMetric {
    FirstYearNetIncome,
    AverageNetIncome,
    FinalBalance,
}

impl OutcomeMetric {
    pub fn measure(&self, result: &ProjectionResult) -> Money {
        match self {
            OutcomeMetric::FirstYearNetIncome => result.first_year_net_income(),
            OutcomeMetric::AverageNetIncome => result.average_net_income(),
            OutcomeMetric::FinalBalance => result.final_balance(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolveMethod {
    #[default]
    Bisection,
    /// Secant steps inside the bracket, bisecting whenever a step leaves it
    Secant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub parameter: SolveParameter,
    pub metric: OutcomeMetric,
    /// Outcome to hit, in dollars
    pub target: Money,
    pub lower: Decimal,
    pub upper: Decimal,
    /// Acceptable |outcome - target| in dollars
    pub tolerance: Money,
    pub max_iterations: u32,
    #[serde(default)]
    pub method: SolveMethod,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            parameter: SolveParameter::WithdrawalRate,
            metric: OutcomeMetric::FirstYearNetIncome,
            target: dec!(100000),
            lower: Decimal::ZERO,
            upper: dec!(0.15),
            tolerance: dec!(1.00),
            max_iterations: 60,
            method: SolveMethod::Bisection,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> PlannerResult<()> {
        if self.lower >= self.upper {
            return Err(PlannerError::config(
                "solver.lower",
                format!("lower bound {} must be below upper bound {}", self.lower, self.upper),
            ));
        }
        if self.lower < Decimal::ZERO {
            return Err(PlannerError::config("solver.lower", "must not be negative"));
        }
        if self.tolerance <= Decimal::ZERO {
            return Err(PlannerError::config("solver.tolerance", "must be positive"));
        }
        if self.max_iterations == 0 {
            return Err(PlannerError::config("solver.max_iterations", "must be at least 1"));
        }
        Ok(())
    }
}

/// One probe of the search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverIteration {
    pub iteration: u32,
    pub value: Decimal,
    pub outcome: Money,
    /// outcome - target
    pub residual: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverResult {
    pub parameter: SolveParameter,
    pub metric: OutcomeMetric,
    pub target: Money,
    pub value: Decimal,
    pub outcome: Money,
    pub residual: Money,
    /// Probes after the two endpoints
    pub iterations: u32,
    pub history: Vec<SolverIteration>,
    /// Projection summary at the solved value
    pub summary: ScenarioSummary,
}

/// Outcome at one probe, keeping the projection for the final summary
struct Probe {
    value: Decimal,
    residual: Money,
    result: ProjectionResult,
}

pub struct BreakEvenSolver {
    engine: ProjectionEngine,
    config: SolverConfig,
}

impl BreakEvenSolver {
    pub fn new(engine: ProjectionEngine, config: SolverConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Scenario copy with the parameter set to `value`
    pub fn apply(&self, scenario: &Scenario, value: Decimal) -> PlannerResult<Scenario> {
        let strategy = match self.config.parameter {
            SolveParameter::WithdrawalRate => scenario.withdrawal.strategy.with_rate(value)?,
            SolveParameter::TargetMonthlyIncome => WithdrawalStrategy::TargetIncome {
                monthly_net: round_cents(value),
            },
        };
        Ok(scenario.with_strategy(strategy))
    }

    fn probe(&self, scenario: &Scenario, value: Decimal, history: &mut Vec<SolverIteration>) -> PlannerResult<Probe> {
        let result = self.engine.project(&self.apply(scenario, value)?)?;
        let outcome = self.config.metric.measure(&result);
        let residual = outcome - self.config.target;
        history.push(SolverIteration {
            iteration: history.len() as u32,
            value,
            outcome,
            residual,
        });
        debug!("solve probe {value}: outcome {outcome}, residual {residual}");
        Ok(Probe {
            value,
            residual,
            result,
        })
    }

    fn finish(&self, probe: Probe, history: Vec<SolverIteration>) -> SolverResult {
        let iterations = history.len().saturating_sub(2) as u32;
        info!(
            "Solved {:?} = {} after {} iterations (residual {})",
            self.config.parameter, probe.value, iterations, probe.residual
        );
        SolverResult {
            parameter: self.config.parameter,
            metric: self.config.metric,
            target: self.config.target,
            value: probe.value,
            outcome: probe.residual + self.config.target,
            residual: probe.residual,
            iterations,
            history,
            summary: probe.result.summary(),
        }
    }

    /// Find the parameter value that hits the target outcome
    pub fn solve(&self, scenario: &Scenario) -> PlannerResult<SolverResult> {
        self.config.validate()?;
        scenario.validate()?;
        let tolerance = self.config.tolerance;
        let mut history = Vec::new();

        let mut lo = self.probe(scenario, self.config.lower, &mut history)?;
        if lo.residual.abs() <= tolerance {
            return Ok(self.finish(lo, history));
        }
        let mut hi = self.probe(scenario, self.config.upper, &mut history)?;
        if hi.residual.abs() <= tolerance {
            return Ok(self.finish(hi, history));
        }
        if lo.residual.is_sign_negative() == hi.residual.is_sign_negative() {
            return Err(PlannerError::config(
                "solver.target",
                format!(
                    "target {} is not bracketed by [{}, {}] (outcomes {} and {})",
                    self.config.target,
                    lo.value,
                    hi.value,
                    lo.residual + self.config.target,
                    hi.residual + self.config.target
                ),
            ));
        }

        // Consecutive updates to the same end; secant stalls there
        let mut same_side = 0;
        let mut last_moved_lo = None;

        for _ in 0..self.config.max_iterations {
            let midpoint = ((lo.value + hi.value) / Decimal::TWO).round_dp(12);
            let candidate = match self.config.method {
                SolveMethod::Bisection => midpoint,
                SolveMethod::Secant if same_side >= 2 || hi.residual == lo.residual => midpoint,
                SolveMethod::Secant => {
                    let step = (hi.value - hi.residual * (hi.value - lo.value) / (hi.residual - lo.residual))
                        .round_dp(12);
                    if step > lo.value.min(hi.value) && step < lo.value.max(hi.value) {
                        step
                    } else {
                        midpoint
                    }
                }
            };

            let probe = self.probe(scenario, candidate, &mut history)?;
            if probe.residual.abs() <= tolerance {
                return Ok(self.finish(probe, history));
            }

            let moves_lo = probe.residual.is_sign_negative() == lo.residual.is_sign_negative();
            same_side = if last_moved_lo == Some(moves_lo) { same_side + 1 } else { 1 };
            last_moved_lo = Some(moves_lo);
            if moves_lo {
                lo = probe;
            } else {
                hi = probe;
            }
        }

        let best = if lo.residual.abs() <= hi.residual.abs() { lo } else { hi };
        Err(PlannerError::Convergence {
            iterations: self.config.max_iterations,
            best_estimate: best.value,
            residual: best.residual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::Assumptions;
    use crate::projection::ProjectionConfig;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn engine() -> ProjectionEngine {
        let config = ProjectionConfig {
            end_year: 2040,
            ..ProjectionConfig::default()
        };
        ProjectionEngine::new(Arc::new(Assumptions::default_us()), config)
    }

    fn outcome_at(rate: Decimal, metric: OutcomeMetric) -> Money {
        let scenario = Scenario::demo().unwrap();
        let solver = BreakEvenSolver::new(engine(), SolverConfig::default());
        let result = engine().project(&solver.apply(&scenario, rate).unwrap()).unwrap();
        metric.measure(&result)
    }

    #[test]
    fn test_solves_withdrawal_rate_for_income() {
        let target = outcome_at(dec!(0.045), OutcomeMetric::FirstYearNetIncome);
        let config = SolverConfig {
            target,
            ..SolverConfig::default()
        };
        let result = BreakEvenSolver::new(engine(), config)
            .solve(&Scenario::demo().unwrap())
            .unwrap();
        assert!(result.residual.abs() <= dec!(1.00));
        assert!((result.value - dec!(0.045)).abs() < dec!(0.0001));
        assert_eq!(result.history.len() as u32, result.iterations + 2);
        assert_eq!(result.summary.first_year_net_income, result.outcome);
    }

    #[test]
    fn test_secant_converges_on_decreasing_metric() {
        let target = outcome_at(dec!(0.05), OutcomeMetric::FinalBalance);
        let config = SolverConfig {
            metric: OutcomeMetric::FinalBalance,
            target,
            method: SolveMethod::Secant,
            ..SolverConfig::default()
        };
        let result = BreakEvenSolver::new(engine(), config)
            .solve(&Scenario::demo().unwrap())
            .unwrap();
        assert!(result.residual.abs() <= dec!(1.00));
    }

    #[test]
    fn test_unbracketed_target_rejected() {
        let config = SolverConfig {
            target: dec!(10000000),
            ..SolverConfig::default()
        };
        let err = BreakEvenSolver::new(engine(), config)
            .solve(&Scenario::demo().unwrap())
            .unwrap_err();
        assert!(matches!(err, PlannerError::Configuration { .. }));
    }

    #[test]
    fn test_exhausted_iterations_report_best_estimate() {
        let target = outcome_at(dec!(0.0437), OutcomeMetric::FirstYearNetIncome);
        let config = SolverConfig {
            target,
            max_iterations: 2,
            tolerance: dec!(0.01),
            ..SolverConfig::default()
        };
        let err = BreakEvenSolver::new(engine(), config)
            .solve(&Scenario::demo().unwrap())
            .unwrap_err();
        match err {
            PlannerError::Convergence {
                iterations,
                best_estimate,
                ..
            } => {
                assert_eq!(iterations, 2);
                assert!(best_estimate > Decimal::ZERO && best_estimate < dec!(0.15));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_rate_parameter_needs_rate_strategy() {
        let scenario = Scenario::demo()
            .unwrap()
            .with_strategy(WithdrawalStrategy::FixedAmount { annual: dec!(50000) });
        let solver = BreakEvenSolver::new(engine(), SolverConfig::default());
        assert!(solver.solve(&scenario).is_err());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(6))]

        #[test]
        fn test_inversion_within_tolerance(bp in 200u32..1000) {
            let rate = Decimal::new(bp as i64, 4);
            let target = outcome_at(rate, OutcomeMetric::FirstYearNetIncome);
            let config = SolverConfig {
                target,
                method: SolveMethod::Secant,
                ..SolverConfig::default()
            };
            let result = BreakEvenSolver::new(engine(), config)
                .solve(&Scenario::demo().unwrap())
                .unwrap();
            let replayed = outcome_at(result.value, OutcomeMetric::FirstYearNetIncome);
            prop_assert!((replayed - target).abs() <= dec!(1.00));
        }
    }
}
