//! Entry points for driving the planner from a CLI or service
//!
//! Each operation takes an explicit request and returns a fresh result.
//! Requests and outcomes serialize with serde so callers can move them
//! across process boundaries as JSON.

use serde::{Deserialize, Serialize};

use crate::error::PlannerResult;
use crate::projection::{AnnualCashFlow, ProjectionConfig, ScenarioSummary};
use crate::scenario::{Scenario, ScenarioRunner};
use crate::simulation::{SimulationParams, SimulationResult};
use crate::solver::{SolverConfig, SolverResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionRequest {
    pub scenario: Scenario,
    #[serde(default)]
    pub config: ProjectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionOutcome {
    pub summary: ScenarioSummary,
    pub cashflows: Vec<AnnualCashFlow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveRequest {
    pub scenario: Scenario,
    #[serde(default)]
    pub config: ProjectionConfig,
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisRequest {
    Projection(ProjectionRequest),
    Simulation(SimulationParams),
    Solver(SolveRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Projection(ProjectionOutcome),
    Simulation(SimulationResult),
    Solver(SolverResult),
}

impl ScenarioRunner {
    pub fn project_request(&self, request: &ProjectionRequest) -> PlannerResult<ProjectionOutcome> {
        let result = self.run(&request.scenario, request.config.clone())?;
        Ok(ProjectionOutcome {
            summary: result.summary(),
            cashflows: result.cashflows,
        })
    }

    pub fn solve_request(&self, request: &SolveRequest) -> PlannerResult<SolverResult> {
        self.solve(&request.scenario, request.config.clone(), &request.solver)
    }

    /// Dispatch any request
    pub fn analyze(&self, request: &AnalysisRequest) -> PlannerResult<AnalysisOutcome> {
        Ok(match request {
            AnalysisRequest::Projection(r) => AnalysisOutcome::Projection(self.project_request(r)?),
            AnalysisRequest::Simulation(p) => AnalysisOutcome::Simulation(self.simulate(p)?),
            AnalysisRequest::Solver(r) => AnalysisOutcome::Solver(self.solve_request(r)?),
        })
    }
}

/// Deterministic projection over the built-in assumptions
pub fn project(request: &ProjectionRequest) -> PlannerResult<ProjectionOutcome> {
    ScenarioRunner::new().project_request(request)
}

pub fn simulate(params: &SimulationParams) -> PlannerResult<SimulationResult> {
    ScenarioRunner::new().simulate(params)
}

pub fn solve(request: &SolveRequest) -> PlannerResult<SolverResult> {
    ScenarioRunner::new().solve_request(request)
}

pub fn run(request: &AnalysisRequest) -> PlannerResult<AnalysisOutcome> {
    ScenarioRunner::new().analyze(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulationSubject;
    use crate::withdrawal::WithdrawalStrategy;
    use rust_decimal_macros::dec;

    #[test]
    fn test_project_returns_contiguous_years() {
        let outcome = project(&ProjectionRequest {
            scenario: Scenario::demo().unwrap(),
            config: ProjectionConfig::default(),
        })
        .unwrap();
        assert_eq!(outcome.summary.start_year, 2026);
        assert_eq!(outcome.summary.end_year, 2065);
        for pair in outcome.cashflows.windows(2) {
            assert_eq!(pair[1].year, pair[0].year + 1);
        }
    }

    #[test]
    fn test_run_dispatches_simulation() {
        let request = AnalysisRequest::Simulation(SimulationParams {
            subject: SimulationSubject::Portfolio {
                initial_balance: dec!(500000),
                strategy: WithdrawalStrategy::PercentOfBalance { rate: dec!(0.04) },
            },
            trials: 50,
            ..SimulationParams::default()
        });
        match run(&request).unwrap() {
            AnalysisOutcome::Simulation(result) => {
                assert_eq!(result.trials_completed, 50);
                // A percentage of balance never runs dry
                assert_eq!(result.successes, 50);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_request_round_trips_through_json() {
        let request = AnalysisRequest::Solver(SolveRequest {
            scenario: Scenario::demo().unwrap(),
            config: ProjectionConfig::default(),
            solver: SolverConfig::default(),
        });
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"kind\":\"solver\""));
        let back: AnalysisRequest = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, AnalysisRequest::Solver(_)));
    }

    #[test]
    fn test_invalid_request_is_configuration_error() {
        let mut scenario = Scenario::demo().unwrap();
        scenario.elections.clear();
        let err = project(&ProjectionRequest {
            scenario,
            config: ProjectionConfig::default(),
        })
        .unwrap_err();
        assert!(matches!(err, crate::error::PlannerError::Configuration { .. }));
    }
}
