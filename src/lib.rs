//! Retirement Planner - household retirement projection engine
//!
//! This library provides:
//! - Deterministic year-by-year projections of income, withdrawals, taxes
//!   and balances for one- or two-person households
//! - Pension and government benefit calculation with COLA rules
//! - Federal, state, local and payroll taxes plus the lagged healthcare
//!   surcharge with risk recommendations
//! - Monte Carlo sustainability testing over historical or parametric returns
//! - Break-even solving for a withdrawal parameter

pub mod api;
pub mod assumptions;
pub mod benefits;
pub mod error;
pub mod household;
pub mod projection;
pub mod scenario;
pub mod simulation;
pub mod solver;
pub mod tax;
pub mod types;
pub mod withdrawal;

// Re-export commonly used types
pub use assumptions::{Assumptions, HistoricalData, TaxTables};
pub use error::{PlannerError, PlannerResult};
pub use household::{FilingStatus, Household, Participant};
pub use projection::{AnnualCashFlow, ProjectionConfig, ProjectionEngine, ProjectionResult, ScenarioSummary};
pub use scenario::{ParticipantElection, Scenario, ScenarioRunner};
pub use simulation::{MonteCarloSimulator, SimulationParams, SimulationResult};
pub use solver::{BreakEvenSolver, SolverConfig, SolverResult};
