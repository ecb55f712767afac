//! Year-by-year household projection

mod cashflows;
mod engine;
pub mod state;

pub use cashflows::{AnnualCashFlow, ProjectionResult, ScenarioSummary, SurchargeRiskSummary, SurchargeRiskYear};
pub use engine::{GrowthSource, ProjectionConfig, ProjectionEngine};
pub use state::{ParticipantStatus, ProjectionState};
