//! Error taxonomy for the planning core
//!
//! Every fallible operation returns [`PlannerResult`]. Nothing is retried
//! internally: the core does no I/O, so every error is either bad input,
//! missing reference data, a solver that ran out of iterations, or a bug.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    /// Malformed or missing scenario fields. Surfaced immediately.
    #[error("Invalid configuration: {field} — {reason}")]
    Configuration { field: String, reason: String },

    /// Requested historical year or fund is absent from the data provider.
    #[error("Historical data unavailable: {series} has no entry for {year}")]
    Data { series: String, year: i32 },

    /// Solver exhausted its iteration budget without meeting tolerance.
    #[error("Solver did not converge after {iterations} iterations (best estimate: {best_estimate}, residual: {residual})")]
    Convergence {
        iterations: u32,
        best_estimate: Decimal,
        residual: Decimal,
    },

    /// Invariant violation such as a negative balance before clipping.
    #[error("Arithmetic invariant violated: {0}")]
    Arithmetic(String),
}

impl PlannerError {
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PlannerError::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_data(series: impl Into<String>, year: i32) -> Self {
        PlannerError::Data {
            series: series.into(),
            year,
        }
    }
}

pub type PlannerResult<T> = Result<T, PlannerError>;
