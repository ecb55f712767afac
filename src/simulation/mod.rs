//! Monte Carlo simulation of withdrawal sustainability

mod engine;
mod results;
mod returns;

pub use engine::{trial_seed, CancellationToken, MonteCarloSimulator, SimulationParams, SimulationSubject};
pub use results::{percentile, PercentileBands, SimulationResult, SimulationTrial};
pub use returns::{cholesky, FundParams, PathGenerator, ReturnModel, ReturnPath};
