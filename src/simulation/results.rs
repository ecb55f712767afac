//! Trial outcomes and their aggregation

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{round_cents, Money};

/// Outcome of one simulated path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationTrial {
    pub index: u32,
    pub success: bool,
    pub depletion_year: Option<i32>,
    pub ending_balance: Money,
    /// Year-end balance for each simulated year
    pub balances: Vec<Money>,
}

/// Ending-balance percentiles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentileBands {
    pub p5: Money,
    pub p10: Money,
    pub p25: Money,
    pub p50: Money,
    pub p75: Money,
    pub p90: Money,
    pub p95: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub trials_requested: u32,
    pub trials_completed: u32,
    /// Trials that errored; excluded from every statistic
    pub failed_trials: u32,
    pub successes: u32,
    /// successes / trials_completed
    pub success_rate: f64,
    pub percentiles: PercentileBands,
    pub mean_ending_balance: Money,
    pub median_ending_balance: Money,
    /// Median balance by year across trials
    pub median_trajectory: Vec<Money>,
    /// Calendar year of the earliest depletion among failed paths
    pub earliest_depletion_year: Option<i32>,
    pub cancelled: bool,
}

/// Linear interpolation between closest ranks; `sorted` must be ascending
pub fn percentile(sorted: &[Money], p: Decimal) -> Money {
    match sorted.len() {
        0 => Decimal::ZERO,
        1 => sorted[0],
        n => {
            let rank = p.clamp(Decimal::ZERO, Decimal::ONE) * Decimal::from(n - 1);
            let lo = rank.floor();
            let frac = rank - lo;
            let lo_idx = lo.to_usize().unwrap_or(0).min(n - 1);
            let hi_idx = (lo_idx + 1).min(n - 1);
            round_cents(sorted[lo_idx] + (sorted[hi_idx] - sorted[lo_idx]) * frac)
        }
    }
}

impl SimulationResult {
    /// Aggregate completed trials, which must be in index order
    pub fn from_trials(trials_requested: u32, trials: &[SimulationTrial], failed_trials: u32, cancelled: bool) -> Self {
        let completed = trials.len() as u32;
        let successes = trials.iter().filter(|t| t.success).count() as u32;
        let success_rate = if completed == 0 {
            0.0
        } else {
            successes as f64 / completed as f64
        };

        let mut endings: Vec<Money> = trials.iter().map(|t| t.ending_balance).collect();
        endings.sort();
        let percentiles = PercentileBands {
            p5: percentile(&endings, dec!(0.05)),
            p10: percentile(&endings, dec!(0.10)),
            p25: percentile(&endings, dec!(0.25)),
            p50: percentile(&endings, dec!(0.50)),
            p75: percentile(&endings, dec!(0.75)),
            p90: percentile(&endings, dec!(0.90)),
            p95: percentile(&endings, dec!(0.95)),
        };
        let mean_ending_balance = if endings.is_empty() {
            Decimal::ZERO
        } else {
            round_cents(endings.iter().copied().sum::<Decimal>() / Decimal::from(endings.len()))
        };

        let years = trials.iter().map(|t| t.balances.len()).max().unwrap_or(0);
        let median_trajectory = (0..years)
            .map(|y| {
                let mut column: Vec<Money> = trials.iter().filter_map(|t| t.balances.get(y).copied()).collect();
                column.sort();
                percentile(&column, dec!(0.50))
            })
            .collect();

        Self {
            trials_requested,
            trials_completed: completed,
            failed_trials,
            successes,
            success_rate,
            median_ending_balance: percentiles.p50,
            percentiles,
            mean_ending_balance,
            median_trajectory,
            earliest_depletion_year: trials.iter().filter_map(|t| t.depletion_year).min(),
            cancelled,
        }
    }
}
