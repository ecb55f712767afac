//! Parallel Monte Carlo driver
//!
//! Trials run on a dedicated rayon pool. Each trial owns its RNG, seeded
//! from the master seed and its index, so results do not depend on thread
//! scheduling. Outcomes flow back over a channel to a single reducer.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::results::{SimulationResult, SimulationTrial};
use super::returns::{PathGenerator, ReturnModel, ReturnPath};
use crate::assumptions::Assumptions;
use crate::error::{PlannerError, PlannerResult};
use crate::projection::{GrowthSource, ProjectionConfig, ProjectionEngine};
use crate::scenario::Scenario;
use crate::types::{round_cents, Money, Rate};
use crate::withdrawal::{SourceBalances, SourceOrder, StrategyState, WithdrawalEngine, WithdrawalStrategy};

/// What each trial replays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SimulationSubject {
    /// A single pot drawn down by a strategy, no taxes
    Portfolio {
        initial_balance: Money,
        strategy: WithdrawalStrategy,
    },
    /// A full household projection on each path
    Scenario {
        scenario: Box<Scenario>,
        config: ProjectionConfig,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParams {
    pub subject: SimulationSubject,

    /// Weight per fund; must sum to one
    pub allocation: Vec<Rate>,

    pub model: ReturnModel,

    pub trials: u32,

    pub horizon_years: u32,

    /// First calendar year for portfolio subjects; scenarios use their config
    pub start_year: i32,

    pub seed: u64,

    /// Pool size; 0 uses rayon's default
    #[serde(default)]
    pub workers: usize,

    /// Stop starting trials after this long
    #[serde(default)]
    pub deadline: Option<Duration>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            subject: SimulationSubject::Portfolio {
                initial_balance: dec!(1000000),
                strategy: WithdrawalStrategy::FixedAmount { annual: dec!(40000) },
            },
            allocation: vec![dec!(0.6), dec!(0.4)],
            model: ReturnModel::default(),
            trials: 1000,
            horizon_years: 25,
            start_year: 2026,
            seed: 42,
            workers: 0,
            deadline: None,
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> PlannerResult<()> {
        if self.trials == 0 {
            return Err(PlannerError::config("trials", "must be at least 1"));
        }
        if self.horizon_years == 0 {
            return Err(PlannerError::config("horizon_years", "must be at least 1"));
        }
        if self.allocation.iter().any(|w| *w < Decimal::ZERO) {
            return Err(PlannerError::config("allocation", "weights must not be negative"));
        }
        let total: Decimal = self.allocation.iter().copied().sum();
        if (total - Decimal::ONE).abs() > dec!(0.0001) {
            return Err(PlannerError::config("allocation", format!("weights sum to {total}, expected 1")));
        }
        match &self.subject {
            SimulationSubject::Portfolio {
                initial_balance,
                strategy,
            } => {
                if *initial_balance < Decimal::ZERO {
                    return Err(PlannerError::Arithmetic(format!(
                        "initial balance is negative ({initial_balance})"
                    )));
                }
                strategy.validate()
            }
            SimulationSubject::Scenario { scenario, config } => {
                config.validate()?;
                scenario.validate()
            }
        }
    }
}

/// Shared flag to stop a running simulation
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Seed for trial `index` under `master`
pub fn trial_seed(master: u64, index: u32) -> u64 {
    splitmix64(master ^ splitmix64(index as u64))
}

pub struct MonteCarloSimulator {
    assumptions: Arc<Assumptions>,
}

impl MonteCarloSimulator {
    pub fn new(assumptions: Arc<Assumptions>) -> Self {
        Self { assumptions }
    }

    /// Run every trial, or as many as complete before cancellation
    pub fn run(&self, params: &SimulationParams, cancel: &CancellationToken) -> PlannerResult<SimulationResult> {
        params.validate()?;
        let generator = PathGenerator::new(&params.model, &self.assumptions.historical)?;
        if generator.fund_count() != params.allocation.len() {
            return Err(PlannerError::config(
                "allocation",
                format!(
                    "{} weights for {} funds",
                    params.allocation.len(),
                    generator.fund_count()
                ),
            ));
        }

        let projection = match &params.subject {
            SimulationSubject::Scenario { config, .. } => {
                let mut config = config.clone();
                config.end_year = config.start_year + params.horizon_years as i32 - 1;
                Some(ProjectionEngine::new(Arc::clone(&self.assumptions), config))
            }
            SimulationSubject::Portfolio { .. } => None,
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.workers)
            .build()
            .map_err(|e| PlannerError::config("workers", e.to_string()))?;

        info!(
            "Simulating {} trials over {} years on {} workers",
            params.trials,
            params.horizon_years,
            pool.current_num_threads()
        );
        let started = Instant::now();
        let deadline = params.deadline.map(|d| started + d);

        // Workers pull trial indices until the batch is exhausted or stopped.
        // The deadline stops this run only; the caller's token is left as is.
        let next_index = AtomicU32::new(0);
        let deadline_hit = AtomicBool::new(false);
        let should_stop = || {
            if cancel.is_cancelled() || deadline_hit.load(Ordering::Relaxed) {
                return true;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                deadline_hit.store(true, Ordering::Relaxed);
                return true;
            }
            false
        };

        let (tx, rx) = channel::<(u32, PlannerResult<SimulationTrial>)>();
        pool.scope(|scope| {
            for _ in 0..pool.current_num_threads() {
                let tx = tx.clone();
                let generator = &generator;
                let projection = projection.as_ref();
                let next_index = &next_index;
                let should_stop = &should_stop;
                scope.spawn(move |_| {
                    while !should_stop() {
                        let index = next_index.fetch_add(1, Ordering::Relaxed);
                        if index >= params.trials {
                            break;
                        }
                        let outcome = self.run_isolated(params, generator, projection, index);
                        // Receiver outlives the scope
                        let _ = tx.send((index, outcome));
                    }
                });
            }
        });
        drop(tx);

        let mut trials = Vec::with_capacity(params.trials as usize);
        let mut failed_trials = 0;
        for (index, outcome) in rx {
            match outcome {
                Ok(trial) => trials.push(trial),
                Err(e) => {
                    warn!("Trial {index} failed: {e}");
                    failed_trials += 1;
                }
            }
        }
        trials.sort_by_key(|t| t.index);

        let cancelled = cancel.is_cancelled() || deadline_hit.load(Ordering::Relaxed);
        if cancelled {
            warn!(
                "Simulation cancelled after {} of {} trials",
                trials.len() as u32 + failed_trials,
                params.trials
            );
        }

        let result = SimulationResult::from_trials(params.trials, &trials, failed_trials, cancelled);
        info!(
            "Simulation finished in {:.2?}: success rate {:.1}%, median ending balance {}",
            started.elapsed(),
            result.success_rate * 100.0,
            result.median_ending_balance
        );
        Ok(result)
    }

    /// Run one trial, turning a panic inside it into a trial failure
    fn run_isolated(
        &self,
        params: &SimulationParams,
        generator: &PathGenerator<'_>,
        projection: Option<&ProjectionEngine>,
        index: u32,
    ) -> PlannerResult<SimulationTrial> {
        panic::catch_unwind(AssertUnwindSafe(|| self.run_trial(params, generator, projection, index)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|m| m.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(PlannerError::Arithmetic(format!("trial {index} panicked: {message}")))
            })
    }

    fn run_trial(
        &self,
        params: &SimulationParams,
        generator: &PathGenerator<'_>,
        projection: Option<&ProjectionEngine>,
        index: u32,
    ) -> PlannerResult<SimulationTrial> {
        let mut rng = StdRng::seed_from_u64(trial_seed(params.seed, index));
        let path = generator.generate(&mut rng, params.horizon_years as usize)?;
        let returns = path.portfolio_returns(&params.allocation)?;

        match (&params.subject, projection) {
            (SimulationSubject::Scenario { scenario, .. }, Some(engine)) => {
                let result = engine.project_with_growth(
                    scenario,
                    GrowthSource::Path {
                        returns: &returns,
                        inflation: &path.inflation,
                    },
                )?;
                let balances: Vec<Money> = result.cashflows.iter().map(|r| r.total_balance).collect();
                let ending_balance = result.final_balance();
                Ok(SimulationTrial {
                    index,
                    success: result.depletion_year.is_none() && ending_balance > Decimal::ZERO,
                    depletion_year: result.depletion_year,
                    ending_balance,
                    balances,
                })
            }
            (
                SimulationSubject::Portfolio {
                    initial_balance,
                    strategy,
                },
                _,
            ) => self.replay_portfolio(index, params.start_year, *initial_balance, strategy, &path, &returns),
            (SimulationSubject::Scenario { .. }, None) => {
                Err(PlannerError::config("subject", "scenario simulation has no projection engine"))
            }
        }
    }

    /// Draw a single pot down along one path
    fn replay_portfolio(
        &self,
        index: u32,
        start_year: i32,
        initial_balance: Money,
        strategy: &WithdrawalStrategy,
        path: &ReturnPath,
        returns: &[Rate],
    ) -> PlannerResult<SimulationTrial> {
        let engine = WithdrawalEngine::new(&self.assumptions.rmd);
        let mut balances = SourceBalances::single(initial_balance);
        let mut state = StrategyState::new();
        let mut price_index = Decimal::ONE;
        let mut depletion_year = None;
        let mut trajectory = Vec::with_capacity(returns.len());

        for (offset, (r, inflation)) in returns.iter().zip(&path.inflation).enumerate() {
            let year = start_year + offset as i32;
            if offset > 0 {
                price_index *= Decimal::ONE + *inflation;
            }
            let start_balance = balances.total();
            let amount = match strategy {
                WithdrawalStrategy::TargetIncome { monthly_net } => {
                    let amount = round_cents(*monthly_net * Decimal::from(12) * price_index);
                    state.record(start_balance, amount);
                    amount
                }
                other => state.next_amount(other, start_balance, *inflation),
            };

            let outcome = engine.withdraw(&mut balances, amount, &[], SourceOrder::default())?;
            if depletion_year.is_none()
                && amount > Decimal::ZERO
                && (outcome.unmet > Decimal::ZERO || balances.total() <= Decimal::ZERO)
            {
                depletion_year = Some(year);
            }
            balances.apply_growth(*r)?;
            trajectory.push(balances.total());
        }

        let ending_balance = balances.total();
        if let Some(year) = depletion_year {
            debug!("Trial {index} depleted in {year}");
        }
        Ok(SimulationTrial {
            index,
            success: depletion_year.is_none() && ending_balance > Decimal::ZERO,
            depletion_year,
            ending_balance,
            balances: trajectory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn simulator() -> MonteCarloSimulator {
        MonteCarloSimulator::new(Arc::new(Assumptions::default_us()))
    }

    fn fixed_withdrawal(annual: Money, trials: u32) -> SimulationParams {
        SimulationParams {
            subject: SimulationSubject::Portfolio {
                initial_balance: dec!(1000000),
                strategy: WithdrawalStrategy::FixedAmount { annual },
            },
            trials,
            ..SimulationParams::default()
        }
    }

    #[test]
    fn test_trial_seeds_differ() {
        assert_ne!(trial_seed(42, 0), trial_seed(42, 1));
        assert_ne!(trial_seed(42, 0), trial_seed(43, 0));
        assert_eq!(trial_seed(42, 7), trial_seed(42, 7));
    }

    #[test]
    fn test_same_seed_same_result() {
        let params = SimulationParams {
            workers: 4,
            ..fixed_withdrawal(dec!(50000), 200)
        };
        let a = simulator().run(&params, &CancellationToken::new()).unwrap();
        let b = simulator().run(&params, &CancellationToken::new()).unwrap();
        assert_eq!(a.successes, b.successes);
        assert_eq!(a.percentiles, b.percentiles);
        assert_eq!(a.median_trajectory, b.median_trajectory);
        assert_eq!(a.mean_ending_balance, b.mean_ending_balance);
    }

    #[test]
    fn test_historical_baseline_band() {
        // $1M, $40k fixed, 1000 trials, 25 years, 5-year blocks, seed 42.
        // Recorded: every trial survives, median ending balance $4,494,681.96
        let params = fixed_withdrawal(dec!(40000), 1000);
        assert_eq!(params.seed, 42);
        let result = simulator().run(&params, &CancellationToken::new()).unwrap();
        assert_eq!(result.trials_completed, 1000);
        assert_eq!(result.failed_trials, 0);
        assert!(!result.cancelled);
        assert_relative_eq!(result.success_rate, 1.0);

        let recorded = dec!(4494681.96);
        let drift = (result.median_ending_balance - recorded).abs();
        assert!(
            drift <= recorded * dec!(0.01),
            "median ending balance {} drifted from {recorded}",
            result.median_ending_balance
        );
        assert!(result.percentiles.p5 <= result.percentiles.p50);
        assert!(result.percentiles.p50 <= result.percentiles.p95);
        assert_eq!(result.median_trajectory.len(), 25);
    }

    #[test]
    fn test_fixed_model_depletes_on_schedule() {
        let params = SimulationParams {
            subject: SimulationSubject::Portfolio {
                initial_balance: dec!(100000),
                strategy: WithdrawalStrategy::FixedAmount { annual: dec!(10000) },
            },
            allocation: vec![dec!(1)],
            model: ReturnModel::Fixed {
                fund_returns: vec![Decimal::ZERO],
                inflation: Decimal::ZERO,
            },
            trials: 10,
            horizon_years: 12,
            ..SimulationParams::default()
        };
        let result = simulator().run(&params, &CancellationToken::new()).unwrap();
        assert_eq!(result.successes, 0);
        assert_relative_eq!(result.success_rate, 0.0);
        assert_eq!(result.earliest_depletion_year, Some(2035));
        assert_eq!(result.median_ending_balance, Decimal::ZERO);
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let result = simulator().run(&fixed_withdrawal(dec!(40000), 100), &token).unwrap();
        assert!(result.cancelled);
        assert_eq!(result.trials_completed, 0);
        assert_relative_eq!(result.success_rate, 0.0);
    }

    #[test]
    fn test_zero_deadline_cancels() {
        let params = SimulationParams {
            deadline: Some(Duration::ZERO),
            ..fixed_withdrawal(dec!(40000), 50)
        };
        let result = simulator().run(&params, &CancellationToken::new()).unwrap();
        assert!(result.cancelled);
        assert!(result.trials_completed < 50);
    }

    #[test]
    fn test_deadline_leaves_token_reusable() {
        let token = CancellationToken::new();
        let timed = SimulationParams {
            deadline: Some(Duration::ZERO),
            ..fixed_withdrawal(dec!(40000), 50)
        };
        let first = simulator().run(&timed, &token).unwrap();
        assert!(first.cancelled);
        assert!(!token.is_cancelled());

        let second = simulator().run(&fixed_withdrawal(dec!(40000), 50), &token).unwrap();
        assert!(!second.cancelled);
        assert_eq!(second.trials_completed, 50);
    }

    #[test]
    fn test_overflowing_trials_are_counted_not_fatal() {
        let params = SimulationParams {
            allocation: vec![dec!(1)],
            model: ReturnModel::Fixed {
                fund_returns: vec![dec!(9)],
                inflation: Decimal::ZERO,
            },
            trials: 5,
            horizon_years: 40,
            ..fixed_withdrawal(dec!(40000), 5)
        };
        let result = simulator().run(&params, &CancellationToken::new()).unwrap();
        assert_eq!(result.failed_trials, 5);
        assert_eq!(result.trials_completed, 0);
        assert!(!result.cancelled);
    }

    #[test]
    fn test_allocation_must_match_funds() {
        let params = SimulationParams {
            allocation: vec![dec!(1)],
            ..SimulationParams::default()
        };
        let err = simulator().run(&params, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, PlannerError::Configuration { .. }));
    }

    #[test]
    fn test_scenario_subject_runs_projection() {
        let params = SimulationParams {
            subject: SimulationSubject::Scenario {
                scenario: Box::new(Scenario::demo().unwrap()),
                config: ProjectionConfig::default(),
            },
            trials: 20,
            horizon_years: 30,
            ..SimulationParams::default()
        };
        let result = simulator().run(&params, &CancellationToken::new()).unwrap();
        assert_eq!(result.trials_completed + result.failed_trials, 20);
        assert_eq!(result.failed_trials, 0);
        assert_eq!(result.median_trajectory.len(), 30);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(8))]

        #[test]
        fn test_success_rate_non_increasing_in_withdrawal(
            low in 20_000u32..60_000,
            step in 1_000u32..40_000,
            seed in 0u64..1_000,
        ) {
            let run = |annual: u32| {
                let params = SimulationParams {
                    seed,
                    ..fixed_withdrawal(Decimal::from(annual), 200)
                };
                simulator().run(&params, &CancellationToken::new()).unwrap().success_rate
            };
            prop_assert!(run(low) >= run(low + step));
        }
    }
}
