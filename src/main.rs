//! Retirement planner CLI
//!
//! Projects, simulates or solves the built-in demo household.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

use retirement_planner::api::{ProjectionRequest, SolveRequest};
use retirement_planner::projection::ProjectionConfig;
use retirement_planner::simulation::{ReturnModel, SimulationParams, SimulationSubject};
use retirement_planner::solver::{OutcomeMetric, SolveMethod, SolverConfig};
use retirement_planner::withdrawal::WithdrawalStrategy;
use retirement_planner::{Scenario, ScenarioRunner};

#[derive(Parser)]
#[command(name = "retirement_planner", version, about = "Household retirement projection and testing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Directory with historical_returns.csv (and optionally rmd_divisors.csv)
    #[arg(long, global = true)]
    data: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Year-by-year deterministic projection
    Project {
        #[arg(long, default_value_t = 2026)]
        start: i32,
        #[arg(long, default_value_t = 2065)]
        end: i32,
        /// Annual portfolio return
        #[arg(long, default_value = "0.05")]
        investment_return: Decimal,
        #[arg(long, default_value = "0.025")]
        inflation: Decimal,
        /// Override the demo's initial withdrawal rate
        #[arg(long)]
        rate: Option<Decimal>,
    },
    /// Monte Carlo test of a fixed annual withdrawal
    Simulate {
        #[arg(long, default_value = "1000000")]
        balance: Decimal,
        #[arg(long, default_value = "40000")]
        withdrawal: Decimal,
        #[arg(long, default_value_t = 1000)]
        trials: u32,
        #[arg(long, default_value_t = 25)]
        years: u32,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Historical block length in years
        #[arg(long, default_value_t = 5)]
        block_length: usize,
        /// Worker threads (0 = one per core)
        #[arg(long, default_value_t = 0)]
        workers: usize,
        /// Simulate the demo household instead of a single portfolio
        #[arg(long)]
        household: bool,
    },
    /// Find the withdrawal rate that produces a target outcome
    Solve {
        #[arg(long)]
        target: Decimal,
        #[arg(long, value_enum, default_value_t = Metric::FirstYearNet)]
        metric: Metric,
        #[arg(long)]
        secant: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Metric {
    FirstYearNet,
    AverageNet,
    FinalBalance,
}

impl From<Metric> for OutcomeMetric {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::FirstYearNet => OutcomeMetric::FirstYearNetIncome,
            Metric::AverageNet => OutcomeMetric::AverageNetIncome,
            Metric::FinalBalance => OutcomeMetric::FinalBalance,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let runner = match &cli.data {
        Some(dir) => ScenarioRunner::from_csv_path(dir)
            .with_context(|| format!("loading assumptions from {}", dir.display()))?,
        None => ScenarioRunner::new(),
    };
    let scenario = Scenario::demo().context("building demo scenario")?;

    match cli.command {
        Commands::Project {
            start,
            end,
            investment_return,
            inflation,
            rate,
        } => {
            let scenario = match rate {
                Some(r) => scenario.with_strategy(scenario.withdrawal.strategy.with_rate(r)?),
                None => scenario,
            };
            let config = ProjectionConfig {
                start_year: start,
                end_year: end,
                investment_return,
                inflation,
                ..ProjectionConfig::default()
            };
            let outcome = runner
                .project_request(&ProjectionRequest { scenario, config })
                .context("projection failed")?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }

            println!("Scenario: {}", outcome.summary.scenario_name);
            println!(
                "{:>4} {:>12} {:>12} {:>12} {:>12} {:>10} {:>12} {:>14}",
                "Year", "Gross", "Withdrawals", "Taxes", "Surcharge", "Premiums", "Net", "Balance"
            );
            println!("{}", "-".repeat(96));
            for row in &outcome.cashflows {
                println!(
                    "{:>4} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>10.2} {:>12.2} {:>14.2}",
                    row.year,
                    row.gross_income,
                    row.total_withdrawals(),
                    row.total_taxes() - row.surcharge,
                    row.surcharge,
                    row.premiums,
                    row.net_income,
                    row.total_balance
                );
            }

            let s = &outcome.summary;
            println!();
            println!("First-year net income: ${:.2}", s.first_year_net_income);
            println!("Average net income:    ${:.2}", s.average_net_income);
            println!("Lifetime net income:   ${:.2}", s.lifetime_income);
            println!("Final balance:         ${:.2}", s.final_balance);
            match s.depletion_year {
                Some(year) => println!("Savings depleted in {year}"),
                None => println!("Savings last through {}", s.end_year),
            }
            for flagged in &s.surcharge_risk.high_risk_years {
                println!("  {} surcharge ${:.2}: {}", flagged.year, flagged.surcharge, flagged.recommendation);
            }
        }

        Commands::Simulate {
            balance,
            withdrawal,
            trials,
            years,
            seed,
            block_length,
            workers,
            household,
        } => {
            let subject = if household {
                SimulationSubject::Scenario {
                    scenario: Box::new(scenario),
                    config: ProjectionConfig::default(),
                }
            } else {
                SimulationSubject::Portfolio {
                    initial_balance: balance,
                    strategy: WithdrawalStrategy::FixedAmount { annual: withdrawal },
                }
            };
            let params = SimulationParams {
                subject,
                model: ReturnModel::Historical { block_length },
                trials,
                horizon_years: years,
                seed,
                workers,
                ..SimulationParams::default()
            };
            let result = runner.simulate(&params).context("simulation failed")?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            println!("Trials:        {} of {}", result.trials_completed, result.trials_requested);
            println!("Success rate:  {:.1}%", result.success_rate * 100.0);
            println!("Median ending: ${:.0}", result.median_ending_balance);
            println!("Mean ending:   ${:.0}", result.mean_ending_balance);
            let p = &result.percentiles;
            println!(
                "Percentiles:   p5 ${:.0}  p25 ${:.0}  p50 ${:.0}  p75 ${:.0}  p95 ${:.0}",
                p.p5, p.p25, p.p50, p.p75, p.p95
            );
            if result.failed_trials > 0 {
                println!("Failed trials: {}", result.failed_trials);
            }
        }

        Commands::Solve { target, metric, secant } => {
            let request = SolveRequest {
                scenario,
                config: ProjectionConfig::default(),
                solver: SolverConfig {
                    metric: metric.into(),
                    target,
                    method: if secant {
                        SolveMethod::Secant
                    } else {
                        SolveMethod::Bisection
                    },
                    ..SolverConfig::default()
                },
            };
            let result = runner.solve_request(&request).context("solver failed")?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            println!(
                "Withdrawal rate {:.4}% gives {:?} of ${:.2} (target ${:.2}) after {} iterations",
                result.value * Decimal::ONE_HUNDRED,
                result.metric,
                result.outcome,
                result.target,
                result.iterations
            );
        }
    }

    Ok(())
}
