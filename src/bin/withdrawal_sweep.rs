//! Project the demo household across a range of withdrawal rates
//!
//! Writes one summary row per rate to withdrawal_sweep.csv

use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;

use retirement_planner::{PlannerResult, ProjectionConfig, Scenario, ScenarioRunner, ScenarioSummary};

/// One CSV row
#[derive(Debug, Serialize)]
struct SweepRow {
    rate: Decimal,
    first_year_net_income: Decimal,
    average_net_income: Decimal,
    lifetime_income: Decimal,
    final_balance: Decimal,
    depletion_year: Option<i32>,
    surcharge_breach_years: usize,
    total_surcharge: Decimal,
}

impl SweepRow {
    fn new(rate: Decimal, summary: &ScenarioSummary) -> Self {
        Self {
            rate,
            first_year_net_income: summary.first_year_net_income,
            average_net_income: summary.average_net_income,
            lifetime_income: summary.lifetime_income,
            final_balance: summary.final_balance,
            depletion_year: summary.depletion_year,
            surcharge_breach_years: summary.surcharge_risk.breach_years.len(),
            total_surcharge: summary.surcharge_risk.total_surcharge,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let start = Instant::now();
    let runner = ScenarioRunner::new();
    let scenario = Scenario::demo()?;
    let config = ProjectionConfig::default();

    // 2.0% to 8.0% in 25bp steps
    let rates: Vec<Decimal> = (8..=32).map(|q| Decimal::new(q * 25, 4)).collect();
    println!("Projecting {} withdrawal rates...", rates.len());

    let rows: Vec<SweepRow> = rates
        .par_iter()
        .map(|&rate| -> PlannerResult<SweepRow> {
            let s = scenario.with_strategy(scenario.withdrawal.strategy.with_rate(rate)?);
            let result = runner.run(&s, config.clone())?;
            Ok(SweepRow::new(rate, &result.summary()))
        })
        .collect::<PlannerResult<_>>()
        .context("sweep projection failed")?;

    let output_path = "withdrawal_sweep.csv";
    let mut writer = csv::Writer::from_path(output_path).with_context(|| format!("creating {output_path}"))?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    println!("Output written to {output_path}");
    println!("\n{:>6} {:>14} {:>14} {:>10}", "Rate", "First-year net", "Final balance", "Depleted");
    for row in &rows {
        println!(
            "{:>5.2}% {:>14.0} {:>14.0} {:>10}",
            row.rate * Decimal::ONE_HUNDRED,
            row.first_year_net_income,
            row.final_balance,
            row.depletion_year.map_or_else(|| "-".to_string(), |y| y.to_string())
        );
    }
    println!("\nTotal time: {:?}", start.elapsed());
    Ok(())
}
