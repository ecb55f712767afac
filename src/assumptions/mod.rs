//! Planning assumptions: tax tables, RMD rules, benefit formulas and
//! historical market data

mod benefit_rules;
mod historical;
mod rmd;
mod tax_tables;
pub mod loader;

pub use benefit_rules::{BenefitRules, ColaPolicy, GovernmentBenefitRules, PensionRules};
pub use historical::{HistoricalData, HistoricalRecord, US_BONDS, US_STOCKS};
pub use rmd::RmdTable;
pub use tax_tables::{
    BenefitTaxThresholds, Bracket, BracketSchedule, FederalSchedule, PayrollSchedule,
    SurchargeSchedule, SurchargeTier, TaxTables, YearTable,
};

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Container for all read-only reference tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assumptions {
    pub tax: TaxTables,
    pub rmd: RmdTable,
    pub benefits: BenefitRules,
    pub historical: HistoricalData,
}

impl Assumptions {
    /// Built-in US tables and 1948-2023 market history
    pub fn default_us() -> Self {
        Self {
            tax: TaxTables::default(),
            rmd: RmdTable::default(),
            benefits: BenefitRules::default(),
            historical: HistoricalData::us_default(),
        }
    }

    /// Built-in tables with market history (and RMD divisors, when present)
    /// loaded from a data directory
    pub fn from_csv_path(path: &Path) -> anyhow::Result<Self> {
        let historical = loader::load_historical(path)?;
        let rmd = if path.join("rmd_divisors.csv").exists() {
            loader::load_rmd_divisors(path)?
        } else {
            RmdTable::default()
        };

        Ok(Self {
            tax: TaxTables::default(),
            rmd,
            benefits: BenefitRules::default(),
            historical,
        })
    }
}

impl Default for Assumptions {
    fn default() -> Self {
        Self::default_us()
    }
}
