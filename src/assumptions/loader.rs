//! CSV adapters for reference data
//!
//! Kept apart from the planning core: the core only ever sees the in-memory
//! tables these functions produce.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;

use super::historical::{HistoricalData, HistoricalRecord};
use super::rmd::RmdTable;

/// Default directory for reference data files
pub const DEFAULT_DATA_PATH: &str = "data";

fn parse_decimal(raw: &str, what: &str, line: usize) -> Result<Decimal> {
    Decimal::from_str(raw.trim())
        .or_else(|_| Decimal::from_scientific(raw.trim()))
        .with_context(|| format!("line {line}: invalid {what} '{raw}'"))
}

/// Load historical returns from a reader
///
/// Expected header: `year,<fund id>...,inflation`. Rates are fractions.
pub fn load_historical_from_reader<R: Read>(reader: R) -> Result<HistoricalData> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();

    if headers.len() < 3 {
        bail!("expected year, at least one fund and inflation columns");
    }
    if !headers[0].eq_ignore_ascii_case("year") {
        bail!("first column must be 'year', found '{}'", &headers[0]);
    }
    let last = headers.len() - 1;
    if !headers[last].eq_ignore_ascii_case("inflation") {
        bail!("last column must be 'inflation', found '{}'", &headers[last]);
    }
    let fund_ids: Vec<String> = headers.iter().skip(1).take(last - 1).map(str::to_string).collect();

    let mut records = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let line = i + 2;
        let record = result?;
        let year: i32 = record[0]
            .trim()
            .parse()
            .with_context(|| format!("line {line}: invalid year '{}'", &record[0]))?;
        let returns = (1..last)
            .map(|col| parse_decimal(&record[col], &format!("return for {}", &headers[col]), line))
            .collect::<Result<Vec<_>>>()?;
        let inflation = parse_decimal(&record[last], "inflation", line)?;
        records.push(HistoricalRecord {
            year,
            returns,
            inflation,
        });
    }

    Ok(HistoricalData::new(fund_ids, records)?)
}

/// Load historical returns from `historical_returns.csv` in `path`
pub fn load_historical(path: &Path) -> Result<HistoricalData> {
    let file_path = path.join("historical_returns.csv");
    let file = File::open(&file_path)
        .with_context(|| format!("opening {}", file_path.display()))?;
    load_historical_from_reader(file)
}

/// Load uniform lifetime divisors from `rmd_divisors.csv` (age,divisor)
pub fn load_rmd_divisors(path: &Path) -> Result<RmdTable> {
    let file_path = path.join("rmd_divisors.csv");
    let file = File::open(&file_path)
        .with_context(|| format!("opening {}", file_path.display()))?;
    let mut reader = csv::Reader::from_reader(file);

    let mut divisors = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let age: u32 = record[0]
            .trim()
            .parse()
            .with_context(|| format!("line {}: invalid age '{}'", i + 2, &record[0]))?;
        let divisor = parse_decimal(&record[1], "divisor", i + 2)?;
        divisors.push((age, divisor));
    }

    if divisors.is_empty() {
        bail!("{} contains no divisors", file_path.display());
    }
    Ok(RmdTable::from_divisors(divisors))
}

impl HistoricalData {
    /// Load from `historical_returns.csv` in a data directory
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        load_historical(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_load_historical_from_reader() {
        let csv = "year,stocks,bonds,inflation\n\
                   2001,-0.12,0.04,0.028\n\
                   2000,-0.09,0.11,0.034\n";
        let data = load_historical_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(data.fund_ids(), &["stocks".to_string(), "bonds".to_string()]);
        assert_eq!(data.first_year(), 2000);
        assert_eq!(data.return_for("bonds", 2001).unwrap(), dec!(0.04));
        assert_eq!(data.inflation_for(2000).unwrap(), dec!(0.034));
    }

    #[test]
    fn test_load_historical_rejects_bad_rows() {
        let csv = "year,stocks,inflation\n2000,abc,0.02\n";
        let err = load_historical_from_reader(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let csv = "yr,stocks,inflation\n2000,0.1,0.02\n";
        assert!(load_historical_from_reader(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_bundled_data_matches_builtin() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_DATA_PATH);
        let loaded = HistoricalData::from_csv_path(&dir).unwrap();
        let builtin = HistoricalData::us_default();
        assert_eq!(loaded.len(), builtin.len());
        assert_eq!(loaded.fund_ids(), builtin.fund_ids());
        for year in [1948, 1974, 2008, 2023] {
            assert_eq!(loaded.record(year).unwrap(), builtin.record(year).unwrap());
        }

        let rmd = load_rmd_divisors(&dir).unwrap();
        assert_eq!(rmd.divisor(75), RmdTable::default().divisor(75));
    }
}
