//! Historical annual market returns and inflation
//!
//! Read-only table indexed by calendar year and fund id. The built-in US
//! series covers 1948 through 2023.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, PlannerResult};
use crate::types::Rate;

pub const US_STOCKS: &str = "us_stocks";
pub const US_BONDS: &str = "us_long_bonds";

/// (year, large-cap total return, long government bond return, CPI change)
const US_ANNUAL: &[(i32, Decimal, Decimal, Decimal)] = &[
    (1948, dec!(0.0309), dec!(0.0199), dec!(0.0273)),
    (1949, dec!(0.1032), dec!(0.0291), dec!(-0.0183)),
    (1950, dec!(0.1677), dec!(0.0135), dec!(0.0580)),
    (1951, dec!(0.3240), dec!(0.0095), dec!(0.0596)),
    (1952, dec!(0.1990), dec!(0.0159), dec!(0.0091)),
    (1953, dec!(0.1397), dec!(0.0202), dec!(0.0060)),
    (1954, dec!(0.0222), dec!(0.0634), dec!(-0.0037)),
    (1955, dec!(0.4375), dec!(-0.0092), dec!(0.0037)),
    (1956, dec!(0.2781), dec!(-0.0011), dec!(0.0283)),
    (1957, dec!(0.0684), dec!(-0.0054), dec!(0.0304)),
    (1958, dec!(-0.0571), dec!(0.0630), dec!(0.0176)),
    (1959, dec!(0.3839), dec!(-0.0482), dec!(0.0152)),
    (1960, dec!(0.0780), dec!(0.0607), dec!(0.0136)),
    (1961, dec!(0.0587), dec!(0.0599), dec!(0.0067)),
    (1962, dec!(0.1897), dec!(0.0338), dec!(0.0123)),
    (1963, dec!(-0.0266), dec!(0.0349), dec!(0.0165)),
    (1964, dec!(0.2045), dec!(0.0253), dec!(0.0120)),
    (1965, dec!(0.1562), dec!(0.0342), dec!(0.0192)),
    (1966, dec!(0.1168), dec!(-0.0084), dec!(0.0336)),
    (1967, dec!(-0.0634), dec!(0.0372), dec!(0.0328)),
    (1968, dec!(0.1558), dec!(0.0049), dec!(0.0471)),
    (1969, dec!(0.1052), dec!(-0.0255), dec!(0.0590)),
    (1970, dec!(-0.0765), dec!(0.0125), dec!(0.0557)),
    (1971, dec!(0.0667), dec!(0.1686), dec!(0.0327)),
    (1972, dec!(0.1332), dec!(0.0575), dec!(0.0341)),
    (1973, dec!(0.1763), dec!(0.0115), dec!(0.0894)),
    (1974, dec!(-0.1457), dec!(0.0112), dec!(0.1210)),
    (1975, dec!(-0.2023), dec!(0.0412), dec!(0.0713)),
    (1976, dec!(0.3722), dec!(0.1099), dec!(0.0504)),
    (1977, dec!(0.1162), dec!(0.0915), dec!(0.0668)),
    (1978, dec!(-0.0793), dec!(-0.0051), dec!(0.0899)),
    (1979, dec!(0.1570), dec!(0.0015), dec!(0.1325)),
    (1980, dec!(0.1623), dec!(-0.0670), dec!(0.1235)),
    (1981, dec!(0.2494), dec!(-0.0815), dec!(0.0891)),
    (1982, dec!(-0.0613), dec!(0.2118), dec!(0.0383)),
    (1983, dec!(0.2736), dec!(0.2817), dec!(0.0379)),
    (1984, dec!(0.1987), dec!(0.0044), dec!(0.0404)),
    (1985, dec!(0.0727), dec!(0.2696), dec!(0.0379)),
    (1986, dec!(0.2477), dec!(0.3415), dec!(0.0119)),
    (1987, dec!(0.3002), dec!(0.0207), dec!(0.0433)),
    (1988, dec!(-0.0181), dec!(0.0469), dec!(0.0441)),
    (1989, dec!(0.1715), dec!(0.1163), dec!(0.0464)),
    (1990, dec!(0.2260), dec!(0.0809), dec!(0.0625)),
    (1991, dec!(-0.0102), dec!(0.1408), dec!(0.0298)),
    (1992, dec!(0.3080), dec!(0.1464), dec!(0.0297)),
    (1993, dec!(0.0737), dec!(0.1610), dec!(0.0281)),
    (1994, dec!(0.1147), dec!(-0.0378), dec!(0.0260)),
    (1995, dec!(0.0084), dec!(0.1108), dec!(0.0253)),
    (1996, dec!(0.3421), dec!(0.0771), dec!(0.0338)),
    (1997, dec!(0.2645), dec!(0.0712), dec!(0.0170)),
    (1998, dec!(0.2720), dec!(0.1506), dec!(0.0161)),
    (1999, dec!(0.3087), dec!(0.0228), dec!(0.0268)),
    (2000, dec!(0.1532), dec!(0.0250), dec!(0.0344)),
    (2001, dec!(-0.0498), dec!(0.1412), dec!(0.0160)),
    (2002, dec!(-0.1304), dec!(0.0827), dec!(0.0248)),
    (2003, dec!(-0.1972), dec!(0.0938), dec!(0.0204)),
    (2004, dec!(0.2807), dec!(0.0194), dec!(0.0334)),
    (2005, dec!(0.0606), dec!(0.0415), dec!(0.0334)),
    (2006, dec!(0.1004), dec!(0.0028), dec!(0.0252)),
    (2007, dec!(0.1316), dec!(0.0609), dec!(0.0411)),
    (2008, dec!(-0.0085), dec!(0.1233), dec!(-0.0002)),
    (2009, dec!(-0.3455), dec!(0.0695), dec!(0.0281)),
    (2010, dec!(0.3176), dec!(0.0360), dec!(0.0144)),
    (2011, dec!(0.1609), dec!(0.0664), dec!(0.0306)),
    (2012, dec!(0.0348), dec!(0.1065), dec!(0.0176)),
    (2013, dec!(0.1586), dec!(-0.0258), dec!(0.0151)),
    (2014, dec!(0.2504), dec!(0.0083), dec!(0.0065)),
    (2015, dec!(0.1332), dec!(0.0578), dec!(0.0064)),
    (2016, dec!(-0.0327), dec!(0.0449), dec!(0.0205)),
    (2017, dec!(0.2052), dec!(-0.0206), dec!(0.0213)),
    (2018, dec!(0.2449), dec!(-0.0231), dec!(0.0200)),
    (2019, dec!(-0.0461), dec!(0.0933), dec!(0.0232)),
    (2020, dec!(0.2756), dec!(0.1181), dec!(0.0132)),
    (2021, dec!(0.1710), dec!(-0.0349), dec!(0.0716)),
    (2022, dec!(0.2212), dec!(-0.1063), dec!(0.0641)),
    (2023, dec!(-0.1180), dec!(-0.0355), dec!(0.0332)),
];

/// One calendar year of history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub year: i32,
    /// Returns in `HistoricalData::fund_ids` order
    pub returns: Vec<Rate>,
    pub inflation: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalData {
    fund_ids: Vec<String>,
    /// Contiguous, ascending by year
    records: Vec<HistoricalRecord>,
}

impl HistoricalData {
    /// Build from records, checking that years are contiguous and every
    /// record carries one return per fund
    pub fn new(fund_ids: Vec<String>, mut records: Vec<HistoricalRecord>) -> PlannerResult<Self> {
        if fund_ids.is_empty() {
            return Err(PlannerError::config("historical.fund_ids", "at least one fund is required"));
        }
        if records.is_empty() {
            return Err(PlannerError::config("historical.records", "no years supplied"));
        }
        records.sort_by_key(|r| r.year);
        for pair in records.windows(2) {
            if pair[1].year != pair[0].year + 1 {
                return Err(PlannerError::missing_data("historical", pair[0].year + 1));
            }
        }
        for record in &records {
            if record.returns.len() != fund_ids.len() {
                return Err(PlannerError::config(
                    "historical.records",
                    format!(
                        "{} has {} returns for {} funds",
                        record.year,
                        record.returns.len(),
                        fund_ids.len()
                    ),
                ));
            }
        }
        Ok(Self { fund_ids, records })
    }

    /// US large-cap stocks and long government bonds with CPI, 1948-2023
    pub fn us_default() -> Self {
        let records = US_ANNUAL
            .iter()
            .map(|&(year, stocks, bonds, cpi)| HistoricalRecord {
                year,
                returns: vec![stocks, bonds],
                inflation: cpi,
            })
            .collect();
        Self {
            fund_ids: vec![US_STOCKS.to_string(), US_BONDS.to_string()],
            records,
        }
    }

    pub fn fund_ids(&self) -> &[String] {
        &self.fund_ids
    }

    pub fn fund_count(&self) -> usize {
        self.fund_ids.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_year(&self) -> i32 {
        self.records.first().map(|r| r.year).unwrap_or_default()
    }

    pub fn last_year(&self) -> i32 {
        self.records.last().map(|r| r.year).unwrap_or_default()
    }

    /// Record by position (0 = first year)
    pub fn record_at(&self, idx: usize) -> Option<&HistoricalRecord> {
        self.records.get(idx)
    }

    pub fn record(&self, year: i32) -> PlannerResult<&HistoricalRecord> {
        let offset = year - self.first_year();
        if offset < 0 {
            return Err(PlannerError::missing_data("historical", year));
        }
        self.records
            .get(offset as usize)
            .ok_or_else(|| PlannerError::missing_data("historical", year))
    }

    pub fn fund_index(&self, fund_id: &str) -> PlannerResult<usize> {
        self.fund_ids
            .iter()
            .position(|f| f == fund_id)
            .ok_or_else(|| PlannerError::missing_data(format!("fund:{fund_id}"), self.first_year()))
    }

    pub fn return_for(&self, fund_id: &str, year: i32) -> PlannerResult<Rate> {
        let idx = self.fund_index(fund_id)?;
        Ok(self.record(year)?.returns[idx])
    }

    pub fn inflation_for(&self, year: i32) -> PlannerResult<Rate> {
        Ok(self.record(year)?.inflation)
    }

    /// Arithmetic mean annual return of a fund over the whole table
    pub fn mean_return(&self, fund_id: &str) -> PlannerResult<Rate> {
        let idx = self.fund_index(fund_id)?;
        let total: Decimal = self.records.iter().map(|r| r.returns[idx]).sum();
        Ok(total / Decimal::from(self.records.len()))
    }

    pub fn mean_inflation(&self) -> Rate {
        let total: Decimal = self.records.iter().map(|r| r.inflation).sum();
        total / Decimal::from(self.records.len().max(1))
    }
}

impl Default for HistoricalData {
    fn default() -> Self {
        Self::us_default()
    }
}
