//! Federal bracket, payroll and healthcare surcharge tables
//!
//! Each table is keyed by the calendar year it was published for. A lookup
//! for year Y resolves to the latest version at or before Y; years past the
//! last version have their dollar thresholds indexed forward by
//! `TaxTables::indexing_rate` per elapsed year.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::household::FilingStatus;
use crate::types::{compound, round_cents, Money, Rate};

/// Table versions keyed by publication year
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearTable<T> {
    versions: BTreeMap<i32, T>,
}

impl<T> YearTable<T> {
    pub fn new() -> Self {
        Self {
            versions: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, year: i32, table: T) {
        self.versions.insert(year, table);
    }

    /// Latest version at or before `year`, or the earliest version when
    /// `year` predates every entry.
    pub fn resolve(&self, year: i32) -> Option<(i32, &T)> {
        self.versions
            .range(..=year)
            .next_back()
            .or_else(|| self.versions.iter().next())
            .map(|(y, t)| (*y, t))
    }

    pub fn last_year(&self) -> Option<i32> {
        self.versions.keys().next_back().copied()
    }
}

impl<T> Default for YearTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One marginal bracket: `rate` applies to income above `floor`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bracket {
    pub floor: Money,
    pub rate: Rate,
}

/// Brackets plus standard deduction for one filing status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketSchedule {
    pub standard_deduction: Money,
    /// Ascending by floor, first floor is zero
    pub brackets: Vec<Bracket>,
}

impl BracketSchedule {
    fn from_pairs(standard_deduction: Money, pairs: &[(Money, Rate)]) -> Self {
        Self {
            standard_deduction,
            brackets: pairs
                .iter()
                .map(|&(floor, rate)| Bracket { floor, rate })
                .collect(),
        }
    }

    /// Progressive tax on `taxable_income` (after deductions)
    pub fn tax_on(&self, taxable_income: Money) -> Money {
        if taxable_income <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let mut tax = Decimal::ZERO;
        for (i, bracket) in self.brackets.iter().enumerate() {
            if taxable_income <= bracket.floor {
                break;
            }
            let ceiling = self
                .brackets
                .get(i + 1)
                .map(|next| next.floor.min(taxable_income))
                .unwrap_or(taxable_income);
            tax += (ceiling - bracket.floor) * bracket.rate;
        }
        round_cents(tax)
    }

    fn indexed(&self, factor: Decimal) -> Self {
        Self {
            standard_deduction: round_cents(self.standard_deduction * factor),
            brackets: self
                .brackets
                .iter()
                .map(|b| Bracket {
                    floor: round_cents(b.floor * factor),
                    rate: b.rate,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederalSchedule {
    pub single: BracketSchedule,
    pub married_joint: BracketSchedule,
}

impl FederalSchedule {
    pub fn for_status(&self, status: FilingStatus) -> &BracketSchedule {
        match status {
            FilingStatus::Single => &self.single,
            FilingStatus::MarriedJoint => &self.married_joint,
        }
    }

    fn indexed(&self, factor: Decimal) -> Self {
        Self {
            single: self.single.indexed(factor),
            married_joint: self.married_joint.indexed(factor),
        }
    }
}

/// Social insurance payroll tax parameters (per worker)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollSchedule {
    /// Wages above this are exempt from the old-age portion
    pub wage_base: Money,
    pub old_age_rate: Rate,
    /// Hospital insurance portion, uncapped
    pub hospital_rate: Rate,
}

impl PayrollSchedule {
    fn indexed(&self, factor: Decimal) -> Self {
        Self {
            wage_base: round_cents(self.wage_base * factor),
            ..self.clone()
        }
    }
}

/// One means-tested surcharge tier: applies when lagged modified income
/// exceeds `threshold`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurchargeTier {
    pub label: String,
    pub threshold: Money,
    /// Annual surcharge per covered participant
    pub annual_surcharge: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurchargeSchedule {
    /// Annual base healthcare premium per covered participant
    pub base_premium: Money,
    /// Age at which coverage (and surcharge exposure) starts
    pub coverage_age: u32,
    pub single: Vec<SurchargeTier>,
    pub married_joint: Vec<SurchargeTier>,
}

impl SurchargeSchedule {
    pub fn tiers(&self, status: FilingStatus) -> &[SurchargeTier] {
        match status {
            FilingStatus::Single => &self.single,
            FilingStatus::MarriedJoint => &self.married_joint,
        }
    }

    fn indexed(&self, factor: Decimal) -> Self {
        let index_tiers = |tiers: &[SurchargeTier]| {
            tiers
                .iter()
                .map(|t| SurchargeTier {
                    label: t.label.clone(),
                    threshold: round_cents(t.threshold * factor),
                    annual_surcharge: round_cents(t.annual_surcharge * factor),
                })
                .collect()
        };
        Self {
            base_premium: round_cents(self.base_premium * factor),
            coverage_age: self.coverage_age,
            single: index_tiers(&self.single),
            married_joint: index_tiers(&self.married_joint),
        }
    }
}

/// Provisional-income thresholds for taxing the government benefit.
/// Statutory and never indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenefitTaxThresholds {
    pub single: (Money, Money),
    pub married_joint: (Money, Money),
}

impl BenefitTaxThresholds {
    pub fn for_status(&self, status: FilingStatus) -> (Money, Money) {
        match status {
            FilingStatus::Single => self.single,
            FilingStatus::MarriedJoint => self.married_joint,
        }
    }
}

impl Default for BenefitTaxThresholds {
    fn default() -> Self {
        Self {
            single: (dec!(25000), dec!(34000)),
            married_joint: (dec!(32000), dec!(44000)),
        }
    }
}

/// All versioned tax tables. Read-only once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxTables {
    pub federal: YearTable<FederalSchedule>,
    pub payroll: YearTable<PayrollSchedule>,
    pub surcharge: YearTable<SurchargeSchedule>,
    pub benefit_thresholds: BenefitTaxThresholds,

    /// Annual threshold indexing for years past the last published table
    pub indexing_rate: Rate,
}

impl TaxTables {
    fn index_factor(&self, version_year: i32, year: i32) -> Decimal {
        if year <= version_year {
            Decimal::ONE
        } else {
            compound(self.indexing_rate, (year - version_year) as u32)
        }
    }

    /// Federal schedule in force for `year`, indexed if needed
    pub fn federal_for(&self, year: i32) -> Option<FederalSchedule> {
        self.federal
            .resolve(year)
            .map(|(v, t)| t.indexed(self.index_factor(v, year)))
    }

    pub fn payroll_for(&self, year: i32) -> Option<PayrollSchedule> {
        self.payroll
            .resolve(year)
            .map(|(v, t)| t.indexed(self.index_factor(v, year)))
    }

    pub fn surcharge_for(&self, year: i32) -> Option<SurchargeSchedule> {
        self.surcharge
            .resolve(year)
            .map(|(v, t)| t.indexed(self.index_factor(v, year)))
    }
}

fn surcharge_tiers(rows: &[(&str, Money, Money)]) -> Vec<SurchargeTier> {
    rows.iter()
        .map(|&(label, threshold, annual_surcharge)| SurchargeTier {
            label: label.to_string(),
            threshold,
            annual_surcharge,
        })
        .collect()
}

impl Default for TaxTables {
    /// Published 2024 and 2025 tables, indexed at 2.5% afterwards
    fn default() -> Self {
        let mut federal = YearTable::new();
        federal.insert(
            2024,
            FederalSchedule {
                single: BracketSchedule::from_pairs(
                    dec!(14600),
                    &[
                        (dec!(0), dec!(0.10)),
                        (dec!(11600), dec!(0.12)),
                        (dec!(47150), dec!(0.22)),
                        (dec!(100525), dec!(0.24)),
                        (dec!(191950), dec!(0.32)),
                        (dec!(243725), dec!(0.35)),
                        (dec!(609350), dec!(0.37)),
                    ],
                ),
                married_joint: BracketSchedule::from_pairs(
                    dec!(29200),
                    &[
                        (dec!(0), dec!(0.10)),
                        (dec!(23200), dec!(0.12)),
                        (dec!(94300), dec!(0.22)),
                        (dec!(201050), dec!(0.24)),
                        (dec!(383900), dec!(0.32)),
                        (dec!(487450), dec!(0.35)),
                        (dec!(731200), dec!(0.37)),
                    ],
                ),
            },
        );
        federal.insert(
            2025,
            FederalSchedule {
                single: BracketSchedule::from_pairs(
                    dec!(15000),
                    &[
                        (dec!(0), dec!(0.10)),
                        (dec!(11925), dec!(0.12)),
                        (dec!(48475), dec!(0.22)),
                        (dec!(103350), dec!(0.24)),
                        (dec!(197300), dec!(0.32)),
                        (dec!(250525), dec!(0.35)),
                        (dec!(626350), dec!(0.37)),
                    ],
                ),
                married_joint: BracketSchedule::from_pairs(
                    dec!(30000),
                    &[
                        (dec!(0), dec!(0.10)),
                        (dec!(23850), dec!(0.12)),
                        (dec!(96950), dec!(0.22)),
                        (dec!(206700), dec!(0.24)),
                        (dec!(394600), dec!(0.32)),
                        (dec!(501050), dec!(0.35)),
                        (dec!(751600), dec!(0.37)),
                    ],
                ),
            },
        );

        let mut payroll = YearTable::new();
        payroll.insert(
            2024,
            PayrollSchedule {
                wage_base: dec!(168600),
                old_age_rate: dec!(0.062),
                hospital_rate: dec!(0.0145),
            },
        );
        payroll.insert(
            2025,
            PayrollSchedule {
                wage_base: dec!(176100),
                old_age_rate: dec!(0.062),
                hospital_rate: dec!(0.0145),
            },
        );

        // Annual amounts are (part B + part D) monthly add-ons x 12
        let mut surcharge = YearTable::new();
        surcharge.insert(
            2024,
            SurchargeSchedule {
                base_premium: dec!(2096.40),
                coverage_age: 65,
                single: surcharge_tiers(&[
                    ("Tier 1", dec!(103000), dec!(993.60)),
                    ("Tier 2", dec!(129000), dec!(2496.00)),
                    ("Tier 3", dec!(161000), dec!(3999.60)),
                    ("Tier 4", dec!(193000), dec!(5502.00)),
                    ("Tier 5", dec!(500000), dec!(6003.60)),
                ]),
                married_joint: surcharge_tiers(&[
                    ("Tier 1", dec!(206000), dec!(993.60)),
                    ("Tier 2", dec!(258000), dec!(2496.00)),
                    ("Tier 3", dec!(322000), dec!(3999.60)),
                    ("Tier 4", dec!(386000), dec!(5502.00)),
                    ("Tier 5", dec!(750000), dec!(6003.60)),
                ]),
            },
        );
        surcharge.insert(
            2025,
            SurchargeSchedule {
                base_premium: dec!(2220.00),
                coverage_age: 65,
                single: surcharge_tiers(&[
                    ("Tier 1", dec!(106000), dec!(1052.40)),
                    ("Tier 2", dec!(133000), dec!(2643.60)),
                    ("Tier 3", dec!(167000), dec!(4234.80)),
                    ("Tier 4", dec!(200000), dec!(5826.00)),
                    ("Tier 5", dec!(500000), dec!(6356.40)),
                ]),
                married_joint: surcharge_tiers(&[
                    ("Tier 1", dec!(212000), dec!(1052.40)),
                    ("Tier 2", dec!(266000), dec!(2643.60)),
                    ("Tier 3", dec!(334000), dec!(4234.80)),
                    ("Tier 4", dec!(400000), dec!(5826.00)),
                    ("Tier 5", dec!(750000), dec!(6356.40)),
                ]),
            },
        );

        Self {
            federal,
            payroll,
            surcharge,
            benefit_thresholds: BenefitTaxThresholds::default(),
            indexing_rate: dec!(0.025),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_table_resolution() {
        let mut table = YearTable::new();
        table.insert(2024, "a");
        table.insert(2026, "b");

        assert_eq!(table.resolve(2020), Some((2024, &"a")));
        assert_eq!(table.resolve(2025), Some((2024, &"a")));
        assert_eq!(table.resolve(2026), Some((2026, &"b")));
        assert_eq!(table.resolve(2040), Some((2026, &"b")));
        assert_eq!(YearTable::<u8>::new().resolve(2025), None);
    }

    #[test]
    fn test_bracket_tax() {
        let tables = TaxTables::default();
        let single = tables.federal_for(2025).unwrap().single;

        assert_eq!(single.tax_on(dec!(0)), dec!(0));
        assert_eq!(single.tax_on(dec!(10000)), dec!(1000.00));
        // 1192.50 + 12% of (48475 - 11925) = 1192.50 + 4386.00
        assert_eq!(single.tax_on(dec!(48475)), dec!(5578.50));
        // plus 22% of 1525
        assert_eq!(single.tax_on(dec!(50000)), dec!(5914.00));
    }

    #[test]
    fn test_thresholds_indexed_past_last_version() {
        let tables = TaxTables::default();
        let base = tables.payroll_for(2025).unwrap();
        let later = tables.payroll_for(2027).unwrap();
        assert_eq!(base.wage_base, dec!(176100));
        // 176100 * 1.025^2
        assert_eq!(later.wage_base, dec!(185015.06));
        assert_eq!(later.old_age_rate, dec!(0.062));

        let surcharge = tables.surcharge_for(2026).unwrap();
        assert_eq!(surcharge.tiers(FilingStatus::Single)[0].threshold, dec!(108650.00));
    }
}
