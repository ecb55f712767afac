//! Required minimum distribution (RMD) rules
//!
//! Onset age depends on birth cohort; the minimum for a year is the prior
//! balance divided by the uniform lifetime divisor for the attained age.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{round_cents, Money};

/// Uniform lifetime divisors by attained age
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RmdTable {
    /// (age, divisor), ascending by age
    divisors: Vec<(u32, Decimal)>,
}

impl Default for RmdTable {
    fn default() -> Self {
        // Uniform Lifetime Table in effect from 2022
        let divisors = vec![
            (72, dec!(27.4)),
            (73, dec!(26.5)),
            (74, dec!(25.5)),
            (75, dec!(24.6)),
            (76, dec!(23.7)),
            (77, dec!(22.9)),
            (78, dec!(22.0)),
            (79, dec!(21.1)),
            (80, dec!(20.2)),
            (81, dec!(19.4)),
            (82, dec!(18.5)),
            (83, dec!(17.7)),
            (84, dec!(16.8)),
            (85, dec!(16.0)),
            (86, dec!(15.2)),
            (87, dec!(14.4)),
            (88, dec!(13.7)),
            (89, dec!(12.9)),
            (90, dec!(12.2)),
            (91, dec!(11.5)),
            (92, dec!(10.8)),
            (93, dec!(10.1)),
            (94, dec!(9.5)),
            (95, dec!(8.9)),
            (96, dec!(8.4)),
            (97, dec!(7.8)),
            (98, dec!(7.3)),
            (99, dec!(6.8)),
            (100, dec!(6.4)),
            (101, dec!(6.0)),
            (102, dec!(5.6)),
            (103, dec!(5.2)),
            (104, dec!(4.9)),
            (105, dec!(4.6)),
            (106, dec!(4.3)),
            (107, dec!(4.1)),
            (108, dec!(3.9)),
            (109, dec!(3.7)),
            (110, dec!(3.5)),
            (111, dec!(3.4)),
            (112, dec!(3.3)),
            (113, dec!(3.1)),
            (114, dec!(3.0)),
            (115, dec!(2.9)),
            (116, dec!(2.8)),
            (117, dec!(2.7)),
            (118, dec!(2.5)),
            (119, dec!(2.3)),
            (120, dec!(2.0)),
        ];
        Self { divisors }
    }
}

impl RmdTable {
    pub fn from_divisors(mut divisors: Vec<(u32, Decimal)>) -> Self {
        divisors.sort_by_key(|(age, _)| *age);
        Self { divisors }
    }

    /// RMD onset age for a birth cohort
    pub fn onset_age(&self, birth_year: i32) -> u32 {
        if birth_year <= 1950 {
            72
        } else if birth_year <= 1959 {
            73
        } else {
            75
        }
    }

    /// Divisor for `age`; ages past the table use the last divisor
    pub fn divisor(&self, age: u32) -> Option<Decimal> {
        let (first_age, _) = self.divisors.first()?;
        if age < *first_age {
            return None;
        }
        self.divisors
            .iter()
            .find(|(a, _)| *a == age)
            .or_else(|| self.divisors.last())
            .map(|(_, d)| *d)
    }

    /// Minimum distribution for a participant of `age` born in `birth_year`
    pub fn required_minimum(&self, balance: Money, age: u32, birth_year: i32) -> Money {
        if age < self.onset_age(birth_year) || balance <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        match self.divisor(age) {
            Some(d) if d > Decimal::ZERO => round_cents(balance / d),
            _ => Decimal::ZERO,
        }
    }
}
