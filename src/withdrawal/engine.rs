//! Account balances, RMD overlay and source-ordered withdrawals

use log::debug;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::strategy::SourceOrder;
use crate::assumptions::RmdTable;
use crate::error::{PlannerError, PlannerResult};
use crate::household::Household;
use crate::types::{round_cents, Money, Rate};

/// Savings balances by tax character. Deferred and tax-free accounts are
/// per participant, in household order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBalances {
    pub taxable: Money,
    pub tax_deferred: Vec<Money>,
    pub tax_free: Vec<Money>,
}

impl SourceBalances {
    pub fn from_household(household: &Household) -> Self {
        Self {
            taxable: household.taxable_balance,
            tax_deferred: household
                .participants
                .iter()
                .map(|p| p.tax_deferred_balance)
                .collect(),
            tax_free: household.participants.iter().map(|p| p.tax_free_balance).collect(),
        }
    }

    /// A single taxable pot, for portfolio-only simulation
    pub fn single(balance: Money) -> Self {
        Self {
            taxable: balance,
            tax_deferred: Vec::new(),
            tax_free: Vec::new(),
        }
    }

    pub fn tax_deferred_total(&self) -> Money {
        self.tax_deferred.iter().copied().sum()
    }

    pub fn tax_free_total(&self) -> Money {
        self.tax_free.iter().copied().sum()
    }

    pub fn total(&self) -> Money {
        self.taxable + self.tax_deferred_total() + self.tax_free_total()
    }

    pub fn check_non_negative(&self) -> PlannerResult<()> {
        let negative = |label: &str, value: Money| {
            Err(PlannerError::Arithmetic(format!("{label} balance is negative ({value})")))
        };
        if self.taxable < Decimal::ZERO {
            return negative("taxable", self.taxable);
        }
        if let Some(v) = self.tax_deferred.iter().find(|v| **v < Decimal::ZERO) {
            return negative("tax-deferred", *v);
        }
        if let Some(v) = self.tax_free.iter().find(|v| **v < Decimal::ZERO) {
            return negative("tax-free", *v);
        }
        Ok(())
    }

    /// Grow every account by `rate`, flooring at zero
    ///
    /// Returns the dollar growth, or an arithmetic error when a balance
    /// leaves the decimal range.
    pub fn apply_growth(&mut self, rate: Rate) -> PlannerResult<Money> {
        let factor = (Decimal::ONE + rate).max(Decimal::ZERO);
        let before = self.total();
        let grow = |v: &mut Money| -> PlannerResult<()> {
            let grown = v
                .checked_mul(factor)
                .ok_or_else(|| PlannerError::Arithmetic(format!("balance {v} overflows growing at {rate}")))?;
            *v = round_cents(grown);
            Ok(())
        };
        grow(&mut self.taxable)?;
        self.tax_deferred.iter_mut().try_for_each(&grow)?;
        self.tax_free.iter_mut().try_for_each(&grow)?;

        let after = std::iter::once(self.taxable)
            .chain(self.tax_deferred.iter().copied())
            .chain(self.tax_free.iter().copied())
            .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
            .ok_or_else(|| PlannerError::Arithmetic(format!("total balance overflows growing at {rate}")))?;
        Ok(after - before)
    }

    /// Move a deceased participant's accounts to the survivor
    pub fn roll_over(&mut self, from: usize, to: usize) {
        if from == to || from >= self.tax_deferred.len() || to >= self.tax_deferred.len() {
            return;
        }
        let deferred = std::mem::take(&mut self.tax_deferred[from]);
        self.tax_deferred[to] += deferred;
        let free = std::mem::take(&mut self.tax_free[from]);
        self.tax_free[to] += free;
    }
}

/// Realized withdrawal by tax character
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalOutcome {
    /// Strategy amount before the RMD overlay
    pub requested: Money,
    /// Sum of required minimums
    pub required_minimum: Money,
    pub taxable: Money,
    pub tax_deferred: Money,
    pub tax_free: Money,
    /// Requested beyond what the balances could supply
    pub unmet: Money,
}

impl WithdrawalOutcome {
    pub fn realized(&self) -> Money {
        self.taxable + self.tax_deferred + self.tax_free
    }
}

/// Take up to `amount` from `accounts` in order; returns the amount taken
fn draw_in_order(accounts: &mut [Money], amount: Money) -> Money {
    let mut remaining = amount;
    for balance in accounts.iter_mut() {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = remaining.min(*balance);
        *balance -= take;
        remaining -= take;
    }
    amount - remaining
}

pub struct WithdrawalEngine<'a> {
    rmd: &'a RmdTable,
}

impl<'a> WithdrawalEngine<'a> {
    pub fn new(rmd: &'a RmdTable) -> Self {
        Self { rmd }
    }

    /// Required minimum per deferred account
    ///
    /// `owners` gives (age, birth year) for each account owner, `None` for
    /// accounts with no living owner.
    pub fn required_minimums(
        &self,
        balances: &SourceBalances,
        owners: &[Option<(u32, i32)>],
    ) -> Vec<Money> {
        balances
            .tax_deferred
            .iter()
            .zip(owners)
            .map(|(balance, owner)| match owner {
                Some((age, birth_year)) => self.rmd.required_minimum(*balance, *age, *birth_year),
                None => Decimal::ZERO,
            })
            .collect()
    }

    /// Withdraw max(`amount`, sum of `minimums`) following `order`
    ///
    /// Minimums come out of their own deferred accounts first, then the
    /// taxable account, then tax-advantaged accounts per `order`. Requests
    /// beyond the total balance are clipped and reported as unmet.
    pub fn withdraw(
        &self,
        balances: &mut SourceBalances,
        amount: Money,
        minimums: &[Money],
        order: SourceOrder,
    ) -> PlannerResult<WithdrawalOutcome> {
        balances.check_non_negative()?;
        if amount < Decimal::ZERO {
            return Err(PlannerError::Arithmetic(format!(
                "negative withdrawal request ({amount})"
            )));
        }

        let mut outcome = WithdrawalOutcome {
            requested: amount,
            ..WithdrawalOutcome::default()
        };

        for (balance, minimum) in balances.tax_deferred.iter_mut().zip(minimums) {
            let take = (*minimum).min(*balance).max(Decimal::ZERO);
            *balance -= take;
            outcome.required_minimum += take;
            outcome.tax_deferred += take;
        }

        let target = amount.max(outcome.required_minimum);
        let mut remaining = target - outcome.required_minimum;

        let from_taxable = remaining.min(balances.taxable);
        balances.taxable -= from_taxable;
        outcome.taxable = from_taxable;
        remaining -= from_taxable;

        if remaining > Decimal::ZERO {
            match order {
                SourceOrder::TaxFreeFirst => {
                    let free = draw_in_order(&mut balances.tax_free, remaining);
                    remaining -= free;
                    let deferred = draw_in_order(&mut balances.tax_deferred, remaining);
                    remaining -= deferred;
                    outcome.tax_free += free;
                    outcome.tax_deferred += deferred;
                }
                SourceOrder::TaxDeferredFirst => {
                    let deferred = draw_in_order(&mut balances.tax_deferred, remaining);
                    remaining -= deferred;
                    let free = draw_in_order(&mut balances.tax_free, remaining);
                    remaining -= free;
                    outcome.tax_free += free;
                    outcome.tax_deferred += deferred;
                }
                SourceOrder::ProRata => {
                    let free_total = balances.tax_free_total();
                    let pool = free_total + balances.tax_deferred_total();
                    let free_share = if pool > Decimal::ZERO {
                        round_cents(remaining * free_total / pool)
                    } else {
                        Decimal::ZERO
                    };
                    let free = draw_in_order(&mut balances.tax_free, free_share);
                    remaining -= free;
                    let deferred = draw_in_order(&mut balances.tax_deferred, remaining);
                    remaining -= deferred;
                    // Rounding leftovers
                    let extra = draw_in_order(&mut balances.tax_free, remaining);
                    remaining -= extra;
                    outcome.tax_free += free + extra;
                    outcome.tax_deferred += deferred;
                }
            }
        }

        outcome.unmet = remaining.max(Decimal::ZERO);
        Ok(outcome)
    }

    /// Smallest withdrawal whose resulting net income reaches `target_net`
    ///
    /// `net_for(w)` returns the year's net income with a withdrawal of `w`.
    /// Never exceeds `available`.
    pub fn solve_need<F>(&self, target_net: Money, available: Money, mut net_for: F) -> PlannerResult<Money>
    where
        F: FnMut(Money) -> PlannerResult<Money>,
    {
        const MAX_ITERATIONS: u32 = 50;
        let tolerance = dec!(0.01);

        let base = net_for(Decimal::ZERO)?;
        if base >= target_net || available <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        let mut withdrawal = (target_net - base).min(available);
        for _ in 0..MAX_ITERATIONS {
            let shortfall = target_net - net_for(withdrawal)?;
            if shortfall.abs() <= tolerance {
                return Ok(withdrawal);
            }
            let next = round_cents((withdrawal + shortfall).max(Decimal::ZERO).min(available));
            if next == withdrawal {
                return Ok(withdrawal);
            }
            withdrawal = next;
        }
        debug!("need solve stopped at {withdrawal} after {MAX_ITERATIONS} iterations");
        Ok(withdrawal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balances() -> SourceBalances {
        SourceBalances {
            taxable: dec!(10000),
            tax_deferred: vec![dec!(100000), dec!(50000)],
            tax_free: vec![dec!(20000), dec!(0)],
        }
    }

    #[test]
    fn test_taxable_then_tax_free_first() {
        let rmd = RmdTable::default();
        let engine = WithdrawalEngine::new(&rmd);
        let mut b = balances();

        let out = engine
            .withdraw(&mut b, dec!(50000), &[dec!(0), dec!(0)], SourceOrder::TaxFreeFirst)
            .unwrap();
        assert_eq!(out.taxable, dec!(10000));
        assert_eq!(out.tax_free, dec!(20000));
        assert_eq!(out.tax_deferred, dec!(20000));
        assert_eq!(out.unmet, dec!(0));
        assert_eq!(b.total(), dec!(130000));
        assert_eq!(b.tax_deferred, vec![dec!(80000), dec!(50000)]);
    }

    #[test]
    fn test_tax_deferred_first_and_pro_rata() {
        let rmd = RmdTable::default();
        let engine = WithdrawalEngine::new(&rmd);

        let mut b = balances();
        let out = engine
            .withdraw(&mut b, dec!(40000), &[], SourceOrder::TaxDeferredFirst)
            .unwrap();
        assert_eq!(out.tax_deferred, dec!(30000));
        assert_eq!(out.tax_free, dec!(0));

        let mut b = balances();
        let out = engine
            .withdraw(&mut b, dec!(27000), &[], SourceOrder::ProRata)
            .unwrap();
        // 17000 split 20000:150000
        assert_eq!(out.tax_free, dec!(2000.00));
        assert_eq!(out.tax_deferred, dec!(15000.00));
        assert_eq!(out.realized(), dec!(27000));
    }

    #[test]
    fn test_minimum_overrides_smaller_request() {
        let rmd = RmdTable::default();
        let engine = WithdrawalEngine::new(&rmd);
        let mut b = balances();

        let out = engine
            .withdraw(&mut b, dec!(0), &[dec!(4000), dec!(2000)], SourceOrder::TaxFreeFirst)
            .unwrap();
        assert_eq!(out.required_minimum, dec!(6000));
        assert_eq!(out.tax_deferred, dec!(6000));
        assert_eq!(out.taxable, dec!(0));
        assert_eq!(b.tax_deferred, vec![dec!(96000), dec!(48000)]);
    }

    #[test]
    fn test_clipping_records_unmet() {
        let rmd = RmdTable::default();
        let engine = WithdrawalEngine::new(&rmd);
        let mut b = balances();

        let out = engine
            .withdraw(&mut b, dec!(200000), &[], SourceOrder::TaxFreeFirst)
            .unwrap();
        assert_eq!(out.realized(), dec!(180000));
        assert_eq!(out.unmet, dec!(20000));
        assert_eq!(b.total(), dec!(0));
    }

    #[test]
    fn test_negative_balance_is_arithmetic_error() {
        let rmd = RmdTable::default();
        let engine = WithdrawalEngine::new(&rmd);
        let mut b = balances();
        b.tax_free[1] = dec!(-5);
        assert!(matches!(
            engine.withdraw(&mut b, dec!(100), &[], SourceOrder::TaxFreeFirst),
            Err(PlannerError::Arithmetic(_))
        ));
    }

    #[test]
    fn test_required_minimums_by_owner() {
        let rmd = RmdTable::default();
        let engine = WithdrawalEngine::new(&rmd);
        let b = SourceBalances {
            taxable: dec!(0),
            tax_deferred: vec![dec!(265000), dec!(265000)],
            tax_free: vec![dec!(0), dec!(0)],
        };
        let mins = engine.required_minimums(&b, &[Some((73, 1955)), Some((70, 1958))]);
        assert_eq!(mins, vec![dec!(10000.00), dec!(0)]);
        let mins = engine.required_minimums(&b, &[None, Some((73, 1952))]);
        assert_eq!(mins, vec![dec!(0), dec!(10000.00)]);
    }

    #[test]
    fn test_solve_need_grosses_up_for_tax() {
        let rmd = RmdTable::default();
        let engine = WithdrawalEngine::new(&rmd);
        // Other net income 20000, withdrawals taxed at a flat 20%
        let net_for = |w: Money| Ok(dec!(20000) + w * dec!(0.8));

        let w = engine.solve_need(dec!(60000), dec!(1000000), net_for).unwrap();
        assert!((w - dec!(50000)).abs() <= dec!(0.02));

        // Capped by what is available
        let w = engine.solve_need(dec!(60000), dec!(30000), net_for).unwrap();
        assert_eq!(w, dec!(30000));

        // Already above target
        let w = engine.solve_need(dec!(10000), dec!(30000), net_for).unwrap();
        assert_eq!(w, dec!(0));
    }

    #[test]
    fn test_growth_and_roll_over() {
        let mut b = balances();
        let growth = b.apply_growth(dec!(0.10)).unwrap();
        assert_eq!(growth, dec!(18000.00));

        b.roll_over(0, 1);
        assert_eq!(b.tax_deferred, vec![dec!(0), dec!(165000.00)]);
        assert_eq!(b.tax_free, vec![dec!(0), dec!(22000.00)]);

        let mut b = balances();
        b.apply_growth(dec!(-1.5)).unwrap();
        assert_eq!(b.total(), dec!(0));
    }

    #[test]
    fn test_growth_overflow_is_arithmetic_error() {
        let mut b = SourceBalances::single(Decimal::MAX / dec!(2));
        let err = b.apply_growth(dec!(9)).unwrap_err();
        assert!(matches!(err, PlannerError::Arithmetic(_)));
    }
}
