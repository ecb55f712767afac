//! Withdrawal strategies and their year-to-year state

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, PlannerResult};
use crate::types::{round_cents, Money, Rate};

/// Guardrail band policy
///
/// When the current withdrawal rate rises above `upper` x the initial rate
/// the withdrawal is cut by `adjustment`; below `lower` x it is raised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuardrailBands {
    pub lower: Decimal,
    pub upper: Decimal,
    pub adjustment: Rate,
}

impl Default for GuardrailBands {
    fn default() -> Self {
        Self {
            lower: dec!(0.8),
            upper: dec!(1.2),
            adjustment: dec!(0.10),
        }
    }
}

/// How much to draw from savings each year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WithdrawalStrategy {
    /// Draw nothing beyond required minimums
    None,
    /// Same nominal amount every year
    FixedAmount { annual: Money },
    /// Initial rate times the starting balance, then grown with inflation
    InflationIndexed { initial_rate: Rate },
    /// Fixed fraction of the current balance
    PercentOfBalance { rate: Rate },
    /// Whatever it takes to reach a monthly net income target
    TargetIncome { monthly_net: Money },
    /// Inflation-indexed amount nudged by guardrail bands
    Guardrails {
        initial_rate: Rate,
        #[serde(default)]
        bands: GuardrailBands,
    },
}

impl Default for WithdrawalStrategy {
    fn default() -> Self {
        WithdrawalStrategy::InflationIndexed {
            initial_rate: dec!(0.04),
        }
    }
}

impl WithdrawalStrategy {
    pub fn validate(&self) -> PlannerResult<()> {
        let check_rate = |field: &str, rate: Rate| {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                Err(PlannerError::config(field, format!("rate {rate} outside [0, 1]")))
            } else {
                Ok(())
            }
        };
        match self {
            WithdrawalStrategy::None => Ok(()),
            WithdrawalStrategy::FixedAmount { annual } if *annual < Decimal::ZERO => Err(
                PlannerError::config("withdrawal.annual", "must not be negative"),
            ),
            WithdrawalStrategy::FixedAmount { .. } => Ok(()),
            WithdrawalStrategy::InflationIndexed { initial_rate } => {
                check_rate("withdrawal.initial_rate", *initial_rate)
            }
            WithdrawalStrategy::PercentOfBalance { rate } => check_rate("withdrawal.rate", *rate),
            WithdrawalStrategy::TargetIncome { monthly_net } if *monthly_net < Decimal::ZERO => Err(
                PlannerError::config("withdrawal.monthly_net", "must not be negative"),
            ),
            WithdrawalStrategy::TargetIncome { .. } => Ok(()),
            WithdrawalStrategy::Guardrails {
                initial_rate,
                bands,
            } => {
                check_rate("withdrawal.initial_rate", *initial_rate)?;
                if bands.lower <= Decimal::ZERO || bands.lower >= bands.upper {
                    return Err(PlannerError::config(
                        "withdrawal.bands",
                        "lower band must be positive and below the upper band",
                    ));
                }
                check_rate("withdrawal.bands.adjustment", bands.adjustment)
            }
        }
    }

    /// The rate parameter, for rate-driven strategies
    pub fn rate(&self) -> Option<Rate> {
        match self {
            WithdrawalStrategy::InflationIndexed { initial_rate }
            | WithdrawalStrategy::Guardrails { initial_rate, .. } => Some(*initial_rate),
            WithdrawalStrategy::PercentOfBalance { rate } => Some(*rate),
            _ => None,
        }
    }

    /// Copy with the rate parameter replaced
    pub fn with_rate(&self, new_rate: Rate) -> PlannerResult<Self> {
        match self {
            WithdrawalStrategy::InflationIndexed { .. } => Ok(WithdrawalStrategy::InflationIndexed {
                initial_rate: new_rate,
            }),
            WithdrawalStrategy::PercentOfBalance { .. } => {
                Ok(WithdrawalStrategy::PercentOfBalance { rate: new_rate })
            }
            WithdrawalStrategy::Guardrails { bands, .. } => Ok(WithdrawalStrategy::Guardrails {
                initial_rate: new_rate,
                bands: *bands,
            }),
            other => Err(PlannerError::config(
                "withdrawal.strategy",
                format!("{} has no withdrawal rate", other.name()),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WithdrawalStrategy::None => "none",
            WithdrawalStrategy::FixedAmount { .. } => "fixed-amount",
            WithdrawalStrategy::InflationIndexed { .. } => "inflation-indexed",
            WithdrawalStrategy::PercentOfBalance { .. } => "percent-of-balance",
            WithdrawalStrategy::TargetIncome { .. } => "target-income",
            WithdrawalStrategy::Guardrails { .. } => "guardrails",
        }
    }
}

/// Order in which tax-advantaged accounts are drawn. The taxable account is
/// always drawn first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceOrder {
    #[default]
    TaxFreeFirst,
    TaxDeferredFirst,
    ProRata,
}

/// Strategy plus sourcing policy, as carried by a scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalPlan {
    pub strategy: WithdrawalStrategy,
    #[serde(default)]
    pub source_order: SourceOrder,
}

/// Carried between years for strategies that depend on history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyState {
    /// Balance when withdrawals began
    pub initial_balance: Option<Money>,
    /// Strategy amount of the previous withdrawal year
    pub last_amount: Option<Money>,
    pub years_drawn: u32,
}

impl StrategyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strategy amount before any RMD overlay or clipping
    ///
    /// `balance` is the start-of-year balance across all accounts and
    /// `inflation` the year's price change. Target-income amounts are
    /// solved by the projection and are not produced here.
    pub fn next_amount(
        &mut self,
        strategy: &WithdrawalStrategy,
        balance: Money,
        inflation: Rate,
    ) -> Money {
        let initial_balance = *self.initial_balance.get_or_insert(balance);
        let grown = |last: Money| round_cents(last * (Decimal::ONE + inflation));

        let amount = match strategy {
            WithdrawalStrategy::None | WithdrawalStrategy::TargetIncome { .. } => Decimal::ZERO,
            WithdrawalStrategy::FixedAmount { annual } => *annual,
            WithdrawalStrategy::InflationIndexed { initial_rate } => match self.last_amount {
                None => round_cents(initial_balance * *initial_rate),
                Some(last) => grown(last),
            },
            WithdrawalStrategy::PercentOfBalance { rate } => round_cents(balance * *rate),
            WithdrawalStrategy::Guardrails {
                initial_rate,
                bands,
            } => match self.last_amount {
                None => round_cents(initial_balance * *initial_rate),
                Some(last) => {
                    let candidate = grown(last);
                    if balance <= Decimal::ZERO {
                        candidate
                    } else {
                        let current_rate = candidate / balance;
                        if current_rate > *initial_rate * bands.upper {
                            round_cents(candidate * (Decimal::ONE - bands.adjustment))
                        } else if current_rate < *initial_rate * bands.lower {
                            round_cents(candidate * (Decimal::ONE + bands.adjustment))
                        } else {
                            candidate
                        }
                    }
                }
            },
        };

        self.last_amount = Some(amount);
        self.years_drawn += 1;
        amount
    }

    /// Record a solved target-income amount
    pub fn record(&mut self, balance: Money, amount: Money) {
        self.initial_balance.get_or_insert(balance);
        self.last_amount = Some(amount);
        self.years_drawn += 1;
    }
}
