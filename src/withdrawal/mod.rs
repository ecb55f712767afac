//! Withdrawal strategies and the engine that applies them to balances

mod engine;
mod strategy;

pub use engine::{SourceBalances, WithdrawalEngine, WithdrawalOutcome};
pub use strategy::{GuardrailBands, SourceOrder, StrategyState, WithdrawalPlan, WithdrawalStrategy};
