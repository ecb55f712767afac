//! Household data structures and the built-in demo household

mod data;
pub mod sample;

pub use data::{FilingStatus, Household, Participant};
