//! MortalCoin EVM engine: builds, signs and submits MortalCoin game
//! transactions, and audits transactions sent by counterparties.

pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{EngineError, Result, ValidationFailure};
