use ethers::types::{Address, H256};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Blockchain RPC error: {0}")]
    BlockchainRPC(String),

    #[error("Transaction simulation failed: {0}")]
    SimulationFailed(String),

    #[error("Fee strategy failed: {0}")]
    FeeStrategy(String),

    #[error("Chain id mismatch: transaction signed for {signed}, endpoint reports {current}")]
    ChainIdMismatch { signed: u64, current: u64 },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error(
        "Transaction {tx_hash:#x} not mined within {}s after {attempts} polls; it may still be mined later",
        waited.as_secs()
    )]
    Timeout {
        tx_hash: H256,
        waited: Duration,
        attempts: u64,
    },

    #[error("Transaction {0:#x} was mined but execution reverted")]
    Reverted(H256),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// The specific check of the on-chain validation protocol that rejected a transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("transaction {0:#x} is not confirmed")]
    NotConfirmed(H256),

    #[error("transaction {0:#x} execution failed")]
    ExecutionFailed(H256),

    #[error("transaction was sent to {actual:?}, expected contract {expected:?}")]
    WrongContract {
        expected: Address,
        actual: Option<Address>,
    },

    #[error("transaction did not call {function}")]
    WrongFunction { function: String },

    #[error("transaction input could not be decoded: {0}")]
    MalformedInput(String),

    #[error("{argument} mismatch: expected {expected}, got {actual}")]
    ArgumentMismatch {
        argument: String,
        expected: String,
        actual: String,
    },

    #[error("expected event {event} was not emitted by the contract")]
    EventMissing { event: String },

    #[error("{event} log could not be decoded: {reason}")]
    MalformedEvent { event: String, reason: String },

    #[error("{event} event {field} mismatch: expected {expected}, got {actual}")]
    EventMismatch {
        event: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("contract state {field} mismatch: expected {expected}, got {actual}")]
    StateMismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

impl EngineError {
    /// Timeouts are inconclusive: the transaction may still land.
    pub fn is_inconclusive(&self) -> bool {
        matches!(self, EngineError::Timeout { .. })
    }

    pub fn validation_failure(&self) -> Option<&ValidationFailure> {
        match self {
            EngineError::Validation(failure) => Some(failure),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
