use ethers::types::{Address, H256, I256, U256};
use serde::Serialize;

use super::{Direction, Game};

/// Outcome of comparing one decoded call argument against the caller's expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentCheck {
    pub name: String,
    pub expected: String,
    pub actual: String,
    pub matched: bool,
}

/// Outcome of comparing one field of re-read contract state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateCheck {
    pub field: String,
    pub expected: String,
    pub actual: String,
    pub matched: bool,
}

/// Payload of `PositionClosed(gameId, player, opponent, openingPrice, closingPrice, direction, pnl)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionClosedEvent {
    pub game_id: U256,
    pub player: Address,
    pub opponent: Address,
    pub opening_price: U256,
    pub closing_price: U256,
    pub direction: Direction,
    pub pnl: I256,
}

/// Payload of `GameCreated(gameId, player1, betAmount, pool)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameCreatedEvent {
    pub game_id: U256,
    pub player1: Address,
    pub bet_amount: U256,
    pub pool: Address,
}

/// Event payload extracted while validating a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ValidatedEvent {
    PositionClosed(PositionClosedEvent),
    GameCreated(GameCreatedEvent),
}

/// Everything the validator confirmed about a mined transaction.
///
/// Only produced when every check passed; a failed check surfaces as
/// `EngineError::Validation` instead.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub tx_hash: H256,
    pub sender: Address,
    pub confirmed: bool,
    pub successful: bool,
    pub called_expected_function: bool,
    pub function: String,
    pub arguments: Vec<ArgumentCheck>,
    pub event: Option<ValidatedEvent>,
    pub state_checks: Vec<StateCheck>,
    pub game: Game,
}

impl ValidationResult {
    pub fn argument_matched(&self, name: &str) -> bool {
        self.arguments
            .iter()
            .any(|check| check.name == name && check.matched)
    }

    pub fn position_closed(&self) -> Option<&PositionClosedEvent> {
        match &self.event {
            Some(ValidatedEvent::PositionClosed(event)) => Some(event),
            _ => None,
        }
    }

    pub fn state_matched(&self, field: &str) -> bool {
        self.state_checks
            .iter()
            .any(|check| check.field == field && check.matched)
    }
}
