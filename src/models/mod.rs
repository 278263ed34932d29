// src/models/mod.rs
pub mod game;
pub mod validation;

pub use game::{Direction, Game, GameState, Position, PositionState};
pub use validation::{
    ArgumentCheck, GameCreatedEvent, PositionClosedEvent, StateCheck, ValidatedEvent,
    ValidationResult,
};
