use ethers::abi::Token;
use ethers::types::{Address, I256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, Result};

/// A player's predicted price move. Encoded on-chain as `uint8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long = 0,
    Short = 1,
}

impl Direction {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn to_token(self) -> Token {
        Token::Uint(U256::from(self.as_u8()))
    }
}

impl TryFrom<u8> for Direction {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Direction::Long),
            1 => Ok(Direction::Short),
            other => Err(EngineError::BadRequest(format!(
                "Invalid direction value: {}",
                other
            ))),
        }
    }
}

impl TryFrom<U256> for Direction {
    type Error = EngineError;

    fn try_from(value: U256) -> Result<Self> {
        if value > U256::from(u8::MAX) {
            return Err(EngineError::BadRequest(format!(
                "Invalid direction value: {}",
                value
            )));
        }
        Direction::try_from(value.as_u32() as u8)
    }
}

impl FromStr for Direction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "0" => Ok(Direction::Long),
            "short" | "1" => Ok(Direction::Short),
            other => Err(EngineError::BadRequest(format!(
                "Invalid direction: {} (expected Long or Short)",
                other
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "Long"),
            Direction::Short => write!(f, "Short"),
        }
    }
}

/// Lifecycle of a game as stored by the contract. Unknown values are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    WaitingForPlayer2,
    Active,
    Finished,
    Other(u8),
}

impl From<u8> for GameState {
    fn from(value: u8) -> Self {
        match value {
            0 => GameState::WaitingForPlayer2,
            1 => GameState::Active,
            2 => GameState::Finished,
            other => GameState::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Uncommitted,
    Posted,
    Closed,
    Other(u8),
}

impl From<u8> for PositionState {
    fn from(value: u8) -> Self {
        match value {
            0 => PositionState::Uncommitted,
            1 => PositionState::Posted,
            2 => PositionState::Closed,
            other => PositionState::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub opening_price: U256,
    #[serde(with = "hex_bytes32")]
    pub hashed_direction: [u8; 32],
    pub state: PositionState,
}

/// Snapshot of `games(gameId)`. Only valid for the request that read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub game_id: U256,
    pub bet_amount: U256,
    pub player1: Option<Address>,
    pub game_end_timestamp: U256,
    pub player1_pool: Address,
    pub player2: Option<Address>,
    pub player2_pool: Address,
    pub state: GameState,
    pub player1_position: Position,
    pub player2_position: Position,
    pub player1_pnl: I256,
    pub player2_pnl: I256,
}

impl Game {
    /// Decodes the output tokens of the `games` getter.
    pub fn from_tokens(game_id: U256, tokens: Vec<Token>) -> Result<Self> {
        if tokens.len() != 11 {
            return Err(EngineError::Abi(format!(
                "games() returned {} values, expected 11",
                tokens.len()
            )));
        }
        let mut it = tokens.into_iter();
        let mut next = || it.next().ok_or_else(|| EngineError::Abi("games() output truncated".into()));

        let bet_amount = token_uint(next()?, "betAmount")?;
        let player1 = optional_address(token_address(next()?, "player1")?);
        let game_end_timestamp = token_uint(next()?, "gameEndTimestamp")?;
        let player1_pool = token_address(next()?, "player1Pool")?;
        let player2 = optional_address(token_address(next()?, "player2")?);
        let player2_pool = token_address(next()?, "player2Pool")?;
        let state = GameState::from(token_u8(next()?, "state")?);
        let player1_position = position_from_token(next()?, "player1Position")?;
        let player2_position = position_from_token(next()?, "player2Position")?;
        let player1_pnl = token_int(next()?, "player1Pnl")?;
        let player2_pnl = token_int(next()?, "player2Pnl")?;

        Ok(Game {
            game_id,
            bet_amount,
            player1,
            game_end_timestamp,
            player1_pool,
            player2,
            player2_pool,
            state,
            player1_position,
            player2_position,
            player1_pnl,
            player2_pnl,
        })
    }

    /// The position belonging to `player`, if they are seated in this game.
    pub fn position_of(&self, player: Address) -> Option<&Position> {
        if self.player1 == Some(player) {
            Some(&self.player1_position)
        } else if self.player2 == Some(player) {
            Some(&self.player2_position)
        } else {
            None
        }
    }
}

fn optional_address(address: Address) -> Option<Address> {
    if address.is_zero() {
        None
    } else {
        Some(address)
    }
}

fn position_from_token(token: Token, field: &str) -> Result<Position> {
    let Token::Tuple(parts) = token else {
        return Err(EngineError::Abi(format!("{} is not a tuple", field)));
    };
    let [opening_price, hashed_direction, state]: [Token; 3] = parts
        .try_into()
        .map_err(|_| EngineError::Abi(format!("{} must have 3 fields", field)))?;

    Ok(Position {
        opening_price: token_uint(opening_price, "openingPrice")?,
        hashed_direction: token_bytes32(hashed_direction, "hashedDirection")?,
        state: PositionState::from(token_u8(state, "state")?),
    })
}

pub(crate) fn token_uint(token: Token, field: &str) -> Result<U256> {
    token
        .into_uint()
        .ok_or_else(|| EngineError::Abi(format!("{} is not an unsigned integer", field)))
}

pub(crate) fn token_u8(token: Token, field: &str) -> Result<u8> {
    let value = token_uint(token, field)?;
    if value > U256::from(u8::MAX) {
        return Err(EngineError::Abi(format!("{} does not fit in uint8", field)));
    }
    Ok(value.as_u32() as u8)
}

pub(crate) fn token_int(token: Token, field: &str) -> Result<I256> {
    token
        .into_int()
        .map(I256::from_raw)
        .ok_or_else(|| EngineError::Abi(format!("{} is not a signed integer", field)))
}

pub(crate) fn token_address(token: Token, field: &str) -> Result<Address> {
    token
        .into_address()
        .ok_or_else(|| EngineError::Abi(format!("{} is not an address", field)))
}

pub(crate) fn token_bytes32(token: Token, field: &str) -> Result<[u8; 32]> {
    let bytes = token
        .into_fixed_bytes()
        .ok_or_else(|| EngineError::Abi(format!("{} is not fixed bytes", field)))?;
    bytes
        .try_into()
        .map_err(|_| EngineError::Abi(format!("{} is not 32 bytes long", field)))
}

pub(crate) mod hex_bytes32 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let raw = String::deserialize(deserializer)?;
        let bytes = hex::decode(raw.trim_start_matches("0x")).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("expected 32 bytes"))
    }
}

#[cfg(test)]
pub(crate) fn sample_game_tokens(
    bet_amount: U256,
    player1: Address,
    player1_pool: Address,
    player2: Address,
    player2_pool: Address,
    positions: [([u8; 32], u8); 2],
) -> Vec<Token> {
    let position = |(hash, state): ([u8; 32], u8)| {
        Token::Tuple(vec![
            Token::Uint(U256::from(1_000u64)),
            Token::FixedBytes(hash.to_vec()),
            Token::Uint(U256::from(state)),
        ])
    };
    vec![
        Token::Uint(bet_amount),
        Token::Address(player1),
        Token::Uint(U256::from(1_700_000_000u64)),
        Token::Address(player1_pool),
        Token::Address(player2),
        Token::Address(player2_pool),
        Token::Uint(U256::from(1u8)),
        position(positions[0]),
        position(positions[1]),
        Token::Int(I256::from(-5).into_raw()),
        Token::Int(I256::from(5).into_raw()),
    ]
}
