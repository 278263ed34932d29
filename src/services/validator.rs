use ethers::abi::{Function, Token};
use ethers::types::{Address, Transaction, TransactionReceipt, H256, U256, U64};
use ethers::utils::to_checksum;

use crate::{
    constants::{EVENT_GAME_CREATED, EVENT_POSITION_CLOSED},
    crypto::commitment::commit,
    error::{EngineError, Result, ValidationFailure},
    models::{
        ArgumentCheck, Direction, Game, Position, PositionState, StateCheck, ValidatedEvent,
        ValidationResult,
    },
};

use super::contract::{GameFunction, MortalCoinContract};
use super::onchain::ChainClient;

/// Value a decoded call argument must equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    Uint(U256),
    Address(Address),
    Bytes32([u8; 32]),
    Direction(Direction),
}

impl Expected {
    fn render(&self) -> String {
        match self {
            Expected::Uint(value) => value.to_string(),
            Expected::Address(address) => to_checksum(address, None),
            Expected::Bytes32(bytes) => format!("0x{}", hex::encode(bytes)),
            Expected::Direction(direction) => direction.to_string(),
        }
    }

    /// Addresses compare as parsed bytes, so checksum casing never matters.
    fn check(&self, token: &Token) -> (bool, String) {
        match (self, token) {
            (Expected::Uint(expected), Token::Uint(actual)) => (expected == actual, actual.to_string()),
            (Expected::Address(expected), Token::Address(actual)) => {
                (expected == actual, to_checksum(actual, None))
            }
            (Expected::Bytes32(expected), Token::FixedBytes(actual)) => (
                expected.as_slice() == actual.as_slice(),
                format!("0x{}", hex::encode(actual)),
            ),
            (Expected::Direction(expected), Token::Uint(actual)) => match Direction::try_from(*actual) {
                Ok(direction) => (*expected == direction, direction.to_string()),
                Err(_) => (false, actual.to_string()),
            },
            (_, other) => (false, format!("{:?}", other)),
        }
    }
}

/// Locates an argument in the decoded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentKey {
    Position(usize),
    /// Parameter name as declared in the contract ABI.
    Name(&'static str),
}

/// One argument of the expected call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentExpectation {
    pub key: ArgumentKey,
    pub label: &'static str,
    pub expected: Expected,
}

impl ArgumentExpectation {
    pub fn new(index: usize, label: &'static str, expected: Expected) -> Self {
        Self {
            key: ArgumentKey::Position(index),
            label,
            expected,
        }
    }

    pub fn named(name: &'static str, label: &'static str, expected: Expected) -> Self {
        Self {
            key: ArgumentKey::Name(name),
            label,
            expected,
        }
    }

    fn resolve(&self, function: &Function) -> Result<usize> {
        match self.key {
            ArgumentKey::Position(index) => Ok(index),
            ArgumentKey::Name(name) => function
                .inputs
                .iter()
                .position(|param| param.name == name)
                .ok_or_else(|| {
                    EngineError::Abi(format!("{} has no parameter named {}", function.name, name))
                }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventExpectation {
    /// Emitted for the sender in `game_id`, with the revealed direction.
    PositionClosed { game_id: U256 },
    /// Checked only when the contract ABI declares `GameCreated`.
    GameCreated { game_id: U256, pool: Address },
}

/// Contract state that must hold after the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateExpectation {
    GameExists,
    BetAmountEqualsValue,
    Player1IsSender,
    Player2IsSender,
    Player1Pool(Address),
    Player2Pool(Address),
    SenderCommitment([u8; 32]),
    SenderPositionCommitted,
    /// `commit(gameId, direction, nonce)` from the calldata equals the sender's stored commitment.
    RevealMatchesCommitment,
}

/// Everything a transaction must satisfy to be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallExpectation {
    pub function: GameFunction,
    pub game_id: U256,
    pub arguments: Vec<ArgumentExpectation>,
    pub event: Option<EventExpectation>,
    pub state: Vec<StateExpectation>,
}

/// Re-derives what a mined transaction did and compares it with what a counterparty claims.
#[derive(Debug, Clone)]
pub struct CallValidator {
    contract: MortalCoinContract,
}

impl CallValidator {
    pub fn new(contract: MortalCoinContract) -> Self {
        Self { contract }
    }

    /// Runs the checks in order and stops at the first failure:
    /// receipt status, destination, selector, arguments, event, state.
    pub async fn validate<C: ChainClient + ?Sized>(
        &self,
        client: &C,
        tx_hash: H256,
        expectation: &CallExpectation,
    ) -> Result<ValidationResult> {
        let function = expectation.function;
        tracing::info!("Validating {} transaction {:#x}", function.name(), tx_hash);

        let (receipt, tx) = self.confirmed_transaction(client, tx_hash).await?;

        if tx.to != Some(self.contract.address()) {
            return Err(ValidationFailure::WrongContract {
                expected: self.contract.address(),
                actual: tx.to,
            }
            .into());
        }

        if tx.input.get(..4) != Some(&function.selector()[..]) {
            return Err(ValidationFailure::WrongFunction {
                function: function.name().to_string(),
            }
            .into());
        }

        let tokens = self
            .contract
            .decode_input(function.name(), &tx.input)
            .map_err(|e| ValidationFailure::MalformedInput(e.to_string()))?;
        let arguments = check_arguments(
            self.contract.function(function.name())?,
            &tokens,
            &expectation.arguments,
        )?;

        let event = match &expectation.event {
            Some(expected) => self.check_event(&receipt, &tx, &tokens, expected)?,
            None => None,
        };

        let game = self.contract.game(client, expectation.game_id).await?;
        let mut state_checks = Vec::with_capacity(expectation.state.len());
        for expected in &expectation.state {
            let check = evaluate_state(expected, &game, &tx, &tokens)?;
            if !check.matched {
                return Err(ValidationFailure::StateMismatch {
                    field: check.field,
                    expected: check.expected,
                    actual: check.actual,
                }
                .into());
            }
            state_checks.push(check);
        }

        tracing::info!("Transaction {:#x} validated as {}", tx_hash, function.name());
        Ok(ValidationResult {
            tx_hash,
            sender: tx.from,
            confirmed: true,
            successful: true,
            called_expected_function: true,
            function: function.name().to_string(),
            arguments,
            event,
            state_checks,
            game,
        })
    }

    /// A `createGame` call from the game's player 1 with `pool` and the bet as value.
    pub async fn validate_create_game<C: ChainClient + ?Sized>(
        &self,
        client: &C,
        tx_hash: H256,
        game_id: U256,
        pool: Address,
    ) -> Result<ValidationResult> {
        let expectation = CallExpectation {
            function: GameFunction::CreateGame,
            game_id,
            arguments: vec![ArgumentExpectation::new(0, "pool address", Expected::Address(pool))],
            event: Some(EventExpectation::GameCreated { game_id, pool }),
            state: vec![
                StateExpectation::GameExists,
                StateExpectation::Player1IsSender,
                StateExpectation::Player1Pool(pool),
                StateExpectation::BetAmountEqualsValue,
            ],
        };
        self.validate(client, tx_hash, &expectation).await
    }

    /// A `joinGame` call seating the sender as player 2 with `pool`, paying the bet amount.
    pub async fn validate_join_game<C: ChainClient + ?Sized>(
        &self,
        client: &C,
        tx_hash: H256,
        game_id: U256,
        pool: Address,
    ) -> Result<ValidationResult> {
        let expectation = CallExpectation {
            function: GameFunction::JoinGame,
            game_id,
            arguments: vec![
                ArgumentExpectation::new(0, "game id", Expected::Uint(game_id)),
                ArgumentExpectation::new(1, "pool address", Expected::Address(pool)),
            ],
            event: None,
            state: vec![
                StateExpectation::Player2IsSender,
                StateExpectation::Player2Pool(pool),
                StateExpectation::BetAmountEqualsValue,
            ],
        };
        self.validate(client, tx_hash, &expectation).await
    }

    pub async fn validate_post_position<C: ChainClient + ?Sized>(
        &self,
        client: &C,
        tx_hash: H256,
        game_id: U256,
        hashed_direction: [u8; 32],
    ) -> Result<ValidationResult> {
        let expectation = CallExpectation {
            function: GameFunction::PostPosition,
            game_id,
            arguments: vec![
                ArgumentExpectation::new(0, "game id", Expected::Uint(game_id)),
                ArgumentExpectation::new(1, "hashed direction", Expected::Bytes32(hashed_direction)),
            ],
            event: None,
            state: vec![
                StateExpectation::SenderCommitment(hashed_direction),
                StateExpectation::SenderPositionCommitted,
            ],
        };
        self.validate(client, tx_hash, &expectation).await
    }

    /// A `closePosition` reveal. `direction` and `nonce` are optional because an
    /// auditor may only learn them from the transaction itself; the revealed
    /// values are always checked against the stored commitment.
    pub async fn validate_close_position<C: ChainClient + ?Sized>(
        &self,
        client: &C,
        tx_hash: H256,
        game_id: U256,
        direction: Option<Direction>,
        nonce: Option<U256>,
    ) -> Result<ValidationResult> {
        let mut arguments = vec![ArgumentExpectation::new(0, "game id", Expected::Uint(game_id))];
        if let Some(direction) = direction {
            arguments.push(ArgumentExpectation::new(1, "direction", Expected::Direction(direction)));
        }
        if let Some(nonce) = nonce {
            arguments.push(ArgumentExpectation::new(2, "nonce", Expected::Uint(nonce)));
        }

        let expectation = CallExpectation {
            function: GameFunction::ClosePosition,
            game_id,
            arguments,
            event: Some(EventExpectation::PositionClosed { game_id }),
            state: vec![StateExpectation::RevealMatchesCommitment],
        };
        self.validate(client, tx_hash, &expectation).await
    }

    async fn confirmed_transaction<C: ChainClient + ?Sized>(
        &self,
        client: &C,
        tx_hash: H256,
    ) -> Result<(TransactionReceipt, Transaction)> {
        let receipt = client
            .transaction_receipt(tx_hash)
            .await?
            .ok_or(ValidationFailure::NotConfirmed(tx_hash))?;
        if receipt.status != Some(U64::one()) {
            return Err(ValidationFailure::ExecutionFailed(tx_hash).into());
        }
        let tx = client
            .transaction(tx_hash)
            .await?
            .ok_or(ValidationFailure::NotConfirmed(tx_hash))?;
        Ok((receipt, tx))
    }

    fn check_event(
        &self,
        receipt: &TransactionReceipt,
        tx: &Transaction,
        tokens: &[Token],
        expected: &EventExpectation,
    ) -> Result<Option<ValidatedEvent>> {
        match expected {
            EventExpectation::PositionClosed { game_id } => {
                let mut events = Vec::new();
                let mut decode_error = None;
                for log in self.contract.matching_logs(&receipt.logs, EVENT_POSITION_CLOSED) {
                    match self.contract.decode_position_closed(log) {
                        Ok(event) => events.push(event),
                        Err(err) => {
                            tracing::warn!("Undecodable PositionClosed log: {}", err);
                            decode_error.get_or_insert(err.to_string());
                        }
                    }
                }
                let Some(event) = events
                    .iter()
                    .find(|event| event.game_id == *game_id && event.player == tx.from)
                    .or_else(|| events.first())
                    .cloned()
                else {
                    let failure = match decode_error {
                        Some(reason) => ValidationFailure::MalformedEvent {
                            event: "PositionClosed".to_string(),
                            reason,
                        },
                        None => ValidationFailure::EventMissing {
                            event: "PositionClosed".to_string(),
                        },
                    };
                    return Err(failure.into());
                };

                event_field("PositionClosed", "gameId", game_id.to_string(), event.game_id.to_string())?;
                event_field(
                    "PositionClosed",
                    "player",
                    to_checksum(&tx.from, None),
                    to_checksum(&event.player, None),
                )?;
                if let Some(revealed) = tokens.get(1).and_then(|t| t.clone().into_uint()) {
                    let revealed = revealed_direction(revealed)?;
                    event_field(
                        "PositionClosed",
                        "direction",
                        revealed.to_string(),
                        event.direction.to_string(),
                    )?;
                }
                Ok(Some(ValidatedEvent::PositionClosed(event)))
            }
            EventExpectation::GameCreated { game_id, pool } => {
                if !self.contract.has_game_created_event() {
                    tracing::debug!("Contract ABI declares no GameCreated event, skipping event check");
                    return Ok(None);
                }
                let log = self
                    .contract
                    .matching_logs(&receipt.logs, EVENT_GAME_CREATED)
                    .into_iter()
                    .next()
                    .ok_or_else(|| ValidationFailure::EventMissing {
                        event: "GameCreated".to_string(),
                    })?;
                let event = self.contract.decode_game_created(log).map_err(|err| {
                    ValidationFailure::MalformedEvent {
                        event: "GameCreated".to_string(),
                        reason: err.to_string(),
                    }
                })?;

                event_field("GameCreated", "gameId", game_id.to_string(), event.game_id.to_string())?;
                event_field(
                    "GameCreated",
                    "player1",
                    to_checksum(&tx.from, None),
                    to_checksum(&event.player1, None),
                )?;
                event_field(
                    "GameCreated",
                    "pool",
                    to_checksum(pool, None),
                    to_checksum(&event.pool, None),
                )?;
                event_field(
                    "GameCreated",
                    "betAmount",
                    tx.value.to_string(),
                    event.bet_amount.to_string(),
                )?;
                Ok(Some(ValidatedEvent::GameCreated(event)))
            }
        }
    }
}

fn check_arguments(
    function: &Function,
    tokens: &[Token],
    expectations: &[ArgumentExpectation],
) -> Result<Vec<ArgumentCheck>> {
    let mut checks = Vec::with_capacity(expectations.len());
    for expectation in expectations {
        let index = expectation.resolve(function)?;
        let token = tokens.get(index).ok_or_else(|| {
            ValidationFailure::MalformedInput(format!(
                "call has no argument #{} ({})",
                index, expectation.label
            ))
        })?;
        let (matched, actual) = expectation.expected.check(token);
        let check = ArgumentCheck {
            name: expectation.label.to_string(),
            expected: expectation.expected.render(),
            actual,
            matched,
        };
        if !check.matched {
            return Err(ValidationFailure::ArgumentMismatch {
                argument: check.name,
                expected: check.expected,
                actual: check.actual,
            }
            .into());
        }
        checks.push(check);
    }
    Ok(checks)
}

/// Out-of-range reveals are malformed calldata.
fn revealed_direction(value: U256) -> Result<Direction> {
    Direction::try_from(value).map_err(|_| {
        ValidationFailure::MalformedInput(format!("revealed direction {} is neither Long nor Short", value))
            .into()
    })
}

fn event_field(event: &str, field: &str, expected: String, actual: String) -> Result<()> {
    if expected == actual {
        return Ok(());
    }
    Err(ValidationFailure::EventMismatch {
        event: event.to_string(),
        field: field.to_string(),
        expected,
        actual,
    }
    .into())
}

fn state_check(field: &str, expected: String, actual: String) -> StateCheck {
    StateCheck {
        field: field.to_string(),
        matched: expected == actual,
        expected,
        actual,
    }
}

fn render_player(player: Option<Address>) -> String {
    player
        .map(|address| to_checksum(&address, None))
        .unwrap_or_else(|| "none".to_string())
}

fn sender_position<'a>(game: &'a Game, sender: Address) -> Result<&'a Position> {
    game.position_of(sender).ok_or_else(|| {
        EngineError::from(ValidationFailure::StateMismatch {
            field: "player".to_string(),
            expected: format!("{} seated in game {}", to_checksum(&sender, None), game.game_id),
            actual: "not a player".to_string(),
        })
    })
}

fn evaluate_state(
    expected: &StateExpectation,
    game: &Game,
    tx: &Transaction,
    tokens: &[Token],
) -> Result<StateCheck> {
    let sender = tx.from;
    let check = match expected {
        StateExpectation::GameExists => StateCheck {
            field: "player1".to_string(),
            expected: "a created game".to_string(),
            actual: render_player(game.player1),
            matched: game.player1.is_some(),
        },
        StateExpectation::BetAmountEqualsValue => {
            state_check("betAmount", tx.value.to_string(), game.bet_amount.to_string())
        }
        StateExpectation::Player1IsSender => {
            state_check("player1", render_player(Some(sender)), render_player(game.player1))
        }
        StateExpectation::Player2IsSender => {
            state_check("player2", render_player(Some(sender)), render_player(game.player2))
        }
        StateExpectation::Player1Pool(pool) => state_check(
            "player1Pool",
            to_checksum(pool, None),
            to_checksum(&game.player1_pool, None),
        ),
        StateExpectation::Player2Pool(pool) => state_check(
            "player2Pool",
            to_checksum(pool, None),
            to_checksum(&game.player2_pool, None),
        ),
        StateExpectation::SenderCommitment(hash) => {
            let position = sender_position(game, sender)?;
            state_check(
                "hashedDirection",
                format!("0x{}", hex::encode(hash)),
                format!("0x{}", hex::encode(position.hashed_direction)),
            )
        }
        StateExpectation::SenderPositionCommitted => {
            let position = sender_position(game, sender)?;
            StateCheck {
                field: "positionState".to_string(),
                expected: "committed".to_string(),
                actual: format!("{:?}", position.state),
                matched: position.state != PositionState::Uncommitted,
            }
        }
        StateExpectation::RevealMatchesCommitment => {
            let position = sender_position(game, sender)?;
            let reveal = tokens
                .get(1)
                .cloned()
                .and_then(Token::into_uint)
                .zip(tokens.get(2).cloned().and_then(Token::into_uint))
                .ok_or_else(|| {
                    ValidationFailure::MalformedInput("call carries no direction/nonce reveal".into())
                })?;
            let direction = revealed_direction(reveal.0)?;
            let recomputed = commit(game.game_id, direction, reveal.1);
            state_check(
                "hashedDirection",
                format!("0x{}", hex::encode(recomputed)),
                format!("0x{}", hex::encode(position.hashed_direction)),
            )
        }
    };
    Ok(check)
}
