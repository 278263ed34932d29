use ethers::abi::{Abi, Event, Function, RawLog, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Log, TransactionRequest, U256};
use std::path::Path;

use crate::{
    constants::{
        DEFAULT_ABI_JSON, EVENT_GAME_CREATED, EVENT_POSITION_CLOSED, SIG_CLOSE_POSITION,
        SIG_CREATE_GAME, SIG_FINISH_GAME, SIG_FORCE_FINISH_GAME, SIG_JOIN_GAME,
        SIG_POST_POSITION,
    },
    crypto::hash::{event_topic, selector},
    error::{EngineError, Result},
    models::{
        game::{token_address, token_int, token_u8, token_uint},
        Direction, Game, GameCreatedEvent, PositionClosedEvent,
    },
};

use super::onchain::ChainClient;
use super::transaction_builder::CallRequest;

/// The contract's write functions, paired with their canonical signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameFunction {
    CreateGame,
    JoinGame,
    PostPosition,
    ClosePosition,
    FinishGame,
    ForceFinishGame,
}

impl GameFunction {
    pub const ALL: [GameFunction; 6] = [
        GameFunction::CreateGame,
        GameFunction::JoinGame,
        GameFunction::PostPosition,
        GameFunction::ClosePosition,
        GameFunction::FinishGame,
        GameFunction::ForceFinishGame,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GameFunction::CreateGame => "createGame",
            GameFunction::JoinGame => "joinGame",
            GameFunction::PostPosition => "postPosition",
            GameFunction::ClosePosition => "closePosition",
            GameFunction::FinishGame => "finishGame",
            GameFunction::ForceFinishGame => "forceFinishGame",
        }
    }

    pub fn signature(self) -> &'static str {
        match self {
            GameFunction::CreateGame => SIG_CREATE_GAME,
            GameFunction::JoinGame => SIG_JOIN_GAME,
            GameFunction::PostPosition => SIG_POST_POSITION,
            GameFunction::ClosePosition => SIG_CLOSE_POSITION,
            GameFunction::FinishGame => SIG_FINISH_GAME,
            GameFunction::ForceFinishGame => SIG_FORCE_FINISH_GAME,
        }
    }

    pub fn selector(self) -> [u8; 4] {
        selector(self.signature())
    }
}

/// Address plus ABI of a deployed MortalCoin contract.
///
/// The ABI is handed in at construction; nothing here touches the filesystem
/// after that.
#[derive(Debug, Clone)]
pub struct MortalCoinContract {
    address: Address,
    abi: Abi,
}

impl MortalCoinContract {
    pub fn new(address: Address, abi: Abi) -> Result<Self> {
        for function in GameFunction::ALL {
            let entry = abi
                .function(function.name())
                .map_err(|e| EngineError::Abi(format!("{}: {}", function.name(), e)))?;
            if entry.short_signature() != function.selector() {
                return Err(EngineError::Abi(format!(
                    "ABI entry for {} does not match {}",
                    function.name(),
                    function.signature()
                )));
            }
        }
        for view in ["games", "currentGameId"] {
            abi.function(view)
                .map_err(|e| EngineError::Abi(format!("{}: {}", view, e)))?;
        }
        let closed = abi
            .event("PositionClosed")
            .map_err(|e| EngineError::Abi(format!("PositionClosed: {}", e)))?;
        if closed.signature() != event_topic(EVENT_POSITION_CLOSED) {
            return Err(EngineError::Abi(format!(
                "ABI entry for PositionClosed does not match {}",
                EVENT_POSITION_CLOSED
            )));
        }

        Ok(Self { address, abi })
    }

    pub fn with_default_abi(address: Address) -> Result<Self> {
        Self::new(address, parse_abi(DEFAULT_ABI_JSON)?)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    pub fn function(&self, name: &str) -> Result<&Function> {
        self.abi
            .function(name)
            .map_err(|e| EngineError::Abi(format!("{}: {}", name, e)))
    }

    pub fn event(&self, name: &str) -> Result<&Event> {
        self.abi
            .event(name)
            .map_err(|e| EngineError::Abi(format!("{}: {}", name, e)))
    }

    /// `GameCreated` is optional in deployed ABIs.
    pub fn has_game_created_event(&self) -> bool {
        self.abi
            .event("GameCreated")
            .map(|event| event.signature() == event_topic(EVENT_GAME_CREATED))
            .unwrap_or(false)
    }

    pub fn encode_call(&self, name: &str, args: &[Token]) -> Result<Bytes> {
        let data = self
            .function(name)?
            .encode_input(args)
            .map_err(|e| EngineError::Abi(format!("Failed to encode {}: {}", name, e)))?;
        Ok(Bytes::from(data))
    }

    /// Decodes full calldata (selector included) for `name`.
    pub fn decode_input(&self, name: &str, input: &[u8]) -> Result<Vec<Token>> {
        if input.len() < 4 {
            return Err(EngineError::Abi(format!(
                "Calldata of {} bytes has no selector",
                input.len()
            )));
        }
        self.function(name)?
            .decode_input(&input[4..])
            .map_err(|e| EngineError::Abi(format!("Failed to decode {} input: {}", name, e)))
    }

    /// Runs a view function through `eth_call` and decodes its outputs.
    pub async fn read<C: ChainClient + ?Sized>(
        &self,
        client: &C,
        name: &str,
        args: &[Token],
    ) -> Result<Vec<Token>> {
        let data = self.encode_call(name, args)?;
        let tx: TypedTransaction = TransactionRequest::new().to(self.address).data(data).into();
        let output = client.call(&tx).await?;
        self.function(name)?
            .decode_output(&output)
            .map_err(|e| EngineError::Abi(format!("Failed to decode {} output: {}", name, e)))
    }

    pub async fn game<C: ChainClient + ?Sized>(&self, client: &C, game_id: U256) -> Result<Game> {
        let tokens = self.read(client, "games", &[Token::Uint(game_id)]).await?;
        Game::from_tokens(game_id, tokens)
    }

    pub async fn current_game_id<C: ChainClient + ?Sized>(&self, client: &C) -> Result<U256> {
        let mut tokens = self.read(client, "currentGameId", &[]).await?;
        let token = tokens
            .pop()
            .ok_or_else(|| EngineError::Abi("currentGameId() returned nothing".into()))?;
        token_uint(token, "currentGameId")
    }

    pub fn create_game_call(&self, pool: Address, bet_amount: U256) -> Result<CallRequest> {
        let data = self.encode_call("createGame", &[Token::Address(pool)])?;
        Ok(CallRequest::new(self.address, data).with_value(bet_amount))
    }

    pub fn join_game_call(
        &self,
        game_id: U256,
        pool: Address,
        signature_expiration: U256,
        signature: Bytes,
        bet_amount: U256,
    ) -> Result<CallRequest> {
        let data = self.encode_call(
            "joinGame",
            &[
                Token::Uint(game_id),
                Token::Address(pool),
                Token::Uint(signature_expiration),
                Token::Bytes(signature.to_vec()),
            ],
        )?;
        Ok(CallRequest::new(self.address, data).with_value(bet_amount))
    }

    pub fn post_position_call(
        &self,
        game_id: U256,
        hashed_direction: [u8; 32],
        signature: Bytes,
    ) -> Result<CallRequest> {
        let data = self.encode_call(
            "postPosition",
            &[
                Token::Uint(game_id),
                Token::FixedBytes(hashed_direction.to_vec()),
                Token::Bytes(signature.to_vec()),
            ],
        )?;
        Ok(CallRequest::new(self.address, data))
    }

    pub fn close_position_call(
        &self,
        game_id: U256,
        direction: Direction,
        nonce: U256,
    ) -> Result<CallRequest> {
        let data = self.encode_call(
            "closePosition",
            &[Token::Uint(game_id), direction.to_token(), Token::Uint(nonce)],
        )?;
        Ok(CallRequest::new(self.address, data))
    }

    pub fn finish_game_call(
        &self,
        game_id: U256,
        direction: Direction,
        nonce: U256,
    ) -> Result<CallRequest> {
        let data = self.encode_call(
            "finishGame",
            &[Token::Uint(game_id), direction.to_token(), Token::Uint(nonce)],
        )?;
        Ok(CallRequest::new(self.address, data))
    }

    pub fn force_finish_game_call(
        &self,
        game_id: U256,
        player1: (Direction, U256),
        player2: (Direction, U256),
    ) -> Result<CallRequest> {
        let data = self.encode_call(
            "forceFinishGame",
            &[
                Token::Uint(game_id),
                player1.0.to_token(),
                Token::Uint(player1.1),
                player2.0.to_token(),
                Token::Uint(player2.1),
            ],
        )?;
        Ok(CallRequest::new(self.address, data))
    }

    /// Logs emitted by this contract whose `topic0` is `signature`'s hash.
    pub fn matching_logs<'a>(&self, logs: &'a [Log], signature: &str) -> Vec<&'a Log> {
        let topic = event_topic(signature);
        logs.iter()
            .filter(|log| log.address == self.address && log.topics.first() == Some(&topic))
            .collect()
    }

    pub fn decode_position_closed(&self, log: &Log) -> Result<PositionClosedEvent> {
        let [game_id, player, opponent, opening_price, closing_price, direction, pnl]: [Token; 7] =
            self.decode_log("PositionClosed", log)?;
        Ok(PositionClosedEvent {
            game_id: token_uint(game_id, "gameId")?,
            player: token_address(player, "player")?,
            opponent: token_address(opponent, "opponent")?,
            opening_price: token_uint(opening_price, "openingPrice")?,
            closing_price: token_uint(closing_price, "closingPrice")?,
            direction: Direction::try_from(token_u8(direction, "direction")?)?,
            pnl: token_int(pnl, "pnl")?,
        })
    }

    pub fn decode_game_created(&self, log: &Log) -> Result<GameCreatedEvent> {
        let [game_id, player1, bet_amount, pool]: [Token; 4] =
            self.decode_log("GameCreated", log)?;
        Ok(GameCreatedEvent {
            game_id: token_uint(game_id, "gameId")?,
            player1: token_address(player1, "player1")?,
            bet_amount: token_uint(bet_amount, "betAmount")?,
            pool: token_address(pool, "pool")?,
        })
    }

    /// Event parameters in declaration order, indexed ones included.
    fn decode_log<const N: usize>(&self, name: &str, log: &Log) -> Result<[Token; N]> {
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        let parsed = self
            .event(name)?
            .parse_log(raw)
            .map_err(|e| EngineError::Abi(format!("Failed to decode {} log: {}", name, e)))?;
        let values: Vec<Token> = parsed.params.into_iter().map(|param| param.value).collect();
        let count = values.len();
        values.try_into().map_err(|_| {
            EngineError::Abi(format!("{} log has {} parameters, expected {}", name, count, N))
        })
    }
}

/// Parses a bare ABI array or a build artifact carrying an `abi` field.
pub fn parse_abi(json: &str) -> Result<Abi> {
    if let Ok(abi) = serde_json::from_str::<Abi>(json) {
        return Ok(abi);
    }
    let artifact: serde_json::Value =
        serde_json::from_str(json).map_err(|e| EngineError::Abi(format!("Invalid ABI JSON: {}", e)))?;
    let abi = artifact
        .get("abi")
        .cloned()
        .ok_or_else(|| EngineError::Abi("ABI JSON has no `abi` entry".to_string()))?;
    serde_json::from_value(abi).map_err(|e| EngineError::Abi(format!("Invalid ABI JSON: {}", e)))
}

/// Loads the ABI once, at construction time: the file at `path`, or the bundled copy.
pub fn load_abi(path: Option<&Path>) -> Result<Abi> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|e| {
                EngineError::Abi(format!("Failed to read ABI file {}: {}", path.display(), e))
            })?;
            tracing::debug!("Loaded contract ABI from {}", path.display());
            parse_abi(&json)
        }
        None => parse_abi(DEFAULT_ABI_JSON),
    }
}
