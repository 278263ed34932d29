use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TransactionReceipt, H256, U256};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::{
    config::Config,
    constants::{
        DEFAULT_EIP712_NAME, DEFAULT_EIP712_VERSION, DEFAULT_JOIN_SIGNATURE_TTL_SECS,
        EVENT_GAME_CREATED, EVENT_POSITION_CLOSED,
    },
    crypto::{
        commitment::commit,
        signature::{sign_typed, JoinGameAuthorization, PostPositionAttestation, TypedDataDomain},
    },
    error::{EngineError, Result, ValidationFailure},
    models::{game::hex_bytes32, Direction, Game, PositionClosedEvent, ValidationResult},
    utils::parse_address,
};

use super::contract::{load_abi, MortalCoinContract};
use super::onchain::{ChainClient, EthersChainClient};
use super::receipt_poller::{PollOutcome, ReceiptPoller};
use super::transaction_builder::{build_signed_transaction, CallRequest};
use super::validator::CallValidator;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedGame {
    pub tx_hash: H256,
    /// `None` when the mined receipt does not identify the new game.
    pub game_id: Option<U256>,
    pub game: Option<Game>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedGame {
    pub tx_hash: H256,
    pub signature_expiration: U256,
    pub game: Game,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostedPosition {
    pub tx_hash: H256,
    #[serde(with = "hex_bytes32")]
    pub hashed_direction: [u8; 32],
    pub game: Game,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedPosition {
    pub tx_hash: H256,
    pub event: Option<PositionClosedEvent>,
    pub game: Game,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedGame {
    pub tx_hash: H256,
    pub game: Game,
}

/// The MortalCoin protocol actions, one signed transaction each.
///
/// Every action builds, signs, submits and waits for its transaction, then
/// re-reads the game so callers never see cached state.
pub struct GameService<C: ChainClient> {
    client: C,
    contract: MortalCoinContract,
    validator: CallValidator,
    poller: ReceiptPoller,
    eip712_name: String,
    eip712_version: String,
    join_signature_ttl: Duration,
}

impl GameService<EthersChainClient> {
    /// Connects to the configured endpoint and loads the contract ABI once.
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = EthersChainClient::connect(&config.rpc_url).await?;
        let abi = load_abi(config.abi_path.as_deref().map(Path::new))?;
        let contract = MortalCoinContract::new(parse_address(&config.contract_address)?, abi)?;

        Ok(Self::new(client, contract)
            .with_poller(ReceiptPoller::from_config(config))
            .with_typed_data_domain(&config.eip712_name, &config.eip712_version)
            .with_join_signature_ttl(Duration::from_secs(config.join_signature_ttl_secs)))
    }
}

impl<C: ChainClient> GameService<C> {
    pub fn new(client: C, contract: MortalCoinContract) -> Self {
        Self {
            client,
            validator: CallValidator::new(contract.clone()),
            contract,
            poller: ReceiptPoller::default(),
            eip712_name: DEFAULT_EIP712_NAME.to_string(),
            eip712_version: DEFAULT_EIP712_VERSION.to_string(),
            join_signature_ttl: Duration::from_secs(DEFAULT_JOIN_SIGNATURE_TTL_SECS),
        }
    }

    pub fn with_poller(mut self, poller: ReceiptPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_typed_data_domain(mut self, name: &str, version: &str) -> Self {
        self.eip712_name = name.to_string();
        self.eip712_version = version.to_string();
        self
    }

    pub fn with_join_signature_ttl(mut self, ttl: Duration) -> Self {
        self.join_signature_ttl = ttl;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn contract(&self) -> &MortalCoinContract {
        &self.contract
    }

    /// Typed-data domain bound to the endpoint's current chain id.
    pub async fn domain(&self) -> Result<TypedDataDomain> {
        Ok(TypedDataDomain {
            name: self.eip712_name.clone(),
            version: self.eip712_version.clone(),
            chain_id: self.client.chain_id().await?,
            verifying_contract: self.contract.address(),
        })
    }

    pub async fn game(&self, game_id: U256) -> Result<Game> {
        self.contract.game(&self.client, game_id).await
    }

    pub async fn current_game_id(&self) -> Result<U256> {
        self.contract.current_game_id(&self.client).await
    }

    /// Opens a game as player 1, staking `bet_amount` wei.
    pub async fn create_game(
        &self,
        wallet: LocalWallet,
        bet_amount: U256,
        pool: Address,
    ) -> Result<CreatedGame> {
        tracing::info!(
            "Creating game with bet {} wei and pool {:?}",
            bet_amount,
            pool
        );
        let request = self.contract.create_game_call(pool, bet_amount)?;
        let (tx_hash, receipt) = self.execute(wallet, request, "createGame").await?;

        // The transaction is mined from here on, so nothing below may drop its hash.
        let game_id = match self.created_game_id(&receipt).await {
            Ok(game_id) => Some(game_id),
            Err(err) => {
                tracing::warn!("createGame {:#x} mined but its game id is unknown: {}", tx_hash, err);
                None
            }
        };
        let game = match game_id {
            Some(game_id) => match self.game(game_id).await {
                Ok(game) => Some(game),
                Err(err) => {
                    tracing::warn!("Failed to read game {} after creation: {}", game_id, err);
                    None
                }
            },
            None => None,
        };
        tracing::info!("Game {:?} created in {:#x}", game_id, tx_hash);
        Ok(CreatedGame {
            tx_hash,
            game_id,
            game,
        })
    }

    /// Seats player 2. Player 1 authorizes the join off-chain; player 2 sends
    /// the transaction and pays the bet.
    pub async fn join_game(
        &self,
        player1: LocalWallet,
        player2: LocalWallet,
        game_id: U256,
        pool: Address,
        bet_amount: U256,
    ) -> Result<JoinedGame> {
        let game = self.game(game_id).await?;
        if game.player1.is_none() {
            return Err(EngineError::BadRequest(format!("Game {} does not exist", game_id)));
        }
        if game.player1 != Some(player1.address()) {
            return Err(EngineError::BadRequest(format!(
                "Game {} was not created by {:?}",
                game_id,
                player1.address()
            )));
        }
        if let Some(seated) = game.player2 {
            return Err(EngineError::BadRequest(format!(
                "Game {} already has player 2 {:?}",
                game_id, seated
            )));
        }
        if game.bet_amount != bet_amount {
            return Err(EngineError::BadRequest(format!(
                "Bet amount {} does not match game bet {}",
                bet_amount, game.bet_amount
            )));
        }

        let signature_expiration = U256::from(
            chrono::Utc::now().timestamp().max(0) as u64 + self.join_signature_ttl.as_secs(),
        );
        let authorization = JoinGameAuthorization {
            game_id,
            player2: player2.address(),
            signature_expiration,
        };
        let domain = self.domain().await?;
        let signature = sign_typed(player1, &domain, &authorization)?;

        let request = self.contract.join_game_call(
            game_id,
            pool,
            signature_expiration,
            signature,
            bet_amount,
        )?;
        let (tx_hash, _) = self.execute(player2, request, "joinGame").await?;

        Ok(JoinedGame {
            tx_hash,
            signature_expiration,
            game: self.game(game_id).await?,
        })
    }

    /// Commits `direction` under `nonce`. The backend attests the commitment;
    /// the player sends it. Keep `nonce` secret until the reveal.
    pub async fn post_position(
        &self,
        player: LocalWallet,
        backend: LocalWallet,
        game_id: U256,
        direction: Direction,
        nonce: U256,
    ) -> Result<PostedPosition> {
        let hashed_direction = commit(game_id, direction, nonce);
        let attestation = PostPositionAttestation {
            game_id,
            player: player.address(),
            hashed_direction,
        };
        let domain = self.domain().await?;
        let signature = sign_typed(backend, &domain, &attestation)?;

        let request = self
            .contract
            .post_position_call(game_id, hashed_direction, signature)?;
        let (tx_hash, _) = self.execute(player, request, "postPosition").await?;

        Ok(PostedPosition {
            tx_hash,
            hashed_direction,
            game: self.game(game_id).await?,
        })
    }

    /// Reveals the committed direction and closes the sender's position.
    pub async fn close_position(
        &self,
        player: LocalWallet,
        game_id: U256,
        direction: Direction,
        nonce: U256,
    ) -> Result<ClosedPosition> {
        let sender = player.address();
        let request = self.contract.close_position_call(game_id, direction, nonce)?;
        let (tx_hash, receipt) = self.execute(player, request, "closePosition").await?;

        let event = self
            .contract
            .matching_logs(&receipt.logs, EVENT_POSITION_CLOSED)
            .into_iter()
            .filter_map(|log| self.contract.decode_position_closed(log).ok())
            .find(|event| event.game_id == game_id && event.player == sender);
        if event.is_none() {
            tracing::warn!("closePosition {:#x} emitted no PositionClosed for {:?}", tx_hash, sender);
        }

        Ok(ClosedPosition {
            tx_hash,
            event,
            game: self.game(game_id).await?,
        })
    }

    /// Settles the game. The caller must reveal their own committed direction.
    pub async fn finish_game(
        &self,
        player: LocalWallet,
        game_id: U256,
        direction: Direction,
        nonce: U256,
    ) -> Result<FinishedGame> {
        let request = self.contract.finish_game_call(game_id, direction, nonce)?;
        let (tx_hash, _) = self.execute(player, request, "finishGame").await?;
        Ok(FinishedGame {
            tx_hash,
            game: self.game(game_id).await?,
        })
    }

    /// Settles the game with both players' reveals.
    pub async fn force_finish_game(
        &self,
        wallet: LocalWallet,
        game_id: U256,
        player1: (Direction, U256),
        player2: (Direction, U256),
    ) -> Result<FinishedGame> {
        let request = self
            .contract
            .force_finish_game_call(game_id, player1, player2)?;
        let (tx_hash, _) = self.execute(wallet, request, "forceFinishGame").await?;
        Ok(FinishedGame {
            tx_hash,
            game: self.game(game_id).await?,
        })
    }

    pub async fn validate_create_game(
        &self,
        tx_hash: H256,
        game_id: U256,
        pool: Address,
    ) -> Result<ValidationResult> {
        self.validator
            .validate_create_game(&self.client, tx_hash, game_id, pool)
            .await
    }

    pub async fn validate_join_game(
        &self,
        tx_hash: H256,
        game_id: U256,
        pool: Address,
    ) -> Result<ValidationResult> {
        self.validator
            .validate_join_game(&self.client, tx_hash, game_id, pool)
            .await
    }

    pub async fn validate_post_position(
        &self,
        tx_hash: H256,
        game_id: U256,
        hashed_direction: [u8; 32],
    ) -> Result<ValidationResult> {
        self.validator
            .validate_post_position(&self.client, tx_hash, game_id, hashed_direction)
            .await
    }

    pub async fn validate_close_position(
        &self,
        tx_hash: H256,
        game_id: U256,
        direction: Option<Direction>,
        nonce: Option<U256>,
    ) -> Result<ValidationResult> {
        self.validator
            .validate_close_position(&self.client, tx_hash, game_id, direction, nonce)
            .await
    }

    async fn execute(
        &self,
        wallet: LocalWallet,
        request: CallRequest,
        action: &str,
    ) -> Result<(H256, TransactionReceipt)> {
        let signed = build_signed_transaction(&self.client, wallet, request).await?;
        tracing::info!(
            "Submitting {} from {:?} (nonce {}, chain {})",
            action,
            signed.from,
            signed.nonce,
            signed.chain_id
        );
        match self.poller.submit_and_wait(&self.client, &signed).await? {
            (tx_hash, PollOutcome::MinedSuccess(receipt)) => Ok((tx_hash, receipt)),
            (tx_hash, PollOutcome::MinedFailure(_)) => Err(EngineError::Reverted(tx_hash)),
        }
    }

    async fn created_game_id(&self, receipt: &TransactionReceipt) -> Result<U256> {
        if self.contract.has_game_created_event() {
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
            return Ok(event.game_id);
        }

        // Racy: another createGame may land in between.
        tracing::warn!("Contract ABI has no GameCreated event, deriving game id from currentGameId()");
        let current = self.current_game_id().await?;
        current
            .checked_sub(U256::one())
            .ok_or_else(|| EngineError::Abi("currentGameId() is zero after createGame".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_ABI_JSON;
    use crate::crypto::hash::{event_topic, keccak256};
    use crate::crypto::signature::recover_signer;
    use crate::models::game::sample_game_tokens;
    use crate::services::contract::parse_abi;
    use crate::services::testing::MockChain;
    use ethers::abi::{encode, Token};
    use ethers::types::transaction::eip2718::TypedTransaction;
    use ethers::types::{Bytes, Log, I256};
    use ethers::utils::rlp::Rlp;

    const CONTRACT: Address = Address::repeat_byte(0xcc);
    const PLAYER1_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const PLAYER2_KEY: &str = "0x8da4ef21b864d2cc526dbdb2a120bd2874c36c9d0a1fb7f8c63d7f7a8b41de8f";
    const BACKEND_KEY: &str = "0x0123456789012345678901234567890123456789012345678901234567890123";

    fn wallet(key: &str) -> LocalWallet {
        key.parse().unwrap()
    }

    fn pool() -> Address {
        Address::repeat_byte(0x21)
    }

    fn one_eth() -> U256 {
        U256::exp10(18)
    }

    fn service(chain: MockChain) -> GameService<MockChain> {
        GameService::new(chain, MortalCoinContract::with_default_abi(CONTRACT).unwrap())
            .with_poller(ReceiptPoller::new(Duration::from_millis(10), Duration::from_secs(1)))
    }

    fn set_game(service: &GameService<MockChain>, player2: Address, positions: [([u8; 32], u8); 2]) {
        let tokens = sample_game_tokens(
            one_eth(),
            wallet(PLAYER1_KEY).address(),
            pool(),
            player2,
            Address::repeat_byte(0x22),
            positions,
        );
        let selector = service.contract().function("games").unwrap().short_signature();
        service.client().set_call_result(selector, Bytes::from(encode(&tokens)));
    }

    fn sent_calldata(chain: &MockChain) -> Bytes {
        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        let (tx, _) = TypedTransaction::decode_signed(&Rlp::new(&sent[0])).unwrap();
        tx.data().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_game_reads_id_from_event() {
        let player1 = wallet(PLAYER1_KEY).address();
        let log = Log {
            address: CONTRACT,
            topics: vec![
                event_topic(EVENT_GAME_CREATED),
                H256::from_low_u64_be(7),
                H256::from(player1),
            ],
            data: Bytes::from(encode(&[Token::Uint(one_eth()), Token::Address(pool())])),
            ..Default::default()
        };
        let service = service(MockChain::new(1).mining_with_status(1).with_mined_logs(vec![log]));
        set_game(&service, Address::zero(), [([0u8; 32], 0), ([0u8; 32], 0)]);

        let created = service
            .create_game(wallet(PLAYER1_KEY), one_eth(), pool())
            .await
            .unwrap();
        assert_eq!(created.game_id, Some(U256::from(7u64)));
        let game = created.game.unwrap();
        assert_eq!(game.player1, Some(player1));
        assert_eq!(game.player2, None);
        assert_eq!(service.client().sent().len(), 1);
    }

    #[tokio::test]
    async fn create_game_falls_back_to_current_game_id() {
        let mut abi: serde_json::Value = serde_json::from_str(DEFAULT_ABI_JSON).unwrap();
        abi.as_array_mut()
            .unwrap()
            .retain(|entry| entry["name"] != "GameCreated");
        let contract = MortalCoinContract::new(CONTRACT, parse_abi(&abi.to_string()).unwrap()).unwrap();
        assert!(!contract.has_game_created_event());

        let chain = MockChain::new(1).mining_with_status(1);
        let current = contract.function("currentGameId").unwrap().short_signature();
        chain.set_call_result(current, Bytes::from(encode(&[Token::Uint(U256::from(8u64))])));
        let service = GameService::new(chain, contract)
            .with_poller(ReceiptPoller::new(Duration::from_millis(10), Duration::from_secs(1)));
        set_game(&service, Address::zero(), [([0u8; 32], 0), ([0u8; 32], 0)]);

        let created = service
            .create_game(wallet(PLAYER1_KEY), one_eth(), pool())
            .await
            .unwrap();
        assert_eq!(created.game_id, Some(U256::from(7u64)));
    }

    #[tokio::test]
    async fn create_game_without_event_log_still_returns_tx_hash() {
        let service = service(MockChain::new(1).mining_with_status(1));

        let created = service
            .create_game(wallet(PLAYER1_KEY), one_eth(), pool())
            .await
            .unwrap();
        let sent = service.client().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(created.tx_hash, H256::from(keccak256(&sent[0])));
        assert_eq!(created.game_id, None);
        assert!(created.game.is_none());

        let json = serde_json::to_value(&created).unwrap();
        assert!(json["gameId"].is_null());
        assert!(json["txHash"].is_string());
    }

    #[tokio::test]
    async fn reverted_transaction_is_reported() {
        let service = service(MockChain::new(1).mining_with_status(0));
        let err = service
            .close_position(wallet(PLAYER1_KEY), U256::one(), Direction::Long, U256::one())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Reverted(_)));
    }

    #[tokio::test]
    async fn join_game_rejects_wrong_bet_before_sending() {
        let service = service(MockChain::new(1).mining_with_status(1));
        set_game(&service, Address::zero(), [([0u8; 32], 0), ([0u8; 32], 0)]);

        let err = service
            .join_game(
                wallet(PLAYER1_KEY),
                wallet(PLAYER2_KEY),
                U256::from(3u64),
                pool(),
                U256::exp10(17),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
        assert!(service.client().sent().is_empty());
    }

    #[tokio::test]
    async fn join_game_carries_player1_authorization() {
        let service = service(MockChain::new(1).mining_with_status(1));
        set_game(&service, Address::zero(), [([0u8; 32], 0), ([0u8; 32], 0)]);

        let joined = service
            .join_game(
                wallet(PLAYER1_KEY),
                wallet(PLAYER2_KEY),
                U256::from(3u64),
                pool(),
                one_eth(),
            )
            .await
            .unwrap();

        let data = sent_calldata(service.client());
        let tokens = service.contract().decode_input("joinGame", &data).unwrap();
        assert_eq!(tokens[0], Token::Uint(U256::from(3u64)));
        assert_eq!(tokens[2], Token::Uint(joined.signature_expiration));
        let signature = tokens[3].clone().into_bytes().unwrap();
        assert_eq!(signature.len(), 65);

        let authorization = JoinGameAuthorization {
            game_id: U256::from(3u64),
            player2: wallet(PLAYER2_KEY).address(),
            signature_expiration: joined.signature_expiration,
        };
        let domain = service.domain().await.unwrap();
        assert_eq!(
            recover_signer(&domain, &authorization, &signature).unwrap(),
            wallet(PLAYER1_KEY).address()
        );
    }

    #[tokio::test]
    async fn post_position_commits_and_backend_attests() {
        let service = service(MockChain::new(1).mining_with_status(1));
        let game_id = U256::from(3u64);
        let nonce = U256::from(424242u64);
        let hashed = commit(game_id, Direction::Short, nonce);
        set_game(&service, wallet(PLAYER2_KEY).address(), [(hashed, 1), ([0u8; 32], 0)]);

        let posted = service
            .post_position(wallet(PLAYER1_KEY), wallet(BACKEND_KEY), game_id, Direction::Short, nonce)
            .await
            .unwrap();
        assert_eq!(posted.hashed_direction, hashed);

        let data = sent_calldata(service.client());
        let tokens = service.contract().decode_input("postPosition", &data).unwrap();
        assert_eq!(tokens[1], Token::FixedBytes(hashed.to_vec()));
        let attestation = PostPositionAttestation {
            game_id,
            player: wallet(PLAYER1_KEY).address(),
            hashed_direction: hashed,
        };
        let signature = tokens[2].clone().into_bytes().unwrap();
        let domain = service.domain().await.unwrap();
        assert_eq!(
            recover_signer(&domain, &attestation, &signature).unwrap(),
            wallet(BACKEND_KEY).address()
        );
    }

    #[tokio::test]
    async fn close_position_returns_emitted_event() {
        let player1 = wallet(PLAYER1_KEY).address();
        let log = Log {
            address: CONTRACT,
            topics: vec![
                event_topic(EVENT_POSITION_CLOSED),
                H256::from_low_u64_be(3),
                H256::from(player1),
            ],
            data: Bytes::from(encode(&[
                Token::Address(wallet(PLAYER2_KEY).address()),
                Token::Uint(U256::from(1_000u64)),
                Token::Uint(U256::from(900u64)),
                Direction::Short.to_token(),
                Token::Int(I256::from(100).into_raw()),
            ])),
            ..Default::default()
        };
        let service = service(MockChain::new(1).mining_with_status(1).with_mined_logs(vec![log]));
        set_game(&service, wallet(PLAYER2_KEY).address(), [([0u8; 32], 2), ([0u8; 32], 1)]);

        let closed = service
            .close_position(wallet(PLAYER1_KEY), U256::from(3u64), Direction::Short, U256::one())
            .await
            .unwrap();
        let event = closed.event.unwrap();
        assert_eq!(event.direction, Direction::Short);
        assert_eq!(event.closing_price, U256::from(900u64));
    }

    #[tokio::test]
    async fn force_finish_encodes_both_reveals() {
        let service = service(MockChain::new(1).mining_with_status(1));
        set_game(&service, wallet(PLAYER2_KEY).address(), [([0u8; 32], 2), ([0u8; 32], 2)]);

        service
            .force_finish_game(
                wallet(PLAYER1_KEY),
                U256::from(3u64),
                (Direction::Long, U256::from(1u64)),
                (Direction::Short, U256::from(2u64)),
            )
            .await
            .unwrap();

        let data = sent_calldata(service.client());
        let tokens = service.contract().decode_input("forceFinishGame", &data).unwrap();
        assert_eq!(tokens[1], Token::Uint(U256::zero()));
        assert_eq!(tokens[3], Token::Uint(U256::one()));
        assert_eq!(tokens[4], Token::Uint(U256::from(2u64)));
    }
}
