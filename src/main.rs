use clap::{Parser, Subcommand};
use ethers::types::{Address, H256, U256};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mortalcoin::{
    config::Config,
    crypto::commitment::{commit, random_nonce},
    models::Direction,
    services::{EthersChainClient, GameService},
    utils::{
        checksum, parse_address, parse_bytes32, parse_eth_amount, parse_tx_hash, parse_u256,
        parse_wallet,
    },
};

#[derive(Parser)]
#[command(name = "mortalcoin")]
#[command(about = "Interact with and audit the MortalCoin game contract")]
#[command(version)]
struct Cli {
    /// URL of the Ethereum RPC endpoint (overrides MORTALCOIN_RPC_URL)
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Address of the MortalCoin contract (overrides MORTALCOIN_CONTRACT_ADDRESS)
    #[arg(long, global = true)]
    contract_address: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new game and print its state
    CreateGame {
        #[arg(long, env = "MORTALCOIN_PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
        /// Bet amount in ETH
        #[arg(long, env = "MORTALCOIN_BET_AMOUNT", value_parser = parse_eth_amount)]
        bet_amount: U256,
        #[arg(long, env = "MORTALCOIN_POOL_ADDRESS", value_parser = parse_address)]
        pool_address: Address,
    },
    /// Print the on-chain state of a game
    GameInfo {
        #[arg(long, value_parser = parse_u256)]
        game_id: U256,
    },
    /// Join a game as player 2, authorized by player 1's signature
    JoinGame {
        #[arg(long, value_parser = parse_u256)]
        game_id: U256,
        #[arg(long, hide_env_values = true, env = "MORTALCOIN_PLAYER1_PRIVATE_KEY")]
        player1_privkey: String,
        #[arg(long, hide_env_values = true, env = "MORTALCOIN_PLAYER2_PRIVATE_KEY")]
        player2_privkey: String,
        #[arg(long, value_parser = parse_address)]
        player2_pool: Address,
        /// Bet amount in ETH; must equal the game's bet
        #[arg(long, value_parser = parse_eth_amount)]
        bet_amount: U256,
    },
    /// Commit a direction; the backend key attests the commitment
    PostPosition {
        #[arg(long, hide_env_values = true, env = "MORTALCOIN_PRIVATE_KEY")]
        player_privkey: String,
        #[arg(long, hide_env_values = true, env = "MORTALCOIN_BACKEND_PRIVATE_KEY")]
        backend_privkey: String,
        #[arg(long, value_parser = parse_u256)]
        game_id: U256,
        /// Long or Short
        #[arg(long)]
        direction: Direction,
        /// Secret nonce; a random one is drawn and printed when omitted
        #[arg(long, value_parser = parse_u256)]
        nonce: Option<U256>,
    },
    /// Reveal a committed direction and close the position
    ClosePosition {
        #[arg(long, hide_env_values = true, env = "MORTALCOIN_PRIVATE_KEY")]
        player_privkey: String,
        #[arg(long, value_parser = parse_u256)]
        game_id: U256,
        #[arg(long)]
        direction: Direction,
        #[arg(long, value_parser = parse_u256)]
        nonce: U256,
    },
    /// Finish a game, revealing the caller's committed direction
    FinishGame {
        #[arg(long, hide_env_values = true, env = "MORTALCOIN_PRIVATE_KEY")]
        player_privkey: String,
        #[arg(long, value_parser = parse_u256)]
        game_id: U256,
        #[arg(long)]
        direction: Direction,
        #[arg(long, value_parser = parse_u256)]
        nonce: U256,
    },
    /// Finish a game with both players' reveals
    ForceFinishGame {
        #[arg(long, hide_env_values = true, env = "MORTALCOIN_PRIVATE_KEY")]
        private_key: String,
        #[arg(long, value_parser = parse_u256)]
        game_id: U256,
        #[arg(long)]
        player1_direction: Direction,
        #[arg(long, value_parser = parse_u256)]
        player1_nonce: U256,
        #[arg(long)]
        player2_direction: Direction,
        #[arg(long, value_parser = parse_u256)]
        player2_nonce: U256,
    },
    /// Check that a transaction created the given game with the given pool
    ValidateCreateGame {
        #[arg(long, value_parser = parse_u256)]
        game_id: U256,
        #[arg(long, value_parser = parse_tx_hash)]
        tx_hash: H256,
        #[arg(long, value_parser = parse_address)]
        pool_address: Address,
    },
    /// Check that a transaction joined the given game with the given pool
    ValidateJoinGame {
        #[arg(long, value_parser = parse_u256)]
        game_id: U256,
        #[arg(long, value_parser = parse_tx_hash)]
        tx_hash: H256,
        #[arg(long, value_parser = parse_address)]
        pool_address: Address,
    },
    /// Check that a transaction posted the given commitment
    ValidatePostPosition {
        #[arg(long, value_parser = parse_u256)]
        game_id: U256,
        #[arg(long, value_parser = parse_tx_hash)]
        tx_hash: H256,
        /// Expected commitment; computed from --direction and --nonce when omitted
        #[arg(long, value_parser = parse_bytes32, required_unless_present_all = ["direction", "nonce"])]
        hashed_direction: Option<[u8; 32]>,
        #[arg(long)]
        direction: Option<Direction>,
        #[arg(long, value_parser = parse_u256)]
        nonce: Option<U256>,
    },
    /// Check that a transaction revealed a direction matching its commitment
    ValidateClosePosition {
        #[arg(long, value_parser = parse_u256)]
        game_id: U256,
        #[arg(long, value_parser = parse_tx_hash)]
        tx_hash: H256,
        #[arg(long)]
        direction: Option<Direction>,
        #[arg(long, value_parser = parse_u256)]
        nonce: Option<U256>,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mortalcoin=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_env()?;
    if let Some(rpc_url) = cli.rpc_url {
        config.rpc_url = rpc_url;
    }
    if let Some(contract_address) = cli.contract_address {
        config.contract_address = contract_address;
    }
    config.validate()?;

    let service: GameService<EthersChainClient> = GameService::connect(&config).await?;
    tracing::info!(
        "Using MortalCoin contract {}",
        checksum(&service.contract().address())
    );

    match cli.command {
        Commands::CreateGame {
            private_key,
            bet_amount,
            pool_address,
        } => {
            let created = service
                .create_game(parse_wallet(&private_key)?, bet_amount, pool_address)
                .await?;
            print_json(&created)?;
        }
        Commands::GameInfo { game_id } => {
            print_json(&service.game(game_id).await?)?;
        }
        Commands::JoinGame {
            game_id,
            player1_privkey,
            player2_privkey,
            player2_pool,
            bet_amount,
        } => {
            let joined = service
                .join_game(
                    parse_wallet(&player1_privkey)?,
                    parse_wallet(&player2_privkey)?,
                    game_id,
                    player2_pool,
                    bet_amount,
                )
                .await?;
            print_json(&joined)?;
        }
        Commands::PostPosition {
            player_privkey,
            backend_privkey,
            game_id,
            direction,
            nonce,
        } => {
            let nonce = match nonce {
                Some(nonce) => nonce,
                None => {
                    let nonce = random_nonce();
                    eprintln!("Generated nonce {:#x}; keep it to reveal the position", nonce);
                    nonce
                }
            };
            let posted = service
                .post_position(
                    parse_wallet(&player_privkey)?,
                    parse_wallet(&backend_privkey)?,
                    game_id,
                    direction,
                    nonce,
                )
                .await?;
            print_json(&posted)?;
        }
        Commands::ClosePosition {
            player_privkey,
            game_id,
            direction,
            nonce,
        } => {
            let closed = service
                .close_position(parse_wallet(&player_privkey)?, game_id, direction, nonce)
                .await?;
            print_json(&closed)?;
        }
        Commands::FinishGame {
            player_privkey,
            game_id,
            direction,
            nonce,
        } => {
            let finished = service
                .finish_game(parse_wallet(&player_privkey)?, game_id, direction, nonce)
                .await?;
            print_json(&finished)?;
        }
        Commands::ForceFinishGame {
            private_key,
            game_id,
            player1_direction,
            player1_nonce,
            player2_direction,
            player2_nonce,
        } => {
            let finished = service
                .force_finish_game(
                    parse_wallet(&private_key)?,
                    game_id,
                    (player1_direction, player1_nonce),
                    (player2_direction, player2_nonce),
                )
                .await?;
            print_json(&finished)?;
        }
        Commands::ValidateCreateGame {
            game_id,
            tx_hash,
            pool_address,
        } => {
            let result = service
                .validate_create_game(tx_hash, game_id, pool_address)
                .await?;
            print_json(&result)?;
        }
        Commands::ValidateJoinGame {
            game_id,
            tx_hash,
            pool_address,
        } => {
            let result = service
                .validate_join_game(tx_hash, game_id, pool_address)
                .await?;
            print_json(&result)?;
        }
        Commands::ValidatePostPosition {
            game_id,
            tx_hash,
            hashed_direction,
            direction,
            nonce,
        } => {
            let hashed_direction = match (hashed_direction, direction, nonce) {
                (Some(hash), _, _) => hash,
                (None, Some(direction), Some(nonce)) => commit(game_id, direction, nonce),
                _ => anyhow::bail!("Pass --hashed-direction or both --direction and --nonce"),
            };
            let result = service
                .validate_post_position(tx_hash, game_id, hashed_direction)
                .await?;
            print_json(&result)?;
        }
        Commands::ValidateClosePosition {
            game_id,
            tx_hash,
            direction,
            nonce,
        } => {
            let result = service
                .validate_close_position(tx_hash, game_id, direction, nonce)
                .await?;
            print_json(&result)?;
        }
    }

    Ok(())
}
