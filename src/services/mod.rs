// Engine services
pub mod contract;
pub mod fee_strategy;
pub mod game_service;
pub mod onchain;
pub mod receipt_poller;
pub mod transaction_builder;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

// Re-export for convenience
pub use contract::{load_abi, parse_abi, GameFunction, MortalCoinContract};
pub use fee_strategy::{select_fee_quote, FeeQuote, GasPricing};
pub use game_service::{
    ClosedPosition, CreatedGame, FinishedGame, GameService, JoinedGame, PostedPosition,
};
pub use onchain::{ChainClient, EthersChainClient};
pub use receipt_poller::{PollOutcome, ReceiptPoller};
pub use transaction_builder::{build_signed_transaction, CallRequest, SignedTransaction};
pub use validator::CallValidator;
