use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockNumber, Bytes, Transaction, TransactionReceipt, H256, U256,
};
use url::Url;

use crate::error::{EngineError, Result};

/// RPC surface the engine consumes. Implementations must be safe to share
/// between concurrent requests; the engine never caches anything they return.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn nonce(&self, address: Address) -> Result<U256>;

    /// Simulates `tx`. Any failure is reported as `EngineError::SimulationFailed`.
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256>;

    /// `baseFeePerGas` of the latest block, `None` on chains without EIP-1559.
    async fn latest_base_fee(&self) -> Result<Option<U256>>;

    async fn max_priority_fee(&self) -> Result<U256>;

    async fn gas_price(&self) -> Result<U256>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256>;

    /// `Ok(None)` while the transaction is not yet mined.
    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>>;

    async fn transaction(&self, tx_hash: H256) -> Result<Option<Transaction>>;

    /// Read-only `eth_call` against the latest block.
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes>;
}

/// JSON-RPC binding over `ethers`' HTTP provider.
pub struct EthersChainClient {
    provider: Provider<Http>,
}

impl EthersChainClient {
    /// Connects to `rpc_url` and confirms the endpoint answers.
    pub async fn connect(rpc_url: &str) -> Result<Self> {
        let url = Url::parse(rpc_url)
            .map_err(|e| EngineError::Connection(format!("Invalid RPC URL: {}", e)))?;
        let provider = Provider::<Http>::try_from(url.as_str())
            .map_err(|e| EngineError::Connection(format!("Invalid RPC URL: {}", e)))?;

        let chain_id = provider.get_chainid().await.map_err(|e| {
            EngineError::Connection(format!("Failed to connect to Ethereum node at {}: {}", rpc_url, e))
        })?;
        tracing::info!("Connected to {} (chain id {})", url.host_str().unwrap_or("rpc"), chain_id);

        Ok(Self { provider })
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn chain_id(&self) -> Result<u64> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| EngineError::BlockchainRPC(e.to_string()))?;
        Ok(chain_id.as_u64())
    }

    async fn nonce(&self, address: Address) -> Result<U256> {
        self.provider
            .get_transaction_count(address, None)
            .await
            .map_err(|e| EngineError::BlockchainRPC(e.to_string()))
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256> {
        self.provider
            .estimate_gas(tx, None)
            .await
            .map_err(|e| EngineError::SimulationFailed(e.to_string()))
    }

    async fn latest_base_fee(&self) -> Result<Option<U256>> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| EngineError::BlockchainRPC(e.to_string()))?;
        Ok(block.and_then(|block| block.base_fee_per_gas))
    }

    async fn max_priority_fee(&self) -> Result<U256> {
        self.provider
            .request::<_, U256>("eth_maxPriorityFeePerGas", ())
            .await
            .map_err(|e| EngineError::BlockchainRPC(e.to_string()))
    }

    async fn gas_price(&self) -> Result<U256> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| EngineError::BlockchainRPC(e.to_string()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| EngineError::BlockchainRPC(e.to_string()))?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| EngineError::BlockchainRPC(e.to_string()))
    }

    async fn transaction(&self, tx_hash: H256) -> Result<Option<Transaction>> {
        self.provider
            .get_transaction(tx_hash)
            .await
            .map_err(|e| EngineError::BlockchainRPC(e.to_string()))
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes> {
        self.provider
            .call(tx, None)
            .await
            .map_err(|e| EngineError::BlockchainRPC(e.to_string()))
    }
}
