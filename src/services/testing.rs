use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Bytes, Log, Transaction, TransactionReceipt, H256, U256, U64,
};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::crypto::hash::keccak256;
use crate::error::{EngineError, Result};

use super::onchain::ChainClient;

pub fn gwei(amount: u64) -> U256 {
    U256::from(amount) * U256::exp10(9)
}

/// In-memory `ChainClient` with scripted answers.
pub struct MockChain {
    chain_id: Mutex<u64>,
    nonce: U256,
    estimate: std::result::Result<U256, String>,
    base_fee: Option<U256>,
    priority_fee: Option<U256>,
    gas_price: Option<U256>,
    receipts: Mutex<HashMap<H256, (u64, TransactionReceipt)>>,
    receipt_polls: Mutex<HashMap<H256, u64>>,
    transactions: Mutex<HashMap<H256, Transaction>>,
    call_results: Mutex<HashMap<[u8; 4], Bytes>>,
    sent: Mutex<Vec<Bytes>>,
    simulated: Mutex<Vec<TypedTransaction>>,
    mine_on_send: Option<u64>,
    mined_logs: Vec<Log>,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id: Mutex::new(chain_id),
            nonce: U256::zero(),
            estimate: Ok(U256::from(100_000u64)),
            base_fee: Some(gwei(30)),
            priority_fee: Some(gwei(2)),
            gas_price: Some(gwei(25)),
            receipts: Mutex::new(HashMap::new()),
            receipt_polls: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            call_results: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            simulated: Mutex::new(Vec::new()),
            mine_on_send: None,
            mined_logs: Vec::new(),
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = U256::from(nonce);
        self
    }

    pub fn with_estimate(mut self, estimate: std::result::Result<U256, String>) -> Self {
        self.estimate = estimate;
        self
    }

    pub fn with_base_fee(mut self, base_fee: Option<U256>) -> Self {
        self.base_fee = base_fee;
        self
    }

    /// `None` makes the lookup fail.
    pub fn with_priority_fee(mut self, priority_fee: Option<U256>) -> Self {
        self.priority_fee = priority_fee;
        self
    }

    /// `None` makes the lookup fail.
    pub fn with_gas_price(mut self, gas_price: Option<U256>) -> Self {
        self.gas_price = gas_price;
        self
    }

    /// Every submitted transaction gets a receipt with `status`.
    pub fn mining_with_status(mut self, status: u64) -> Self {
        self.mine_on_send = Some(status);
        self
    }

    /// Logs attached to every receipt produced by `mining_with_status`.
    pub fn with_mined_logs(mut self, logs: Vec<Log>) -> Self {
        self.mined_logs = logs;
        self
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        *self.chain_id.lock().unwrap() = chain_id;
    }

    /// Makes a receipt visible from the `visible_from`-th poll onwards.
    pub fn insert_receipt(&self, tx_hash: H256, visible_from: u64, receipt: TransactionReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(tx_hash, (visible_from, receipt));
    }

    pub fn insert_transaction(&self, tx: Transaction) {
        self.transactions.lock().unwrap().insert(tx.hash, tx);
    }

    pub fn set_call_result(&self, selector: [u8; 4], output: Bytes) {
        self.call_results.lock().unwrap().insert(selector, output);
    }

    pub fn receipt_polls(&self, tx_hash: H256) -> u64 {
        self.receipt_polls
            .lock()
            .unwrap()
            .get(&tx_hash)
            .copied()
            .unwrap_or(0)
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }

    pub fn simulated(&self) -> Vec<TypedTransaction> {
        self.simulated.lock().unwrap().clone()
    }
}

pub fn receipt(tx_hash: H256, status: u64, logs: Vec<Log>) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: tx_hash,
        status: Some(U64::from(status)),
        gas_used: Some(U256::from(90_000u64)),
        block_number: Some(U64::from(100u64)),
        logs,
        ..Default::default()
    }
}

pub fn transaction(
    tx_hash: H256,
    from: Address,
    to: Option<Address>,
    input: Bytes,
    value: U256,
) -> Transaction {
    Transaction {
        hash: tx_hash,
        from,
        to,
        input,
        value,
        ..Default::default()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<u64> {
        Ok(*self.chain_id.lock().unwrap())
    }

    async fn nonce(&self, _address: Address) -> Result<U256> {
        Ok(self.nonce)
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256> {
        self.simulated.lock().unwrap().push(tx.clone());
        self.estimate
            .clone()
            .map_err(EngineError::SimulationFailed)
    }

    async fn latest_base_fee(&self) -> Result<Option<U256>> {
        Ok(self.base_fee)
    }

    async fn max_priority_fee(&self) -> Result<U256> {
        self.priority_fee
            .ok_or_else(|| EngineError::BlockchainRPC("method eth_maxPriorityFeePerGas not found".into()))
    }

    async fn gas_price(&self) -> Result<U256> {
        self.gas_price
            .ok_or_else(|| EngineError::BlockchainRPC("eth_gasPrice unavailable".into()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let tx_hash = H256::from(keccak256(&raw));
        self.sent.lock().unwrap().push(raw);
        if let Some(status) = self.mine_on_send {
            self.insert_receipt(tx_hash, 1, receipt(tx_hash, status, self.mined_logs.clone()));
        }
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>> {
        let poll = {
            let mut polls = self.receipt_polls.lock().unwrap();
            let count = polls.entry(tx_hash).or_insert(0);
            *count += 1;
            *count
        };
        Ok(self
            .receipts
            .lock()
            .unwrap()
            .get(&tx_hash)
            .filter(|(visible_from, _)| poll >= *visible_from)
            .map(|(_, receipt)| receipt.clone()))
    }

    async fn transaction(&self, tx_hash: H256) -> Result<Option<Transaction>> {
        Ok(self.transactions.lock().unwrap().get(&tx_hash).cloned())
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes> {
        let data = tx
            .data()
            .ok_or_else(|| EngineError::BlockchainRPC("eth_call without data".into()))?;
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| EngineError::BlockchainRPC("eth_call without selector".into()))?;
        self.call_results
            .lock()
            .unwrap()
            .get(&selector)
            .cloned()
            .ok_or_else(|| EngineError::BlockchainRPC("execution reverted".into()))
    }
}
