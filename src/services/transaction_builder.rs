use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, TransactionRequest, H256, U256};

use crate::{
    crypto::hash::keccak256,
    error::{EngineError, Result},
};

use super::fee_strategy::{gas_limit_with_margin, select_fee_quote, FeeQuote, GasPricing};
use super::onchain::ChainClient;

/// One contract call to be signed. Built fresh for every submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub nonce: Option<U256>,
    pub gas_limit: Option<U256>,
}

impl CallRequest {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self {
            to,
            data,
            value: U256::zero(),
            nonce: None,
            gas_limit: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_nonce(mut self, nonce: U256) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Skips estimation and uses `gas_limit` verbatim.
    pub fn with_gas_limit(mut self, gas_limit: U256) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    fn simulation(&self, from: Address, nonce: U256) -> TypedTransaction {
        TransactionRequest::new()
            .from(from)
            .to(self.to)
            .value(self.value)
            .data(self.data.clone())
            .nonce(nonce)
            .into()
    }
}

/// Signed, RLP-encoded transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: H256,
    pub from: Address,
    pub nonce: U256,
    pub chain_id: u64,
    pub fee: FeeQuote,
}

/// Resolves nonce, gas and fees, then signs locally.
///
/// Consumes the wallet; the key is dropped when the call returns.
pub async fn build_signed_transaction<C: ChainClient + ?Sized>(
    client: &C,
    wallet: LocalWallet,
    request: CallRequest,
) -> Result<SignedTransaction> {
    let from = wallet.address();

    let nonce = match request.nonce {
        Some(nonce) => nonce,
        None => client.nonce(from).await?,
    };

    let gas_limit = match request.gas_limit {
        Some(gas_limit) => gas_limit,
        None => {
            let estimate = client
                .estimate_gas(&request.simulation(from, nonce))
                .await
                .map_err(|e| match e {
                    EngineError::SimulationFailed(_) => e,
                    other => EngineError::SimulationFailed(other.to_string()),
                })?;
            tracing::debug!("Gas estimate for call to {:?}: {}", request.to, estimate);
            gas_limit_with_margin(estimate)
        }
    };

    let fee = select_fee_quote(client, gas_limit).await?;
    let tx = assemble(&request, from, nonce, &fee);
    sign(wallet, tx, fee, nonce)
}

fn assemble(request: &CallRequest, from: Address, nonce: U256, fee: &FeeQuote) -> TypedTransaction {
    match fee.pricing {
        GasPricing::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => Eip1559TransactionRequest::new()
            .from(from)
            .to(request.to)
            .value(request.value)
            .data(request.data.clone())
            .nonce(nonce)
            .gas(fee.gas_limit)
            .max_fee_per_gas(max_fee_per_gas)
            .max_priority_fee_per_gas(max_priority_fee_per_gas)
            .chain_id(fee.chain_id)
            .into(),
        GasPricing::Legacy { gas_price } => TransactionRequest::new()
            .from(from)
            .to(request.to)
            .value(request.value)
            .data(request.data.clone())
            .nonce(nonce)
            .gas(fee.gas_limit)
            .gas_price(gas_price)
            .chain_id(fee.chain_id)
            .into(),
    }
}

fn sign(
    wallet: LocalWallet,
    tx: TypedTransaction,
    fee: FeeQuote,
    nonce: U256,
) -> Result<SignedTransaction> {
    let wallet = wallet.with_chain_id(fee.chain_id);
    let signature = wallet
        .sign_transaction_sync(&tx)
        .map_err(|e| EngineError::Signing(e.to_string()))?;
    let raw = tx.rlp_signed(&signature);
    let hash = H256::from(keccak256(&raw));

    tracing::debug!(
        "Signed {} transaction {:#x} (nonce {}, chain {})",
        if fee.is_eip1559() { "EIP-1559" } else { "legacy" },
        hash,
        nonce,
        fee.chain_id
    );

    Ok(SignedTransaction {
        raw,
        hash,
        from: wallet.address(),
        nonce,
        chain_id: fee.chain_id,
        fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{gwei, MockChain};
    use ethers::utils::rlp::Rlp;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn wallet() -> LocalWallet {
        KEY.parse().unwrap()
    }

    fn request() -> CallRequest {
        CallRequest::new(Address::repeat_byte(0xcc), Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]))
            .with_value(U256::exp10(18))
    }

    #[tokio::test]
    async fn builds_eip1559_transaction_with_buffered_gas() {
        let chain = MockChain::new(1).with_nonce(7);
        let signed = build_signed_transaction(&chain, wallet(), request()).await.unwrap();

        assert_eq!(signed.raw[0], 0x02);
        assert_eq!(signed.nonce, U256::from(7u64));
        assert_eq!(signed.chain_id, 1);
        assert_eq!(signed.fee.gas_limit, U256::from(120_000u64));
        assert_eq!(signed.hash, H256::from(keccak256(&signed.raw)));
        assert_eq!(signed.from, wallet().address());

        let decoded = TypedTransaction::decode_signed(&Rlp::new(&signed.raw)).unwrap();
        assert_eq!(decoded.1.recover(decoded.0.sighash()).unwrap(), wallet().address());
        assert_eq!(decoded.0.value(), Some(&U256::exp10(18)));
        assert_eq!(decoded.0.chain_id(), Some(1u64.into()));
    }

    #[tokio::test]
    async fn builds_legacy_transaction_without_base_fee() {
        let chain = MockChain::new(31337).with_base_fee(None).with_gas_price(Some(gwei(3)));
        let signed = build_signed_transaction(&chain, wallet(), request()).await.unwrap();

        assert!(signed.raw[0] >= 0xc0, "legacy transactions are a bare RLP list");
        assert_eq!(signed.fee.pricing, GasPricing::Legacy { gas_price: gwei(3) });
        assert_eq!(signed.chain_id, 31337);
    }

    #[tokio::test]
    async fn simulation_failure_prevents_signing() {
        let chain = MockChain::new(1).with_estimate(Err("execution reverted: bad pool".into()));
        let err = build_signed_transaction(&chain, wallet(), request()).await.unwrap_err();

        match err {
            EngineError::SimulationFailed(reason) => assert!(reason.contains("bad pool")),
            other => panic!("expected SimulationFailed, got {other:?}"),
        }
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn simulation_carries_sender_value_and_nonce() {
        let chain = MockChain::new(1).with_nonce(3);
        build_signed_transaction(&chain, wallet(), request()).await.unwrap();

        let simulated = chain.simulated();
        assert_eq!(simulated.len(), 1);
        assert_eq!(simulated[0].from(), Some(&wallet().address()));
        assert_eq!(simulated[0].value(), Some(&U256::exp10(18)));
        assert_eq!(simulated[0].nonce(), Some(&U256::from(3u64)));
    }

    #[tokio::test]
    async fn overrides_skip_network_lookups() {
        let chain = MockChain::new(1).with_estimate(Err("should not be called".into()));
        let signed = build_signed_transaction(
            &chain,
            wallet(),
            request()
                .with_nonce(U256::from(11u64))
                .with_gas_limit(U256::from(90_000u64)),
        )
        .await
        .unwrap();

        assert_eq!(signed.nonce, U256::from(11u64));
        assert_eq!(signed.fee.gas_limit, U256::from(90_000u64));
        assert!(chain.simulated().is_empty());
    }

    #[tokio::test]
    async fn identical_requests_share_a_hash_and_distinct_ones_do_not() {
        let chain = MockChain::new(1);
        let a = build_signed_transaction(&chain, wallet(), request()).await.unwrap();
        let b = build_signed_transaction(&chain, wallet(), request()).await.unwrap();
        let c = build_signed_transaction(&chain, wallet(), request().with_nonce(U256::one()))
            .await
            .unwrap();

        assert_eq!(a.raw, b.raw);
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
    }
}
