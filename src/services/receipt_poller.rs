use ethers::types::{TransactionReceipt, H256, U64};
use tokio::time::{sleep, Duration, Instant};

use crate::{
    config::Config,
    constants::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_RECEIPT_TIMEOUT_SECS},
    error::{EngineError, Result},
};

use super::onchain::ChainClient;
use super::transaction_builder::SignedTransaction;

/// Terminal states of a submitted transaction. A timeout is reported as an error instead.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    MinedSuccess(TransactionReceipt),
    MinedFailure(TransactionReceipt),
}

impl PollOutcome {
    fn from_receipt(receipt: TransactionReceipt) -> Self {
        if receipt.status == Some(U64::one()) {
            PollOutcome::MinedSuccess(receipt)
        } else {
            PollOutcome::MinedFailure(receipt)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::MinedSuccess(_))
    }

    pub fn receipt(&self) -> &TransactionReceipt {
        match self {
            PollOutcome::MinedSuccess(receipt) | PollOutcome::MinedFailure(receipt) => receipt,
        }
    }

    pub fn into_receipt(self) -> TransactionReceipt {
        match self {
            PollOutcome::MinedSuccess(receipt) | PollOutcome::MinedFailure(receipt) => receipt,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReceiptPoller {
    poll_interval: Duration,
    timeout: Duration,
}

impl Default for ReceiptPoller {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_secs(DEFAULT_RECEIPT_TIMEOUT_SECS),
        }
    }
}

impl ReceiptPoller {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_secs(config.receipt_timeout_secs),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Broadcasts `signed` after checking it targets the endpoint's chain.
    pub async fn submit<C: ChainClient + ?Sized>(
        &self,
        client: &C,
        signed: &SignedTransaction,
    ) -> Result<H256> {
        let current = client.chain_id().await?;
        if current != signed.chain_id {
            return Err(EngineError::ChainIdMismatch {
                signed: signed.chain_id,
                current,
            });
        }

        let tx_hash = client.send_raw_transaction(signed.raw.clone()).await?;
        if tx_hash != signed.hash {
            tracing::warn!(
                "Node reported hash {:#x} for transaction signed as {:#x}",
                tx_hash,
                signed.hash
            );
        }
        tracing::info!("Transaction sent: {:#x}", tx_hash);
        Ok(tx_hash)
    }

    pub async fn submit_and_wait<C: ChainClient + ?Sized>(
        &self,
        client: &C,
        signed: &SignedTransaction,
    ) -> Result<(H256, PollOutcome)> {
        let tx_hash = self.submit(client, signed).await?;
        let outcome = self.wait(client, tx_hash).await?;
        Ok((tx_hash, outcome))
    }

    /// Polls until `tx_hash` has a receipt or the timeout elapses.
    ///
    /// A missing receipt is the normal state of a pending transaction.
    /// Dropping the returned future stops waiting; the transaction itself
    /// cannot be withdrawn.
    pub async fn wait<C: ChainClient + ?Sized>(
        &self,
        client: &C,
        tx_hash: H256,
    ) -> Result<PollOutcome> {
        let started = Instant::now();
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            if let Some(receipt) = client.transaction_receipt(tx_hash).await? {
                let outcome = PollOutcome::from_receipt(receipt);
                let gas_used = outcome.receipt().gas_used.unwrap_or_default();
                if outcome.is_success() {
                    tracing::info!("Transaction {:#x} successful, gas used: {}", tx_hash, gas_used);
                } else {
                    tracing::warn!("Transaction {:#x} failed, gas used: {}", tx_hash, gas_used);
                }
                return Ok(outcome);
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(EngineError::Timeout {
                    tx_hash,
                    waited,
                    attempts,
                });
            }
            tracing::trace!("Receipt for {:#x} not available yet (poll {})", tx_hash, attempts);
            sleep(self.poll_interval.min(self.timeout - waited)).await;
        }
    }
}
