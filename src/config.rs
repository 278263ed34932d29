use serde::Deserialize;
use std::env;

use crate::constants::{
    DEFAULT_EIP712_NAME, DEFAULT_EIP712_VERSION, DEFAULT_JOIN_SIGNATURE_TTL_SECS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_RECEIPT_TIMEOUT_SECS,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Chain
    pub rpc_url: String,
    pub contract_address: String,
    pub abi_path: Option<String>,

    // Typed-data domain
    pub eip712_name: String,
    pub eip712_version: String,

    // Transactions
    pub receipt_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub join_signature_ttl_secs: u64,
}

impl Config {
    /// Reads `MORTALCOIN_*` variables, loading `.env` first when present.
    ///
    /// The RPC URL and contract address may be supplied later on the command
    /// line, so they default to empty here and are checked by `validate`.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            rpc_url: env::var("MORTALCOIN_RPC_URL").unwrap_or_default(),
            contract_address: env::var("MORTALCOIN_CONTRACT_ADDRESS").unwrap_or_default(),
            abi_path: env::var("MORTALCOIN_ABI_PATH").ok().filter(|s| !s.trim().is_empty()),

            eip712_name: env::var("MORTALCOIN_EIP712_NAME")
                .unwrap_or_else(|_| DEFAULT_EIP712_NAME.to_string()),
            eip712_version: env::var("MORTALCOIN_EIP712_VERSION")
                .unwrap_or_else(|_| DEFAULT_EIP712_VERSION.to_string()),

            receipt_timeout_secs: env::var("MORTALCOIN_RECEIPT_TIMEOUT_SECS")
                .unwrap_or_else(|_| DEFAULT_RECEIPT_TIMEOUT_SECS.to_string())
                .parse()?,
            poll_interval_ms: env::var("MORTALCOIN_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| DEFAULT_POLL_INTERVAL_MS.to_string())
                .parse()?,
            join_signature_ttl_secs: env::var("MORTALCOIN_JOIN_SIGNATURE_TTL_SECS")
                .unwrap_or_else(|_| DEFAULT_JOIN_SIGNATURE_TTL_SECS.to_string())
                .parse()?,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc_url.trim().is_empty() {
            anyhow::bail!("MORTALCOIN_RPC_URL is empty");
        }
        if self.contract_address.trim().is_empty() {
            anyhow::bail!("MORTALCOIN_CONTRACT_ADDRESS is empty");
        }
        crate::utils::parse_address(&self.contract_address)?;

        if self.poll_interval_ms == 0 {
            anyhow::bail!("MORTALCOIN_POLL_INTERVAL_MS must be > 0");
        }
        if self.receipt_timeout_secs == 0 {
            anyhow::bail!("MORTALCOIN_RECEIPT_TIMEOUT_SECS must be > 0");
        }
        if self.poll_interval_ms > self.receipt_timeout_secs * 1_000 {
            tracing::warn!("Poll interval exceeds receipt timeout; only one poll will run");
        }
        if self.join_signature_ttl_secs < 60 {
            tracing::warn!("Join signatures expire in under a minute");
        }
        if self.contract_address.trim_start_matches("0x").chars().all(|c| c == '0') {
            tracing::warn!("Using zero contract address");
        }

        Ok(())
    }
}
