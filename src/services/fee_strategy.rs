use ethers::types::U256;
use serde::Serialize;

use crate::{
    constants::{GAS_LIMIT_DENOMINATOR, GAS_LIMIT_NUMERATOR, PRIORITY_FEE_MULTIPLIER},
    error::{EngineError, Result},
};

use super::onchain::ChainClient;

/// How a transaction pays for gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GasPricing {
    #[serde(rename_all = "camelCase")]
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
    #[serde(rename_all = "camelCase")]
    Legacy { gas_price: U256 },
}

/// Fee fields for exactly one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    pub pricing: GasPricing,
    pub gas_limit: U256,
    pub chain_id: u64,
}

impl FeeQuote {
    pub fn is_eip1559(&self) -> bool {
        matches!(self.pricing, GasPricing::Eip1559 { .. })
    }

    /// EIP-2718 type tag, `None` for legacy transactions.
    pub fn transaction_type(&self) -> Option<u8> {
        match self.pricing {
            GasPricing::Eip1559 { .. } => Some(2),
            GasPricing::Legacy { .. } => None,
        }
    }

    /// Upper bound of the fee the sender can be charged.
    pub fn max_fee_cost(&self) -> U256 {
        let per_gas = match self.pricing {
            GasPricing::Eip1559 { max_fee_per_gas, .. } => max_fee_per_gas,
            GasPricing::Legacy { gas_price } => gas_price,
        };
        self.gas_limit.saturating_mul(per_gas)
    }
}

/// `ceil(estimate * 1.2)` in integer arithmetic.
pub fn gas_limit_with_margin(estimate: U256) -> U256 {
    let scaled = estimate.saturating_mul(U256::from(GAS_LIMIT_NUMERATOR));
    let denominator = U256::from(GAS_LIMIT_DENOMINATOR);
    (scaled + denominator - 1) / denominator
}

/// Dynamic-fee pricing, or `Ok(None)` when the latest block carries no base fee.
pub async fn try_eip1559<C: ChainClient + ?Sized>(client: &C) -> Result<Option<GasPricing>> {
    let priority_fee = client.max_priority_fee().await?;
    let Some(base_fee) = client.latest_base_fee().await? else {
        return Ok(None);
    };

    let buffer = priority_fee.saturating_mul(U256::from(PRIORITY_FEE_MULTIPLIER));
    Ok(Some(GasPricing::Eip1559 {
        max_fee_per_gas: base_fee.saturating_add(buffer),
        max_priority_fee_per_gas: priority_fee,
    }))
}

pub async fn legacy_pricing<C: ChainClient + ?Sized>(client: &C) -> Result<GasPricing> {
    let gas_price = client
        .gas_price()
        .await
        .map_err(|e| EngineError::FeeStrategy(format!("legacy gas price unavailable: {}", e)))?;
    Ok(GasPricing::Legacy { gas_price })
}

/// Prefers EIP-1559 pricing and falls back to a legacy gas price.
///
/// The fallback is the only error the engine swallows; a failing legacy
/// lookup is fatal.
pub async fn select_fee_quote<C: ChainClient + ?Sized>(
    client: &C,
    gas_limit: U256,
) -> Result<FeeQuote> {
    let pricing = match try_eip1559(client).await {
        Ok(Some(pricing)) => pricing,
        Ok(None) => {
            tracing::info!("Latest block has no baseFeePerGas, using legacy gas price");
            legacy_pricing(client).await?
        }
        Err(err) => {
            tracing::warn!("EIP-1559 fee lookup failed ({}), falling back to legacy gas price", err);
            legacy_pricing(client).await?
        }
    };
    let chain_id = client.chain_id().await?;

    let quote = FeeQuote {
        pricing,
        gas_limit,
        chain_id,
    };
    tracing::debug!("Fee quote: {:?}", quote);
    Ok(quote)
}
