// Input parsing helpers shared by the CLI and services

use ethers::signers::LocalWallet;
use ethers::types::{Address, H256, U256};
use ethers::utils::{parse_ether, to_checksum};

use crate::error::{EngineError, Result};

/// Parses a game id, nonce or other integer given as decimal or `0x` hex.
pub fn parse_u256(value: &str) -> Result<U256> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::BadRequest("Empty integer".to_string()));
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return U256::from_str_radix(hex, 16).map_err(|e| {
            EngineError::BadRequest(format!(
                "Invalid hex integer {}: {}. Must be a decimal number or 0x-prefixed hex.",
                trimmed, e
            ))
        });
    }
    U256::from_dec_str(trimmed).map_err(|e| {
        EngineError::BadRequest(format!(
            "Invalid integer {}: {}. Must be a decimal number or 0x-prefixed hex.",
            trimmed, e
        ))
    })
}

/// Accepts any checksum casing.
pub fn parse_address(value: &str) -> Result<Address> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|e| EngineError::BadRequest(format!("Invalid address {}: {}", value.trim(), e)))
}

pub fn parse_tx_hash(value: &str) -> Result<H256> {
    value
        .trim()
        .parse::<H256>()
        .map_err(|e| EngineError::BadRequest(format!("Invalid transaction hash: {}", e)))
}

pub fn parse_bytes32(value: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(value.trim().trim_start_matches("0x"))
        .map_err(|e| EngineError::BadRequest(format!("Invalid hex: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| EngineError::BadRequest("Expected 32 bytes of hex".to_string()))
}

/// ETH amount like `0.5` converted to wei.
pub fn parse_eth_amount(value: &str) -> Result<U256> {
    parse_ether(value.trim())
        .map_err(|e| EngineError::BadRequest(format!("Invalid ETH amount {}: {}", value.trim(), e)))
}

/// The key itself never appears in the error message.
pub fn parse_wallet(private_key: &str) -> Result<LocalWallet> {
    private_key
        .trim()
        .parse::<LocalWallet>()
        .map_err(|_| EngineError::BadRequest("Invalid private key".to_string()))
}

pub fn checksum(address: &Address) -> String {
    to_checksum(address, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_u256_accepts_decimal_and_hex() {
        assert_eq!(parse_u256("42").unwrap(), U256::from(42u64));
        assert_eq!(parse_u256("0x2a").unwrap(), U256::from(42u64));
        assert_eq!(parse_u256(" 0X2A ").unwrap(), U256::from(42u64));
    }

    #[test]
    fn parse_u256_rejects_garbage() {
        assert!(matches!(parse_u256("forty-two"), Err(EngineError::BadRequest(_))));
        assert!(matches!(parse_u256(""), Err(EngineError::BadRequest(_))));
        assert!(matches!(parse_u256("0xzz"), Err(EngineError::BadRequest(_))));
    }

    #[test]
    fn parse_address_ignores_case() {
        let lower = parse_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        let checksummed = parse_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        assert_eq!(lower, checksummed);
        assert_eq!(checksum(&lower), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
    }

    #[test]
    fn parse_eth_amount_converts_to_wei() {
        assert_eq!(parse_eth_amount("1").unwrap(), U256::exp10(18));
        assert_eq!(parse_eth_amount("0.01").unwrap(), U256::exp10(16));
    }

    #[test]
    fn parse_wallet_hides_key_in_error() {
        let err = parse_wallet("0xnot-a-key").unwrap_err();
        assert!(!err.to_string().contains("not-a-key"));
    }

    #[test]
    fn parse_bytes32_requires_exact_length() {
        assert!(parse_bytes32(&format!("0x{}", "ab".repeat(32))).is_ok());
        assert!(parse_bytes32("0xabcd").is_err());
    }
}
