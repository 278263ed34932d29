use ethers::abi::{encode, Token};
use ethers::signers::LocalWallet;
use ethers::types::transaction::eip712::EIP712Domain;
use ethers::types::{Address, Bytes, Signature, H256, U256};

use crate::crypto::hash::keccak256;
use crate::error::{EngineError, Result};

/// Domain the contract verifies authorizations against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedDataDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl TypedDataDomain {
    pub fn separator(&self) -> [u8; 32] {
        EIP712Domain {
            name: Some(self.name.clone()),
            version: Some(self.version.clone()),
            chain_id: Some(U256::from(self.chain_id)),
            verifying_contract: Some(self.verifying_contract),
            salt: None,
        }
        .separator()
    }
}

/// A struct signed under the EIP-712 scheme. `TYPE` must match the
/// contract's type string exactly, including field order and names.
pub trait TypedMessage {
    const TYPE: &'static str;

    fn field_tokens(&self) -> Vec<Token>;

    fn type_hash() -> [u8; 32] {
        keccak256(Self::TYPE.as_bytes())
    }

    fn struct_hash(&self) -> [u8; 32] {
        let mut tokens = Vec::with_capacity(4);
        tokens.push(Token::FixedBytes(Self::type_hash().to_vec()));
        tokens.extend(self.field_tokens());
        keccak256(&encode(&tokens))
    }
}

/// Player 1's consent for `player2` to join `game_id` until `signature_expiration`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGameAuthorization {
    pub game_id: U256,
    pub player2: Address,
    pub signature_expiration: U256,
}

impl TypedMessage for JoinGameAuthorization {
    const TYPE: &'static str = "JoinGame(uint256 gameId,address player2,uint256 signatureExpiration)";

    fn field_tokens(&self) -> Vec<Token> {
        vec![
            Token::Uint(self.game_id),
            Token::Address(self.player2),
            Token::Uint(self.signature_expiration),
        ]
    }
}

/// Backend attestation that `player` committed `hashed_direction` in `game_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPositionAttestation {
    pub game_id: U256,
    pub player: Address,
    pub hashed_direction: [u8; 32],
}

impl TypedMessage for PostPositionAttestation {
    const TYPE: &'static str = "PostPosition(uint256 gameId,address player,bytes32 hashedDirection)";

    fn field_tokens(&self) -> Vec<Token> {
        vec![
            Token::Uint(self.game_id),
            Token::Address(self.player),
            Token::FixedBytes(self.hashed_direction.to_vec()),
        ]
    }
}

/// `keccak256(0x1901 ‖ domainSeparator ‖ structHash)`
pub fn typed_data_digest<M: TypedMessage>(domain: &TypedDataDomain, message: &M) -> H256 {
    let mut preimage = Vec::with_capacity(66);
    preimage.extend_from_slice(&[0x19, 0x01]);
    preimage.extend_from_slice(&domain.separator());
    preimage.extend_from_slice(&message.struct_hash());
    H256::from(keccak256(&preimage))
}

/// Signs `message` with `wallet`, returning the 65-byte `r ‖ s ‖ v` signature the contract expects.
///
/// The wallet is consumed so the key does not outlive the call.
pub fn sign_typed<M: TypedMessage>(
    wallet: LocalWallet,
    domain: &TypedDataDomain,
    message: &M,
) -> Result<Bytes> {
    let digest = typed_data_digest(domain, message);
    let signature = wallet
        .sign_hash(digest)
        .map_err(|e| EngineError::Signing(e.to_string()))?;
    tracing::debug!("Signed {} digest {:#x}", type_name::<M>(), digest);
    Ok(Bytes::from(signature.to_vec()))
}

/// Recovers the address that produced `signature` over `message`.
pub fn recover_signer<M: TypedMessage>(
    domain: &TypedDataDomain,
    message: &M,
    signature: &[u8],
) -> Result<Address> {
    let signature = Signature::try_from(signature)
        .map_err(|e| EngineError::BadRequest(format!("Malformed signature: {}", e)))?;
    signature
        .recover(typed_data_digest(domain, message))
        .map_err(|e| EngineError::BadRequest(format!("Signature recovery failed: {}", e)))
}

fn type_name<M: TypedMessage>() -> &'static str {
    M::TYPE.split('(').next().unwrap_or(M::TYPE)
}
