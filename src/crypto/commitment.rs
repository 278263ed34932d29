use ethers::types::U256;

use crate::crypto::hash::keccak256;
use crate::models::Direction;

/// Hash binding a hidden direction to a game: `keccak256(abi.encodePacked(uint256 gameId, uint8 direction, uint256 nonce))`.
///
/// The packed preimage is 65 bytes. `ethers::abi::encode_packed` widens every
/// `Token::Uint` to 32 bytes, so the layout is written out by hand.
pub fn commit(game_id: U256, direction: Direction, nonce: U256) -> [u8; 32] {
    let mut preimage = [0u8; 65];
    game_id.to_big_endian(&mut preimage[..32]);
    preimage[32] = direction.as_u8();
    nonce.to_big_endian(&mut preimage[33..]);
    keccak256(&preimage)
}

/// Fresh 256-bit secret for a commitment.
pub fn random_nonce() -> U256 {
    let bytes: [u8; 32] = rand::random();
    U256::from_big_endian(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn commitment_is_deterministic() {
        let a = commit(U256::from(7u64), Direction::Long, U256::from(12345u64));
        let b = commit(U256::from(7u64), Direction::Long, U256::from(12345u64));
        assert_eq!(a, b);
    }

    #[test]
    fn commitment_matches_hand_packed_preimage() {
        // 32-byte gameId=1, 1-byte direction=1, 32-byte nonce=2
        let mut packed = vec![0u8; 31];
        packed.push(1);
        packed.push(1);
        packed.extend_from_slice(&[0u8; 31]);
        packed.push(2);
        assert_eq!(packed.len(), 65);

        assert_eq!(
            commit(U256::one(), Direction::Short, U256::from(2u64)),
            keccak256(&packed)
        );
    }

    #[test]
    fn changing_any_input_changes_commitment() {
        let base = commit(U256::from(1u64), Direction::Long, U256::from(99u64));
        assert_ne!(base, commit(U256::from(2u64), Direction::Long, U256::from(99u64)));
        assert_ne!(base, commit(U256::from(1u64), Direction::Short, U256::from(99u64)));
        assert_ne!(base, commit(U256::from(1u64), Direction::Long, U256::from(100u64)));
    }

    #[test]
    fn no_collisions_across_sample() {
        let mut seen = HashSet::new();
        for game_id in 0u64..20 {
            for direction in [Direction::Long, Direction::Short] {
                for nonce in 0u64..20 {
                    let digest = commit(U256::from(game_id), direction, U256::from(nonce));
                    assert!(seen.insert(digest), "collision at {game_id}/{direction}/{nonce}");
                }
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn random_nonces_differ() {
        assert_ne!(random_nonce(), random_nonce());
    }
}
