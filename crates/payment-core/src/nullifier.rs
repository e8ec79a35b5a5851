//! Nullifier and deposit-id math (spec §4.7).
//!
//! `nullifier = keccak256(commitment_bytes32 || seq_u8 || amount_u256_be)`.
//! `deposit_id_bytes32 = zero_pad_left(deposit_id_u64_be, 32)` — the `uint64` occupies
//! the low 8 bytes, matching how Solidity reads `uint64(uint256(bytes32))`.

use sha3::{Digest, Keccak256};

use crate::error::{CoreError, Result};

/// Big-endian 32-byte encoding of a u128 amount. Allocation amounts in this system fit
/// comfortably in a u128 (the wire format is a `uint256`, but no amount in practice
/// exceeds u128 range); values are stored as `rust_decimal::Decimal` and converted to
/// this representation only at the nullifier-math/on-chain boundary.
pub fn amount_to_be32(amount: u128) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[16..].copy_from_slice(&amount.to_be_bytes());
    out
}

/// `zero_pad_left(deposit_id_u64_be, 32)`.
pub fn deposit_id_to_be32(deposit_id: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&deposit_id.to_be_bytes());
    out
}

/// Inverse of [`deposit_id_to_be32`]: reads the low 8 bytes as a big-endian u64,
/// matching Solidity's `uint64(uint256(bytes32))` truncation.
pub fn deposit_id_from_be32(bytes: &[u8; 32]) -> u64 {
    let mut low = [0u8; 8];
    low.copy_from_slice(&bytes[24..]);
    u64::from_be_bytes(low)
}

/// `nullifier = keccak256(commitment || seq || amount_be32)` (I2).
pub fn derive_nullifier(commitment: &[u8; 32], seq: u8, amount: u128) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(commitment);
    hasher.update([seq]);
    hasher.update(amount_to_be32(amount));
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Re-derive and compare; used by the lifecycle state machine to verify P1 before
/// persisting (defense in depth — the only writer of nullifiers is the proof pipeline,
/// but this makes the invariant checkable wherever a nullifier is handled).
pub fn verify_nullifier(
    nullifier: &[u8; 32],
    commitment: &[u8; 32],
    seq: u8,
    amount: u128,
) -> Result<()> {
    let expected = derive_nullifier(commitment, seq, amount);
    if &expected != nullifier {
        return Err(CoreError::Nullifier(format!(
            "nullifier mismatch for seq {seq}: expected {}, got {}",
            hex::encode(expected),
            hex::encode(nullifier)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullifier_is_deterministic() {
        let commitment = [0xABu8; 32];
        let n1 = derive_nullifier(&commitment, 0, 50_000_000);
        let n2 = derive_nullifier(&commitment, 0, 50_000_000);
        assert_eq!(n1, n2);
    }

    #[test]
    fn nullifier_differs_by_seq() {
        let commitment = [0xABu8; 32];
        let n0 = derive_nullifier(&commitment, 0, 50_000_000);
        let n1 = derive_nullifier(&commitment, 1, 50_000_000);
        assert_ne!(n0, n1);
    }

    #[test]
    fn nullifier_differs_by_amount() {
        let commitment = [0xABu8; 32];
        let n0 = derive_nullifier(&commitment, 0, 50_000_000);
        let n1 = derive_nullifier(&commitment, 0, 50_000_001);
        assert_ne!(n0, n1);
    }

    #[test]
    fn nullifier_changes_with_new_commitment() {
        // Regression for the "commitment-change rule": a stale commitment must not
        // produce the same nullifier as a fresh one, even for identical (seq, amount).
        let old_commitment = [0x01u8; 32];
        let new_commitment = [0x02u8; 32];
        let n_old = derive_nullifier(&old_commitment, 3, 1000);
        let n_new = derive_nullifier(&new_commitment, 3, 1000);
        assert_ne!(n_old, n_new);
    }

    #[test]
    fn verify_nullifier_round_trips() {
        let commitment = [0x42u8; 32];
        let n = derive_nullifier(&commitment, 7, 123456);
        assert!(verify_nullifier(&n, &commitment, 7, 123456).is_ok());
        assert!(verify_nullifier(&n, &commitment, 7, 123457).is_err());
    }

    // R1: encoding/decoding a u64 deposit id through bytes32 round-trips for all u64.
    #[test]
    fn deposit_id_round_trip_sampled() {
        let samples: [u64; 7] = [
            0,
            1,
            u64::MAX,
            u64::MAX - 1,
            18_323_478,
            1 << 32,
            (1u64 << 63) + 7,
        ];
        for &id in &samples {
            let encoded = deposit_id_to_be32(id);
            assert_eq!(deposit_id_from_be32(&encoded), id);
            // the u64 must occupy exactly the low 8 bytes
            assert_eq!(&encoded[..24], &[0u8; 24]);
        }
    }
}
