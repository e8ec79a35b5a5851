//! Parses the ZKVM's `public_values` blob (spec §6, "bit-exact" layout):
//!
//! 1. `commitment` 32 B
//! 2. `owner` 20 B right-padded to 32 B (EVM) or native 32 B
//! 3. `total_amount` 32 B big-endian uint256
//! 4. `deposit_id` 32 B (low 8 B carry the u64)
//! 5. `coin_type` 4 B big-endian uint32 (SLIP-44)
//! 6. `token_symbol` length-prefixed UTF-8
//! 7. `token_decimals` 1 B
//!
//! Open question (spec §9): the source gives no fixed width for the `token_symbol`
//! length prefix. We follow the single-byte-length convention used everywhere else in
//! this blob (`seq`, `token_decimals` are both single bytes) rather than a 32-byte
//! ABI-style length word, since this layout is explicitly a custom concatenation, not
//! real `abi.encode` output (which would use an offset table for a dynamic field, not
//! an inline length-prefixed string).

use crate::error::{CoreError, Result};
use crate::nullifier::deposit_id_from_be32;
use crate::wire::PublicValues;

const FIXED_PREFIX_LEN: usize = 32 + 32 + 32 + 32 + 4; // commitment+owner+amount+deposit_id+coin_type

pub fn parse_public_values(bytes: &[u8]) -> Result<PublicValues> {
    if bytes.len() < FIXED_PREFIX_LEN + 1 + 1 {
        return Err(CoreError::Nullifier(format!(
            "public_values too short: {} bytes",
            bytes.len()
        )));
    }

    let mut offset = 0usize;
    let mut commitment = [0u8; 32];
    commitment.copy_from_slice(&bytes[offset..offset + 32]);
    offset += 32;

    let mut owner = [0u8; 32];
    owner.copy_from_slice(&bytes[offset..offset + 32]);
    offset += 32;

    let mut amount_be = [0u8; 32];
    amount_be.copy_from_slice(&bytes[offset..offset + 32]);
    offset += 32;
    // total_amount is a uint256 on the wire; this system's amounts fit in u128, so
    // reject anything that would silently truncate.
    if amount_be[..16] != [0u8; 16] {
        return Err(CoreError::Nullifier(
            "total_amount exceeds u128 range".into(),
        ));
    }
    let mut amount_low = [0u8; 16];
    amount_low.copy_from_slice(&amount_be[16..]);
    let total_amount = u128::from_be_bytes(amount_low);

    let mut deposit_id_bytes = [0u8; 32];
    deposit_id_bytes.copy_from_slice(&bytes[offset..offset + 32]);
    offset += 32;
    let deposit_id = deposit_id_from_be32(&deposit_id_bytes);

    let mut coin_type_bytes = [0u8; 4];
    coin_type_bytes.copy_from_slice(&bytes[offset..offset + 4]);
    offset += 4;
    let coin_type = u32::from_be_bytes(coin_type_bytes);

    let symbol_len = bytes[offset] as usize;
    offset += 1;
    if bytes.len() < offset + symbol_len + 1 {
        return Err(CoreError::Nullifier(
            "public_values truncated in token_symbol".into(),
        ));
    }
    let token_symbol = String::from_utf8(bytes[offset..offset + symbol_len].to_vec())
        .map_err(|e| CoreError::Nullifier(format!("token_symbol not valid utf8: {e}")))?;
    offset += symbol_len;

    let token_decimals = bytes[offset];

    Ok(PublicValues {
        commitment,
        owner,
        total_amount,
        deposit_id,
        coin_type,
        token_symbol,
        token_decimals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_blob(
        commitment: [u8; 32],
        owner: [u8; 32],
        total_amount: u128,
        deposit_id: u64,
        coin_type: u32,
        token_symbol: &str,
        token_decimals: u8,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&commitment);
        out.extend_from_slice(&owner);
        let mut amount_be = [0u8; 32];
        amount_be[16..].copy_from_slice(&total_amount.to_be_bytes());
        out.extend_from_slice(&amount_be);
        out.extend_from_slice(&crate::nullifier::deposit_id_to_be32(deposit_id));
        out.extend_from_slice(&coin_type.to_be_bytes());
        out.push(token_symbol.len() as u8);
        out.extend_from_slice(token_symbol.as_bytes());
        out.push(token_decimals);
        out
    }

    #[test]
    fn parses_well_formed_blob() {
        let mut owner = [0u8; 32];
        owner[12..].copy_from_slice(&[0xAAu8; 20]);
        let blob = build_blob(
            [0xCCu8; 32],
            owner,
            50_000_000u128,
            18_323_478u64,
            714,
            "USDT",
            6,
        );
        let parsed = parse_public_values(&blob).unwrap();
        assert_eq!(parsed.commitment, [0xCCu8; 32]);
        assert_eq!(parsed.owner, owner);
        assert_eq!(parsed.total_amount, 50_000_000u128);
        assert_eq!(parsed.deposit_id, 18_323_478u64);
        assert_eq!(parsed.coin_type, 714);
        assert_eq!(parsed.token_symbol, "USDT");
        assert_eq!(parsed.token_decimals, 6);
    }

    #[test]
    fn rejects_truncated_blob() {
        let blob = vec![0u8; 10];
        assert!(parse_public_values(&blob).is_err());
    }

    #[test]
    fn rejects_truncated_symbol() {
        let mut blob = build_blob([0u8; 32], [0u8; 32], 1, 1, 714, "USDT", 6);
        let len = blob.len();
        blob.truncate(len - 3);
        assert!(parse_public_values(&blob).is_err());
    }
}
