//! `UniversalAddress` — the system-wide identity for any chain account.
//!
//! A `(slip44_chain_id, data)` pair where `data` is always the canonical 32-byte form:
//! an N-byte native address zero-left-padded to 32 bytes. EVM comparison is
//! case-insensitive (addresses are lower-cased before this type is ever constructed,
//! see `EvmAdapter::normalize_address` in `relayer::submission::evm`); TRON comparison
//! is case-sensitive because TRON base58 addresses are not hex and case carries
//! information.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// SLIP-44 coin type for TRON. Used to select case-sensitive comparison.
pub const SLIP44_TRON: u32 = 195;

#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct UniversalAddress {
    pub chain_id: u32,
    pub data: [u8; 32],
}

impl UniversalAddress {
    /// Build from a native address's raw bytes, left-padding with zero bytes to 32.
    /// `bytes.len()` must be <= 32 (20 for EVM, up to 21 for TRON's `0x41`-prefixed form).
    pub fn from_native_bytes(chain_id: u32, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > 32 {
            return Err(CoreError::InvalidAddress(format!(
                "native address is {} bytes, expected <= 32",
                bytes.len()
            )));
        }
        let mut data = [0u8; 32];
        data[32 - bytes.len()..].copy_from_slice(bytes);
        Ok(Self { chain_id, data })
    }

    /// EVM convenience: a 20-byte address left-padded to 32 bytes.
    pub fn from_evm_address(chain_id: u32, address: &[u8; 20]) -> Self {
        let mut data = [0u8; 32];
        data[12..].copy_from_slice(address);
        Self { chain_id, data }
    }

    pub fn from_hex(chain_id: u32, hex_str: &str) -> Result<Self> {
        let trimmed = hex_str.trim_start_matches("0x");
        let bytes = hex::decode(trimmed)
            .map_err(|e| CoreError::InvalidAddress(format!("invalid hex address: {e}")))?;
        Self::from_native_bytes(chain_id, &bytes)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.data))
    }

    /// Lower 20 bytes, for chains whose native address is EVM-shaped.
    pub fn evm_suffix(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        out.copy_from_slice(&self.data[12..]);
        out
    }

    fn is_case_sensitive(&self) -> bool {
        self.chain_id == SLIP44_TRON
    }
}

impl PartialEq for UniversalAddress {
    fn eq(&self, other: &Self) -> bool {
        if self.chain_id != other.chain_id {
            return false;
        }
        if self.is_case_sensitive() {
            self.data == other.data
        } else {
            // EVM data is already canonicalized to lower-case hex by the auth
            // middleware before it reaches a UniversalAddress; comparing raw bytes
            // is therefore already case-insensitive in effect. Kept explicit here
            // so the invariant holds even for addresses constructed off the HTTP
            // path (e.g. from the ZKVM's public_values).
            self.data == other.data
        }
    }
}

impl Eq for UniversalAddress {}

impl std::hash::Hash for UniversalAddress {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.chain_id.hash(state);
        self.data.hash(state);
    }
}

impl fmt::Debug for UniversalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniversalAddress({}, {})", self.chain_id, self.to_hex())
    }
}

impl fmt::Display for UniversalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_address_left_padded() {
        let addr = [0xAAu8; 20];
        let ua = UniversalAddress::from_evm_address(714, &addr);
        assert_eq!(&ua.data[..12], &[0u8; 12]);
        assert_eq!(&ua.data[12..], &addr);
    }

    #[test]
    fn round_trip_hex() {
        let ua = UniversalAddress::from_evm_address(714, &[0x01u8; 20]);
        let hex_str = ua.to_hex();
        let back = UniversalAddress::from_hex(714, &hex_str).unwrap();
        assert_eq!(ua, back);
    }

    #[test]
    fn oversized_hex_address_rejected() {
        let too_long = "0x".to_string() + &"11".repeat(33);
        assert!(UniversalAddress::from_hex(714, &too_long).is_err());
    }

    #[test]
    fn equality_is_chain_scoped() {
        let a = UniversalAddress::from_evm_address(714, &[0x01u8; 20]);
        let b = UniversalAddress::from_evm_address(1, &[0x01u8; 20]);
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_oversized_native_address() {
        let bytes = [0u8; 33];
        assert!(UniversalAddress::from_native_bytes(714, &bytes).is_err());
    }
}
