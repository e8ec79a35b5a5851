//! Wallet-signature verification for the user login challenge (spec §4.6). Both EVM and
//! TRON wallets sign with secp256k1; the only difference is the prefix string baked into
//! the signed digest and how the recovered public key maps to an address.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::{RelayerError, Result};

const EVM_PREFIX: &str = "\x19Ethereum Signed Message:\n";
const TRON_PREFIX: &str = "\x19TRON Signed Message:\n32";

/// Recovers the 20-byte address that produced `signature` over `message`, under the
/// given personal-sign prefix convention. `signature` is `r || s || v`, 65 bytes, with
/// `v` in either `{0, 1}` or `{27, 28}` form (most wallets emit the latter).
fn recover_address(prefix: &str, message: &[u8], signature: &[u8]) -> Result<[u8; 20]> {
    if signature.len() != 65 {
        return Err(RelayerError::Unauthorized);
    }
    let (rs, v) = signature.split_at(64);
    let normalized_v = if v[0] >= 27 { v[0] - 27 } else { v[0] };
    let recovery_id =
        RecoveryId::from_byte(normalized_v).ok_or(RelayerError::Unauthorized)?;
    let sig = Signature::from_slice(rs).map_err(|_| RelayerError::Unauthorized)?;

    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(message);
    let digest = hasher.finalize();

    let recovered = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|_| RelayerError::Unauthorized)?;
    let encoded = recovered.to_encoded_point(false);
    let pubkey_hash = Keccak256::digest(&encoded.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&pubkey_hash[12..]);
    Ok(address)
}

/// EIP-191 `personal_sign` recovery: the prefix is `"\x19Ethereum Signed Message:\n" +
/// message.len()` (spec §4.6).
pub fn recover_evm_address(message: &[u8], signature: &[u8]) -> Result<[u8; 20]> {
    let prefix = format!("{EVM_PREFIX}{}", message.len());
    recover_address(&prefix, message, signature)
}

/// TRON wallets (TronLink et al.) sign a fixed-length 32-byte challenge under a TRON
/// specific prefix rather than a variable-length message (spec §4.6 TRON-equivalent
/// signing); the recovered address is the last 20 bytes of the same Keccak-based
/// derivation EVM uses, since TRON is secp256k1 under the hood.
pub fn recover_tron_address(message: &[u8], signature: &[u8]) -> Result<[u8; 20]> {
    recover_address(TRON_PREFIX, message, signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    #[test]
    fn recovers_evm_signer_address() {
        let signing_key = SigningKey::from_bytes(&[0x11u8; 32].into()).unwrap();
        let verifying_key = VerifyingKey::from(&signing_key);
        let encoded = verifying_key.to_encoded_point(false);
        let pubkey_hash = Keccak256::digest(&encoded.as_bytes()[1..]);
        let mut expected = [0u8; 20];
        expected.copy_from_slice(&pubkey_hash[12..]);

        let message = b"login:0xdeadbeef:1690000000";
        let prefix = format!("{EVM_PREFIX}{}", message.len());
        let mut hasher = Keccak256::new();
        hasher.update(prefix.as_bytes());
        hasher.update(message);
        let digest = hasher.finalize();

        let (sig, recovery_id) = signing_key.sign_prehash_recoverable(&digest).unwrap();
        let mut bytes = sig.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte());

        let recovered = recover_evm_address(message, &bytes).unwrap();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn rejects_short_signature() {
        assert!(recover_evm_address(b"hello", &[0u8; 10]).is_err());
    }
}
