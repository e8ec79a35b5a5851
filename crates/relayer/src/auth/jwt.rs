//! JWT minting/verification (spec §4.6). HS256 via `jsonwebtoken`; user tokens carry
//! `user_address`/`universal_address`/`chain_id`, admin tokens carry a `role` claim.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use payment_core::UniversalAddress;
use serde::{Deserialize, Serialize};

use crate::error::{RelayerError, Result};

/// User session claims (spec §4.6: "expiry 24h, HS256").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// Native-format address string, as signed by the wallet.
    pub user_address: String,
    /// Hex-encoded 32-byte canonical form.
    pub universal_address: String,
    pub chain_id: u32,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    pub fn owner(&self) -> Result<UniversalAddress> {
        UniversalAddress::from_hex(self.chain_id, &self.universal_address).map_err(|e| {
            tracing::warn!(error = %e, "malformed universal_address in JWT claims");
            RelayerError::Unauthorized
        })
    }
}

/// Admin session claims. One admin account in scope (spec §4.6, SPEC_FULL.md §4.6 — no
/// admin user table); `role` exists so the claim shape documents intent even though
/// there is only one role today.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

pub fn mint_user_token(
    secret: &str,
    owner: &UniversalAddress,
    native_address: &str,
    ttl_seconds: i64,
) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = UserClaims {
        user_address: native_address.to_string(),
        universal_address: owner.to_hex(),
        chain_id: owner.chain_id,
        iat: now,
        exp: now + ttl_seconds,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(RelayerError::from)
}

pub fn verify_user_token(secret: &str, token: &str) -> Result<UserClaims> {
    let data = decode::<UserClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(RelayerError::from)?;
    Ok(data.claims)
}

pub fn mint_admin_token(secret: &str, username: &str, ttl_seconds: i64) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = AdminClaims {
        sub: username.to_string(),
        role: "admin".to_string(),
        iat: now,
        exp: now + ttl_seconds,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(RelayerError::from)
}

pub fn verify_admin_token(secret: &str, token: &str) -> Result<AdminClaims> {
    let data = decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(RelayerError::from)?;
    if data.claims.role != "admin" {
        return Err(RelayerError::Forbidden("not an admin token".into()));
    }
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_user_claims() {
        let owner = UniversalAddress::from_evm_address(714, &[0x11u8; 20]);
        let token = mint_user_token("secret", &owner, "0x1111111111111111111111111111111111111111", 3600).unwrap();
        let claims = verify_user_token("secret", &token).unwrap();
        assert_eq!(claims.chain_id, 714);
        assert_eq!(claims.owner().unwrap(), owner);
    }

    #[test]
    fn rejects_wrong_secret() {
        let owner = UniversalAddress::from_evm_address(714, &[0x22u8; 20]);
        let token = mint_user_token("secret", &owner, "0x22", 3600).unwrap();
        assert!(verify_user_token("wrong-secret", &token).is_err());
    }

    #[test]
    fn admin_token_carries_role() {
        let token = mint_admin_token("admin-secret", "admin", 3600).unwrap();
        let claims = verify_admin_token("admin-secret", &token).unwrap();
        assert_eq!(claims.role, "admin");
    }
}
