//! Axum extractors bridging a `Bearer` token into the claims it carries (spec §4.6).
//! Both extractors reject with `RelayerError::Unauthorized`/`Forbidden` rather than
//! panicking, so a missing or malformed header is an ordinary HTTP 401/403, not a crash.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use payment_core::UniversalAddress;
use std::sync::Arc;

use super::jwt::{verify_admin_token, verify_user_token, AdminClaims};
use crate::error::{RelayerError, Result};
use crate::server::AppState;

fn bearer_token(parts: &Parts) -> Result<&str> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(RelayerError::Unauthorized)?;
    header.strip_prefix("Bearer ").ok_or(RelayerError::Unauthorized)
}

/// The authenticated caller's canonical identity, extracted from a user JWT (spec §4.6:
/// `user_address`/`universal_address`/`chain_id` claims). Every owner-scoped handler
/// takes this instead of reading an address out of the request body (I5).
pub struct AuthUser {
    pub owner: UniversalAddress,
    pub native_address: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = RelayerError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let token = bearer_token(parts)?;
        let claims = verify_user_token(&state.config.user_jwt_secret, token)?;
        Ok(AuthUser {
            owner: claims.owner()?,
            native_address: claims.user_address,
        })
    }
}

/// The authenticated admin caller (spec §4.6: single admin account, no admin user
/// table).
pub struct AuthAdmin(pub AdminClaims);

impl FromRequestParts<Arc<AppState>> for AuthAdmin {
    type Rejection = RelayerError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let token = bearer_token(parts)?;
        let claims = verify_admin_token(&state.config.admin_jwt_secret, token)?;
        Ok(AuthAdmin(claims))
    }
}
