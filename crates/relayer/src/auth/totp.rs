//! Admin TOTP verification (spec §4.6: RFC 6238, 30s period, SHA-1, 6 digits).

use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::{RelayerError, Result};

/// Builds the TOTP validator from the base32-encoded secret configured for the single
/// admin account (spec §4.6 — no admin user table, so no per-user secret storage).
fn totp_from_secret(base32_secret: &str) -> Result<TOTP> {
    let secret = Secret::Encoded(base32_secret.to_string())
        .to_bytes()
        .map_err(|e| RelayerError::Internal(format!("invalid TOTP secret encoding: {e}")))?;
    TOTP::new(Algorithm::SHA1, 6, 1, 30, secret)
        .map_err(|e| RelayerError::Internal(format!("invalid TOTP parameters: {e}")))
}

/// Returns true only if `code` matches the current (or immediately adjacent, per the
/// `skew=1` window above) 30s step. Never distinguishes wrong-code from
/// expired-code in its return value — the caller collapses any failure into the
/// generic "Invalid credentials" message (spec §4.6 "avoid oracle").
pub fn verify_code(base32_secret: &str, code: &str) -> Result<bool> {
    let totp = totp_from_secret(base32_secret)?;
    Ok(totp.check_current(code).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_freshly_generated_code() {
        let secret = Secret::default().to_encoded().to_string();
        let totp = totp_from_secret(&secret).unwrap();
        let code = totp.generate_current().unwrap();
        assert!(verify_code(&secret, &code).unwrap());
    }

    #[test]
    fn rejects_non_numeric_code() {
        let secret = Secret::default().to_encoded().to_string();
        assert!(!verify_code(&secret, "not-digits").unwrap_or(false));
    }
}
