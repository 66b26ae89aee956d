//! Password hashing and TOTP helpers matching the Account service's
//! own scheme.
//!
//! Ported from `name-account/internal/service/account/service.py`:
//! `__hash_password`/`__verify_password` pepper the password with a
//! shared `password_secret_key` before handing it to bcrypt, and
//! `generate_two_fa_key`/`__verify_two_fa` use `pyotp`'s base32
//! secret + time-based one-time code. As with `token.rs`, this module
//! backs local test doubles for the Account service rather than
//! running in production — the real Account service owns these
//! operations; `release-identity` only calls it over HTTP.

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use totp_rs::{Algorithm, Secret, TOTP};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("invalid TOTP secret")]
    InvalidTotpSecret,
}

/// `bcrypt(secret_key || password)`, matching `__hash_password`.
pub fn hash_password(secret_key: &SecretString, password: &str) -> Result<String, CredentialError> {
    let peppered = format!("{}{}", secret_key.expose_secret(), password);
    Ok(bcrypt::hash(peppered, bcrypt::DEFAULT_COST)?)
}

/// Matching `__verify_password`: re-peppers and runs bcrypt's
/// constant-time comparison.
pub fn verify_password(
    secret_key: &SecretString,
    password: &str,
    hashed: &str,
) -> Result<bool, CredentialError> {
    let peppered = format!("{}{}", secret_key.expose_secret(), password);
    Ok(bcrypt::verify(peppered, hashed)?)
}

/// Generates a fresh base32 TOTP secret and its `otpauth://`
/// provisioning URI, matching `generate_two_fa_key`'s
/// `pyotp.random_base32()` + `provisioning_uri`.
pub fn generate_two_fa_key(account_id: i64) -> Result<(String, String), CredentialError> {
    let secret = Secret::generate_secret();
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret.to_bytes().map_err(|_| CredentialError::InvalidTotpSecret)?,
        Some("release-orchestrator".to_string()),
        format!("account-{account_id}"),
    )
    .map_err(|_| CredentialError::InvalidTotpSecret)?;

    let uri = totp.get_url();
    let encoded_secret = secret.to_encoded().to_string();
    Ok((encoded_secret, uri))
}

/// Matching `__verify_two_fa`: checks `code` against the current TOTP
/// window for `base32_secret`.
pub fn verify_two_fa_code(base32_secret: &str, code: &str) -> Result<bool, CredentialError> {
    let secret =
        Secret::Encoded(base32_secret.to_string());
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret.to_bytes().map_err(|_| CredentialError::InvalidTotpSecret)?,
        Some("release-orchestrator".to_string()),
        "account".to_string(),
    )
    .map_err(|_| CredentialError::InvalidTotpSecret)?;

    Ok(totp.check_current(code).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretString {
        SecretString::new("pepper".into())
    }

    #[test]
    fn password_round_trips_through_hash_and_verify() {
        let hashed = hash_password(&key(), "hunter2").unwrap();
        assert!(verify_password(&key(), "hunter2", &hashed).unwrap());
        assert!(!verify_password(&key(), "wrong", &hashed).unwrap());
    }

    #[test]
    fn totp_secret_round_trips_through_the_current_code() {
        let (secret, uri) = generate_two_fa_key(7).unwrap();
        assert!(uri.starts_with("otpauth://totp/"));

        let totp = TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            Secret::Encoded(secret.clone()).to_bytes().unwrap(),
            Some("release-orchestrator".to_string()),
            "account-7".to_string(),
        )
        .unwrap();
        let code = totp.generate_current().unwrap();
        assert!(verify_two_fa_code(&secret, &code).unwrap());
    }
}
