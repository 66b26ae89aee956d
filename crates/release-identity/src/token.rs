//! Token claim shape and HMAC-SHA256 signing, mirroring the
//! Authorization service's JWT contract from
//! `name-authorization/internal/controller/http/handler/account/handler.py`
//! (`{account_id, two_fa_status, role}` claims, `Access-Token`/
//! `Refresh-Token` cookies, 15-minute access lifetime).
//!
//! `release-identity` does not issue tokens in production — that is
//! the Authorization service's job, consulted over HTTP by
//! `AuthorizationClient`. This module exists so tests and local
//! stand-ins for that service can produce and verify tokens with the
//! same scheme the real service uses, the way
//! `orchestrate-web/src/webhook.rs` signs and verifies GitHub webhook
//! payloads with `hmac`/`sha2`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    pub account_id: i64,
    pub two_fa_status: bool,
    pub role: String,
    pub exp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("claims could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

pub const ACCESS_TOKEN_LIFETIME_MINUTES: i64 = 15;
pub const REFRESH_TOKEN_LIFETIME_MINUTES: i64 = 15;
/// `/tg` issues a refresh token that effectively never expires
/// (the original bot's Telegram login flow sets a 10-year lifetime).
pub const TG_REFRESH_TOKEN_LIFETIME_DAYS: i64 = 3650;

/// Signs `claims` into a `<base64-json>.<hex-hmac>` token. Not a JWT
/// (no header/alg negotiation) — deliberately simpler, since the only
/// consumer is this orchestrator's own Authorization-client test
/// double.
pub fn sign(claims: &TokenClaims, secret: &SecretString) -> Result<String, TokenError> {
    let payload = serde_json::to_vec(claims)?;
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload);

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(payload_b64.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(format!("{payload_b64}.{signature}"))
}

pub fn verify(token: &str, secret: &SecretString) -> Result<TokenClaims, TokenError> {
    let (payload_b64, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(payload_b64.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    if expected != signature {
        return Err(TokenError::InvalidSignature);
    }

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| TokenError::Malformed)?;
    let claims: TokenClaims = serde_json::from_slice(&payload)?;
    if claims.exp < Utc::now() {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

pub fn access_claims(account_id: i64, two_fa_status: bool, role: &str) -> TokenClaims {
    TokenClaims {
        account_id,
        two_fa_status,
        role: role.to_string(),
        exp: Utc::now() + Duration::minutes(ACCESS_TOKEN_LIFETIME_MINUTES),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::new("top-secret".into())
    }

    #[test]
    fn token_round_trips_through_sign_and_verify() {
        let claims = access_claims(42, true, "employee");
        let token = sign(&claims, &secret()).unwrap();
        let verified = verify(&token, &secret()).unwrap();
        assert_eq!(verified, claims);
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let claims = access_claims(1, false, "employee");
        let mut token = sign(&claims, &secret()).unwrap();
        token.push('f');
        assert!(matches!(
            verify(&token, &secret()),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = TokenClaims {
            account_id: 1,
            two_fa_status: false,
            role: "employee".to_string(),
            exp: Utc::now() - Duration::minutes(1),
        };
        let token = sign(&claims, &secret()).unwrap();
        assert!(matches!(verify(&token, &secret()), Err(TokenError::Expired)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = access_claims(1, false, "employee");
        let token = sign(&claims, &secret()).unwrap();
        let other = SecretString::new("different".into());
        assert!(matches!(
            verify(&token, &other),
            Err(TokenError::InvalidSignature)
        ));
    }
}
