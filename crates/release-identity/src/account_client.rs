//! Thin HTTP client for the Account service.
//!
//! Ground: `name-account/internal/service/account/service.py`'s
//! public operations (`register`, `login`, `generate_two_fa_key`,
//! `set_two_fa_key`, `change_password`), exposed here purely as the
//! outbound request/response shapes this orchestrator needs — the
//! credential hashing and TOTP logic in `credentials.rs` describe
//! what the Account service does with these requests, not what this
//! client does.

use std::time::Duration;

use thiserror::Error;

use crate::wire::{
    AuthorizationDataResponse, ChangePasswordRequest, GenerateTwoFaKeyResponse, LoginRequest,
    RegisterRequest, SetTwoFaKeyRequest, VerifyTwoFaRequest,
};

#[derive(Debug, Error)]
pub enum AccountClientError {
    #[error("request to the account service failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("account service returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

type Result<T> = std::result::Result<T, AccountClientError>;

pub struct AccountClient {
    http: reqwest::Client,
    base_url: String,
}

impl AccountClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with a static config"),
            base_url: base_url.into(),
        }
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthorizationDataResponse> {
        self.post_json("/register", request).await
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<AuthorizationDataResponse> {
        self.post_json("/login", request).await
    }

    pub async fn generate_two_fa_key(&self, account_id: i64) -> Result<GenerateTwoFaKeyResponse> {
        self.post_json(
            "/two-fa/generate",
            &serde_json::json!({ "account_id": account_id }),
        )
        .await
    }

    pub async fn set_two_fa_key(&self, request: &SetTwoFaKeyRequest) -> Result<()> {
        self.post_empty("/two-fa", request).await
    }

    pub async fn verify_two_fa(&self, request: &VerifyTwoFaRequest) -> Result<bool> {
        self.post_json("/two-fa/verify", request).await
    }

    pub async fn change_password(&self, request: &ChangePasswordRequest) -> Result<()> {
        self.post_empty("/password", request).await
    }

    async fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AccountClientError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }

    async fn post_empty<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AccountClientError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_is_constructed_from_a_base_url() {
        let client = AccountClient::new("https://accounts.internal");
        assert_eq!(client.base_url, "https://accounts.internal");
    }
}
