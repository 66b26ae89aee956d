//! Thin HTTP client for the Authorization service.
//!
//! Ground: `name-authorization`'s `AuthorizationController` — `POST /`
//! and `POST /tg` both call `create_tokens`/`create_tokens_tg` and
//! return `{access_token, refresh_token}`; `GET /check` reads the
//! `Access-Token` cookie and returns account/role/2FA state or 403 on
//! an expired/invalid token; `POST /refresh` reads `Refresh-Token` and
//! returns a fresh pair. This client only speaks the wire contract —
//! it does not implement token issuance itself (see `token.rs` for
//! that, used by test doubles only).

use std::time::Duration;

use thiserror::Error;

use crate::wire::{AuthorizationRequest, AuthorizationResponse, CheckAuthorizationResponse};

#[derive(Debug, Error)]
pub enum AuthorizationClientError {
    #[error("request to the authorization service failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("access token expired")]
    TokenExpired,

    #[error("access token invalid")]
    TokenInvalid,

    #[error("authorization service returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

type Result<T> = std::result::Result<T, AuthorizationClientError>;

pub struct AuthorizationClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthorizationClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with a static config"),
            base_url: base_url.into(),
        }
    }

    pub async fn authorize(&self, request: &AuthorizationRequest) -> Result<AuthorizationResponse> {
        self.post_authorization("/", request).await
    }

    pub async fn authorize_tg(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationResponse> {
        self.post_authorization("/tg", request).await
    }

    async fn post_authorization(
        &self,
        path: &str,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationResponse> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(request)
            .send()
            .await?;
        Self::parse_ok(response).await
    }

    pub async fn check(&self, access_token: &str) -> Result<CheckAuthorizationResponse> {
        let response = self
            .http
            .get(format!("{}/check", self.base_url))
            .header("Cookie", format!("Access-Token={access_token}"))
            .send()
            .await?;

        if response.status().as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(if body.contains("expired") {
                AuthorizationClientError::TokenExpired
            } else {
                AuthorizationClientError::TokenInvalid
            });
        }
        Self::parse_ok(response).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/refresh", self.base_url))
            .header("Cookie", format!("Refresh-Token={refresh_token}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthorizationClientError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn parse_ok<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthorizationClientError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_is_constructed_from_a_base_url() {
        let client = AuthorizationClient::new("https://identity.internal");
        assert_eq!(client.base_url, "https://identity.internal");
    }
}
