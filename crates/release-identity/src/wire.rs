//! Wire DTOs for the Account and Authorization collaborators.
//!
//! Shapes are ported directly from `original_source`'s FastAPI
//! request/response models
//! (`name-authorization/internal/controller/http/handler/account/handler.py`'s
//! `.model` module and `name-account`'s registration/login payloads);
//! field names keep the original's `snake_case` wire casing.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub account_id: i64,
    pub two_fa_status: bool,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAuthorizationResponse {
    pub account_id: i64,
    pub two_fa_status: bool,
    pub role: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationDataResponse {
    pub account_id: i64,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateTwoFaKeyResponse {
    pub two_fa_key: String,
    pub provisioning_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTwoFaKeyRequest {
    pub account_id: i64,
    pub google_two_fa_key: String,
    pub google_two_fa_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyTwoFaRequest {
    pub account_id: i64,
    pub google_two_fa_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub account_id: i64,
    pub old_password: String,
    pub new_password: String,
}
