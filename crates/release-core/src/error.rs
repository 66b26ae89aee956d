//! Error types for release-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Release not found: {0}")]
    ReleaseNotFound(i64),

    #[error("Invalid state transition: {0} -> {1}")]
    InvalidStateTransition(String, String),

    #[error("Release {0} is not awaiting approval")]
    NotAwaitingApproval(i64),

    #[error("{approver} has already voted on release {release_id}")]
    AlreadyVoted { release_id: i64, approver: String },

    #[error("{approver} is not eligible to approve releases")]
    NotEligibleApprover { approver: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
