//! Release lifecycle audit trail.
//!
//! A trimmed-down cousin of `orchestrate-core/src/audit.rs` +
//! `monitoring.rs`'s `AuditEntry`/`AuditAction`: the release domain
//! only needs a linear, append-only record of what happened to a
//! given release and who did it, not the generic multi-resource query
//! surface the teacher builds for agent/PR/epic activity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ReleaseCreated,
    ReleaseUpdated,
    Approved,
    Rejected,
    RollbackStarted,
    RollbackFailed,
    RollbackDone,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReleaseCreated => "release_created",
            Self::ReleaseUpdated => "release_updated",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::RollbackStarted => "rollback_started",
            Self::RollbackFailed => "rollback_failed",
            Self::RollbackDone => "rollback_done",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "release_created" => Self::ReleaseCreated,
            "release_updated" => Self::ReleaseUpdated,
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "rollback_started" => Self::RollbackStarted,
            "rollback_failed" => Self::RollbackFailed,
            "rollback_done" => Self::RollbackDone,
            other => return Err(Error::Other(format!("unknown audit action: {other}"))),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub release_id: i64,
    pub action: AuditAction,
    pub actor: String,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
