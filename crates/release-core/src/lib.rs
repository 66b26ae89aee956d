//! release-core — release state machine, approval quorum, and the
//! SQLite store backing both.

pub mod approval;
pub mod audit;
pub mod database;
pub mod error;
pub mod release;

pub use approval::{
    check_eligibility, quorum_outcome, ApprovalDecision, ApprovalVote, EligibilityError,
    QuorumOutcome,
};
pub use audit::{AuditAction, AuditEntry};
pub use database::{Database, DatabaseConfig};
pub use error::{Error, Result};
pub use release::{NewRelease, Release, ReleaseStatus, ReleaseUpdate};
