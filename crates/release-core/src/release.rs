//! Release state machine and record model.
//!
//! Mirrors the status set and lifecycle of
//! `name-release-machine`'s `ReleaseStatus` enum, re-expressed as a
//! Rust enum with explicit legal-transition and bucket-membership
//! methods instead of the original's bare string constants scattered
//! across SQL queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    Initiated,

    StageBuilding,
    StageBuildingFailed,
    StageTestRollback,
    StageTestRollbackFailed,

    ManualTesting,
    ManualTestPassed,
    ManualTestFailed,

    Deploying,
    Deployed,
    ProductionFailed,

    Rollback,
    RollbackFailed,
    RollbackDone,
}

impl ReleaseStatus {
    /// Every variant, used to build the literal `WHERE status IN
    /// (...)` queries the three bucket lookups run (see
    /// `database.rs::get_releases_where`) without hand-duplicating the
    /// `is_active`/`is_successful`/`is_failed` bucket membership.
    pub const ALL: [ReleaseStatus; 14] = [
        Self::Initiated,
        Self::StageBuilding,
        Self::StageBuildingFailed,
        Self::StageTestRollback,
        Self::StageTestRollbackFailed,
        Self::ManualTesting,
        Self::ManualTestPassed,
        Self::ManualTestFailed,
        Self::Deploying,
        Self::Deployed,
        Self::ProductionFailed,
        Self::Rollback,
        Self::RollbackFailed,
        Self::RollbackDone,
    ];

    /// DB/wire string (spec.md §6.4: "status stored as its lowercase
    /// token"). The rollback plan's own PATCH callbacks (`script.rs`)
    /// post this same literal, so it must match exactly.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::StageBuilding => "stage_building",
            Self::StageBuildingFailed => "stage_building_failed",
            Self::StageTestRollback => "stage_test_rollback",
            Self::StageTestRollbackFailed => "stage_test_rollback_failed",
            Self::ManualTesting => "manual_testing",
            Self::ManualTestPassed => "manual_test_passed",
            Self::ManualTestFailed => "manual_test_failed",
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::ProductionFailed => "production_failed",
            Self::Rollback => "rollback",
            Self::RollbackFailed => "rollback_failed",
            Self::RollbackDone => "rollback_done",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "initiated" => Self::Initiated,
            "stage_building" => Self::StageBuilding,
            "stage_building_failed" => Self::StageBuildingFailed,
            "stage_test_rollback" => Self::StageTestRollback,
            "stage_test_rollback_failed" => Self::StageTestRollbackFailed,
            "manual_testing" => Self::ManualTesting,
            "manual_test_passed" => Self::ManualTestPassed,
            "manual_test_failed" => Self::ManualTestFailed,
            "deploying" => Self::Deploying,
            "deployed" => Self::Deployed,
            "production_failed" => Self::ProductionFailed,
            "rollback" => Self::Rollback,
            "rollback_failed" => Self::RollbackFailed,
            "rollback_done" => Self::RollbackDone,
            other => return Err(Error::Other(format!("unknown release status: {other}"))),
        })
    }

    /// Active releases: anything that hasn't reached a terminal state.
    /// Bucket membership matches `query.py::get_active_releases`.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Initiated
                | Self::StageBuilding
                | Self::StageTestRollback
                | Self::ManualTesting
                | Self::ManualTestPassed
                | Self::Deploying
                | Self::Rollback
        )
    }

    /// Matches `query.py::get_successful_releases`.
    pub fn is_successful(self) -> bool {
        matches!(self, Self::Deployed | Self::RollbackDone)
    }

    /// Matches `query.py::get_failed_releases`.
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            Self::StageBuildingFailed
                | Self::StageTestRollbackFailed
                | Self::ManualTestFailed
                | Self::ProductionFailed
                | Self::RollbackFailed
        )
    }

    /// Terminal-successful ∪ terminal-failed — spec.md §3 invariant 4:
    /// `completed_at` is set iff `status` is terminal.
    pub fn is_terminal(self) -> bool {
        self.is_successful() || self.is_failed()
    }

    /// Legal forward transitions. The original system enforces this
    /// implicitly through the order in which its pipeline and dialog
    /// handlers call `update_release`; we make it explicit so a bad
    /// caller fails loudly instead of producing an unreachable status.
    pub fn can_transition_to(self, next: ReleaseStatus) -> bool {
        use ReleaseStatus::*;
        matches!(
            (self, next),
            (Initiated, StageBuilding)
                | (StageBuilding, StageTestRollback)
                | (StageBuilding, StageBuildingFailed)
                | (StageTestRollback, ManualTesting)
                | (StageTestRollback, StageTestRollbackFailed)
                | (ManualTesting, ManualTestPassed)
                | (ManualTesting, ManualTestFailed)
                | (ManualTestPassed, Deploying)
                | (Deploying, Deployed)
                | (Deploying, ProductionFailed)
                | (Deployed, Rollback)
                | (Rollback, RollbackDone)
                | (Rollback, RollbackFailed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: i64,
    pub service_name: String,
    pub release_tag: String,
    pub rollback_to_tag: Option<String>,
    pub status: ReleaseStatus,

    pub initiated_by: String,
    pub github_run_id: Option<String>,
    pub github_action_link: Option<String>,
    pub github_ref: Option<String>,
    pub approved_list: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields accepted when creating a release, mirroring the columns the
/// original's `create_release` query actually inserts.
#[derive(Debug, Clone)]
pub struct NewRelease {
    pub service_name: String,
    pub release_tag: String,
    pub initiated_by: String,
    pub github_run_id: Option<String>,
    pub github_action_link: Option<String>,
    pub github_ref: Option<String>,
}

/// Partial update applied by the Event Intake `PATCH /release` route.
/// All fields optional: a caller only sets what its stage changed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleaseUpdate {
    pub status: Option<ReleaseStatus>,
    pub rollback_to_tag: Option<String>,
    pub github_run_id: Option<String>,
    pub github_action_link: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
