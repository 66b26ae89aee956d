//! Release Engine — the thing every external surface (Event Intake,
//! Operator Console) actually calls. Owns the state-machine
//! invariants (by delegating to `release_core::Database`, which is
//! the only writer of `releases` rows) and coordinates the two
//! side-effecting collaborators the spec calls out: the CI Trigger
//! Client (fired when the approval quorum closes) and the Rollback
//! Executor (fired when an operator starts a rollback).
//!
//! Grounded on `orchestrate-core`'s service-struct convention
//! (`ApprovalService { db: Database }`, one method per operation) and
//! on `original_source`'s `active_release/service.py`, whose
//! `confirm_approve`/`confirm_reject`/`rollback_to_tag` are the
//! methods this struct ports one level up from raw SQL into typed
//! collaborators.

use std::collections::{HashMap, HashSet};

use release_ci::{CiDispatchError, CiTriggerClient};
use release_core::{
    ApprovalVote, Database, Error as StoreError, NewRelease, QuorumOutcome, Release,
    ReleaseStatus, ReleaseUpdate,
};
use release_rollback::{RollbackExecutor, RollbackLaunchError, RollbackRequest, ServiceTopology};
use thiserror::Error;
use tracing::{info, warn};

/// Process-wide approval policy (spec.md §3.2): the same roster of
/// required approvers and admins applies to every service. Loaded
/// once at process start, never mutated.
#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    pub required_approvers: HashSet<String>,
    pub admins: HashSet<String>,
}

impl ApprovalPolicy {
    pub fn new(required_approvers: HashSet<String>, admins: HashSet<String>) -> Self {
        Self {
            required_approvers,
            admins,
        }
    }

    fn required_approvers_vec(&self) -> Vec<String> {
        self.required_approvers.iter().cloned().collect()
    }
}

/// Errors surfaced by the Engine, classified per spec.md §7 so HTTP
/// handlers and the Console can map each to the right response
/// without re-deriving the taxonomy.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("release {0} is already in rollback or a terminal rollback state")]
    RollbackNotAllowed(i64),

    #[error("{0} does not have rollback authority")]
    NotAdmin(String),

    #[error("CI workflow dispatch failed: {0}")]
    CiDispatch(#[from] CiDispatchError),

    #[error("rollback launch failed: {0}")]
    RollbackLaunch(#[from] RollbackLaunchError),
}

/// Mirrors `ApprovalCoordinator`'s contract output (spec.md §4.2):
/// distinguishes a vote that merely records from one that closed the
/// quorum and fired the CI dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    AcceptedNotFinal,
    AcceptedFinal,
}

/// Everything the Engine needs to reach the CI system for one
/// workflow dispatch (spec.md §4.4/§6.2).
#[derive(Debug, Clone)]
pub struct CiDispatchTarget {
    pub repo: String,
}

pub struct ReleaseEngine {
    db: Database,
    ci: CiTriggerClient,
    ci_target: CiDispatchTarget,
    rollback: RollbackExecutor,
    topology: HashMap<String, ServiceTopology>,
    policy: ApprovalPolicy,
}

impl ReleaseEngine {
    pub fn new(
        db: Database,
        ci: CiTriggerClient,
        ci_target: CiDispatchTarget,
        rollback: RollbackExecutor,
        topology: HashMap<String, ServiceTopology>,
        policy: ApprovalPolicy,
    ) -> Self {
        Self {
            db,
            ci,
            ci_target,
            rollback,
            topology,
            policy,
        }
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// Raw store access for the schema-bootstrap routes (spec.md
    /// §6.1 `GET {prefix}/table/create|drop`), which have no
    /// release-shaped Engine operation of their own.
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn create(&self, new: NewRelease) -> Result<Release, EngineError> {
        Ok(self.db.create_release(new).await?)
    }

    pub async fn get(&self, release_id: i64) -> Result<Release, EngineError> {
        Ok(self.db.get_release_by_id(release_id).await?)
    }

    /// `Update(release_id, {...})` (spec.md §4.1). Rollback-specific
    /// fields (`status = ROLLBACK`, `rollback_to_tag`) can arrive here
    /// too — this is how the remote plan's PATCH callbacks
    /// (spec.md §4.3 step 1/6) report progress back into the state
    /// machine; they do not go through `rollback()` below, which is
    /// only the operator-initiated launch path.
    pub async fn update(&self, release_id: i64, update: ReleaseUpdate) -> Result<Release, EngineError> {
        Ok(self.db.update_release(release_id, update).await?)
    }

    /// `Approve(release_id, approver)`, delegated to the Approval
    /// Coordinator algorithm in spec.md §4.2. The quorum math and
    /// eligibility/already-voted checks run inside
    /// `Database::record_approval_decision`'s single transaction; this
    /// method adds the one thing the store can't do on its own — the
    /// CI dispatch that must fire exactly when the quorum closes.
    pub async fn approve(&self, release_id: i64, approver: &str) -> Result<ApprovalOutcome, EngineError> {
        let (release, outcome) = self
            .db
            .record_approval_decision(
                release_id,
                approver,
                ApprovalVote::Approve,
                &self.policy.required_approvers_vec(),
            )
            .await?;

        match outcome {
            QuorumOutcome::AcceptedNotFinal => Ok(ApprovalOutcome::AcceptedNotFinal),
            QuorumOutcome::AcceptedFinal => {
                info!(release_id = release.id, approver, "approval quorum closed, dispatching CI workflow");
                // Store write already committed (release.status ==
                // ManualTestPassed) before this call; a dispatch
                // failure here is surfaced to the operator without
                // unwinding the approval, matching spec.md §5's
                // "store-then-dispatch with operator-visible retry"
                // discipline (see DESIGN.md).
                if let Err(err) = self
                    .ci
                    .trigger_manual_testing_approved(&self.ci_target.repo, release.id, &release.release_tag)
                    .await
                {
                    warn!(release_id = release.id, error = %err, "CI dispatch failed after quorum closed");
                    return Err(err.into());
                }
                Ok(ApprovalOutcome::AcceptedFinal)
            }
            QuorumOutcome::Rejected => unreachable!("Approve never yields a Rejected outcome"),
        }
    }

    /// Retries the CI dispatch for a release already sitting in
    /// `MANUAL_TEST_PASSED` (spec.md §5: "the operator may retry via
    /// an explicit 'trigger deployment' action").
    pub async fn retry_deployment_dispatch(&self, release_id: i64) -> Result<(), EngineError> {
        let release = self.db.get_release_by_id(release_id).await?;
        if release.status != ReleaseStatus::ManualTestPassed {
            return Err(EngineError::Store(StoreError::InvalidStateTransition(
                release.status.as_str().to_string(),
                ReleaseStatus::Deploying.as_str().to_string(),
            )));
        }
        self.ci
            .trigger_manual_testing_approved(&self.ci_target.repo, release.id, &release.release_tag)
            .await?;
        Ok(())
    }

    /// `Reject(release_id, rejector)` (spec.md §4.1/§4.2): a single
    /// eligible vote fails the release immediately. CI is not
    /// notified — it observes the terminal state on its own.
    pub async fn reject(&self, release_id: i64, rejector: &str) -> Result<Release, EngineError> {
        let (release, _outcome) = self
            .db
            .record_approval_decision(
                release_id,
                rejector,
                ApprovalVote::Reject,
                &self.policy.required_approvers_vec(),
            )
            .await?;
        Ok(release)
    }

    /// `Rollback(release_id, target_tag, initiator)` (spec.md §4.1):
    /// transitions `DEPLOYED -> ROLLBACK`, writes `rollback_to_tag`,
    /// and launches the remote plan. Returns once the plan is
    /// launched, not once it finishes.
    pub async fn rollback(
        &self,
        release_id: i64,
        target_tag: &str,
        initiator: &str,
    ) -> Result<Release, EngineError> {
        if !self.policy.admins.contains(initiator) {
            return Err(EngineError::NotAdmin(initiator.to_string()));
        }

        let release = self.db.get_release_by_id(release_id).await?;
        if release.status != ReleaseStatus::Deployed {
            return Err(EngineError::RollbackNotAllowed(release_id));
        }

        let updated = self
            .db
            .update_release(
                release_id,
                ReleaseUpdate {
                    status: Some(ReleaseStatus::Rollback),
                    rollback_to_tag: Some(target_tag.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        let topology = self
            .topology
            .get(&release.service_name)
            .cloned()
            .unwrap_or(ServiceTopology {
                port: 8080,
                health_path_prefix: String::new(),
            });

        let request = RollbackRequest {
            release_id,
            service_name: release.service_name.clone(),
            target_tag: target_tag.to_string(),
            topology,
        };

        match self.rollback.launch_rollback(&request).await {
            Ok(script) => {
                info!(
                    release_id,
                    target_tag, pid = %script.remote_pid, "rollback plan launched on production host"
                );
                Ok(updated)
            }
            Err(err) => {
                warn!(release_id, error = %err, "rollback launch failed, compensating back to deployed");
                // Launch never ran — compensate back to DEPLOYED
                // (spec.md §4.3/§7: "the only legal outward
                // transition from ROLLBACK when nothing has run").
                self.db.compensate_rollback_to_deployed(release_id).await?;
                Err(EngineError::RollbackLaunch(err))
            }
        }
    }

    pub async fn list_active(&self) -> Result<Vec<Release>, EngineError> {
        Ok(self.db.get_active_releases().await?)
    }

    pub async fn list_successful(&self) -> Result<Vec<Release>, EngineError> {
        Ok(self.db.get_successful_releases().await?)
    }

    pub async fn list_failed(&self) -> Result<Vec<Release>, EngineError> {
        Ok(self.db.get_failed_releases().await?)
    }

    /// `RecentSuccessful(service_name, limit, exclude_id)` — backs the
    /// rollback-target picker (spec.md §4.1/§4.6).
    pub async fn recent_successful(
        &self,
        service_name: &str,
        limit: i64,
        exclude_id: i64,
    ) -> Result<Vec<Release>, EngineError> {
        Ok(self
            .db
            .get_recent_successful(service_name, limit, exclude_id)
            .await?)
    }
}
