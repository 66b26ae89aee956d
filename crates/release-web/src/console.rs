//! Operator Console (spec.md §4.6) — a chat-driven surface over the
//! three release views with one-at-a-time navigation, approve/reject,
//! and a three-stage rollback flow (pick target -> confirm -> fire).
//!
//! Grounded on `orchestrate-core/src/slack_interactions.rs` +
//! `slack_service.rs` (button action-id parsing kept separate from a
//! provider-agnostic posting abstraction) and on
//! `original_source`'s `dialog/active_release/service.py` +
//! `dialog/success_release/{dialog,getter}.py` (per-conversation
//! `current_index` navigation state, the three-window rollback
//! dialog). Chat-bot rendering widgets are the out-of-scope
//! collaborator named in spec.md §1 — `ChatTransport` is the seam a
//! concrete Slack/Telegram renderer plugs into.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use release_core::Release;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::engine::{ApprovalOutcome, EngineError, ReleaseEngine};

#[derive(Debug, Error)]
pub enum ChatTransportError {
    #[error("chat transport failed: {0}")]
    Send(String),
}

/// The external collaborator spec.md §1 excludes: actually composing
/// and posting chat messages. The Console only needs to push text to
/// a conversation and edit a previously sent one.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), ChatTransportError>;
    async fn update_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), ChatTransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseView {
    Active,
    Successful,
    Failed,
}

/// A rollback dialog in progress, modeled on `success_release/dialog.py`'s
/// three windows: `view_releases` (implicit — the Successful view
/// itself) -> `select_rollback_tag` -> `confirm_rollback`.
#[derive(Debug, Clone)]
pub struct PendingRollback {
    pub release_id: i64,
    pub service_name: String,
    pub candidates: Vec<Release>,
    pub selected_tag: Option<String>,
}

/// Per-conversation dialog state. The Console holds nothing else in
/// memory — every release field shown to the operator is re-read from
/// the Engine on `refresh` (spec.md §4.6: "All ground truth is
/// re-read from the Engine on refresh").
#[derive(Debug, Clone, Default)]
pub struct DialogState {
    pub view: Option<ReleaseView>,
    pub cached_ids: Vec<i64>,
    pub current_index: usize,
    pub pending_rollback: Option<PendingRollback>,
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("no active dialog for this conversation — call refresh first")]
    NoDialog,

    #[error("no release selected in the current view")]
    NoSelection,

    #[error("{0} is not eligible to approve or reject this release")]
    NotEligible(String),

    #[error("{0} has already approved this release")]
    AlreadyApproved(String),

    #[error("release is not in the manual-testing quorum window")]
    NotInQuorumWindow,

    #[error("release is not deployed, or has already been rolled back")]
    RollbackNotAvailable,

    #[error("{0} is not one of the offered rollback targets")]
    UnknownRollbackTarget(String),

    #[error("no rollback target has been selected yet")]
    NoRollbackTargetSelected,

    #[error(transparent)]
    Transport(#[from] ChatTransportError),
}

pub struct OperatorConsole {
    engine: Arc<ReleaseEngine>,
    transport: Arc<dyn ChatTransport>,
    dialogs: Mutex<HashMap<String, DialogState>>,
}

impl OperatorConsole {
    pub fn new(engine: Arc<ReleaseEngine>, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            engine,
            transport,
            dialogs: Mutex::new(HashMap::new()),
        }
    }

    /// Re-reads the chosen view from the Engine, resets navigation to
    /// the first release, and renders it.
    pub async fn refresh(&self, conversation_id: &str, view: ReleaseView) -> Result<(), ConsoleError> {
        let releases = match view {
            ReleaseView::Active => self.engine.list_active().await?,
            ReleaseView::Successful => self.engine.list_successful().await?,
            ReleaseView::Failed => self.engine.list_failed().await?,
        };
        let ids: Vec<i64> = releases.iter().map(|r| r.id).collect();

        {
            let mut dialogs = self.dialogs.lock().await;
            dialogs.insert(
                conversation_id.to_string(),
                DialogState {
                    view: Some(view),
                    cached_ids: ids,
                    current_index: 0,
                    pending_rollback: None,
                },
            );
        }
        self.render_current(conversation_id).await
    }

    pub async fn next(&self, conversation_id: &str) -> Result<(), ConsoleError> {
        self.step(conversation_id, 1).await
    }

    pub async fn previous(&self, conversation_id: &str) -> Result<(), ConsoleError> {
        self.step(conversation_id, -1).await
    }

    async fn step(&self, conversation_id: &str, delta: i64) -> Result<(), ConsoleError> {
        {
            let mut dialogs = self.dialogs.lock().await;
            let state = dialogs.get_mut(conversation_id).ok_or(ConsoleError::NoDialog)?;
            if state.cached_ids.is_empty() {
                return Err(ConsoleError::NoSelection);
            }
            let len = state.cached_ids.len() as i64;
            let next = (state.current_index as i64 + delta).rem_euclid(len);
            state.current_index = next as usize;
        }
        self.render_current(conversation_id).await
    }

    async fn current_release_id(&self, conversation_id: &str) -> Result<i64, ConsoleError> {
        let dialogs = self.dialogs.lock().await;
        let state = dialogs.get(conversation_id).ok_or(ConsoleError::NoDialog)?;
        state
            .cached_ids
            .get(state.current_index)
            .copied()
            .ok_or(ConsoleError::NoSelection)
    }

    async fn render_current(&self, conversation_id: &str) -> Result<(), ConsoleError> {
        let id = match self.current_release_id(conversation_id).await {
            Ok(id) => id,
            Err(ConsoleError::NoSelection) => {
                return Ok(self
                    .transport
                    .send_message(conversation_id, "no releases in this view")
                    .await?)
            }
            Err(e) => return Err(e),
        };
        let release = self.engine.get(id).await?;
        self.transport
            .send_message(conversation_id, &render_release(&release))
            .await?;
        Ok(())
    }

    /// Approve the release currently shown, after the visibility gate
    /// spec.md §4.6 requires: the acting user must be eligible and
    /// not already in `approved_list` before the button is even shown.
    /// We re-check rather than trust client-side state.
    pub async fn approve(&self, conversation_id: &str, actor: &str) -> Result<(), ConsoleError> {
        let release_id = self.current_release_id(conversation_id).await?;
        self.gate_approval_action(release_id, actor).await?;

        match self.engine.approve(release_id, actor).await {
            Ok(ApprovalOutcome::AcceptedNotFinal) => {
                self.transport
                    .send_message(conversation_id, &format!("{actor} approved release {release_id}"))
                    .await?;
            }
            Ok(ApprovalOutcome::AcceptedFinal) => {
                self.transport
                    .send_message(
                        conversation_id,
                        &format!("{actor} approved release {release_id} — quorum reached, deployment triggered"),
                    )
                    .await?;
            }
            Err(EngineError::CiDispatch(e)) => {
                self.transport
                    .send_message(
                        conversation_id,
                        &format!(
                            "quorum reached for release {release_id}, but the CI dispatch failed: {e}. \
                             approvals are recorded; retry deployment from the console."
                        ),
                    )
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }
        self.render_current(conversation_id).await
    }

    pub async fn reject(&self, conversation_id: &str, actor: &str) -> Result<(), ConsoleError> {
        let release_id = self.current_release_id(conversation_id).await?;
        self.gate_approval_action(release_id, actor).await?;

        self.engine.reject(release_id, actor).await?;
        self.transport
            .send_message(conversation_id, &format!("{actor} rejected release {release_id}"))
            .await?;
        self.render_current(conversation_id).await
    }

    /// Eligibility + not-already-approved gate, matching
    /// `active_release/service.py::handle_confirm_yes`'s guard before
    /// it lets a button press reach the approval coordinator.
    async fn gate_approval_action(&self, release_id: i64, actor: &str) -> Result<(), ConsoleError> {
        let release = self.engine.get(release_id).await?;
        if release.status != release_core::ReleaseStatus::ManualTesting {
            return Err(ConsoleError::NotInQuorumWindow);
        }
        if !self.engine.policy().required_approvers.contains(actor) {
            return Err(ConsoleError::NotEligible(actor.to_string()));
        }
        if release.approved_list.iter().any(|a| a == actor) {
            return Err(ConsoleError::AlreadyApproved(actor.to_string()));
        }
        Ok(())
    }

    /// Stage 1 of the rollback flow: offers the last 3 successful
    /// releases of the same service, excluding the one being rolled
    /// back, as rollback targets.
    pub async fn start_rollback(&self, conversation_id: &str) -> Result<(), ConsoleError> {
        let release_id = self.current_release_id(conversation_id).await?;
        let release = self.engine.get(release_id).await?;
        if release.status != release_core::ReleaseStatus::Deployed {
            return Err(ConsoleError::RollbackNotAvailable);
        }

        let candidates = self
            .engine
            .recent_successful(&release.service_name, 3, release_id)
            .await?;

        {
            let mut dialogs = self.dialogs.lock().await;
            let state = dialogs.get_mut(conversation_id).ok_or(ConsoleError::NoDialog)?;
            state.pending_rollback = Some(PendingRollback {
                release_id,
                service_name: release.service_name.clone(),
                candidates: candidates.clone(),
                selected_tag: None,
            });
        }

        let listing = candidates
            .iter()
            .map(|r| format!("- {} (released {})", r.release_tag, r.created_at))
            .collect::<Vec<_>>()
            .join("\n");
        self.transport
            .send_message(
                conversation_id,
                &format!("pick a rollback target for {}:\n{}", release.service_name, listing),
            )
            .await?;
        Ok(())
    }

    /// Stage 2: records the operator's pick and asks for confirmation.
    pub async fn select_rollback_target(&self, conversation_id: &str, tag: &str) -> Result<(), ConsoleError> {
        let mut dialogs = self.dialogs.lock().await;
        let state = dialogs.get_mut(conversation_id).ok_or(ConsoleError::NoDialog)?;
        let pending = state.pending_rollback.as_mut().ok_or(ConsoleError::NoDialog)?;
        if !pending.candidates.iter().any(|r| r.release_tag == tag) {
            return Err(ConsoleError::UnknownRollbackTarget(tag.to_string()));
        }
        pending.selected_tag = Some(tag.to_string());
        drop(dialogs);

        self.transport
            .send_message(conversation_id, &format!("roll back to {tag}? confirm to proceed"))
            .await?;
        Ok(())
    }

    /// Stage 3: fires `Engine::rollback`.
    pub async fn confirm_rollback(&self, conversation_id: &str, initiator: &str) -> Result<(), ConsoleError> {
        let (release_id, tag) = {
            let mut dialogs = self.dialogs.lock().await;
            let state = dialogs.get_mut(conversation_id).ok_or(ConsoleError::NoDialog)?;
            let pending = state.pending_rollback.take().ok_or(ConsoleError::NoDialog)?;
            let tag = pending.selected_tag.ok_or(ConsoleError::NoRollbackTargetSelected)?;
            (pending.release_id, tag)
        };

        match self.engine.rollback(release_id, &tag, initiator).await {
            Ok(release) => {
                self.transport
                    .send_message(
                        conversation_id,
                        &format!("rollback of release {release_id} to {tag} launched (now {:?})", release.status),
                    )
                    .await?;
            }
            Err(EngineError::RollbackLaunch(e)) => {
                self.transport
                    .send_message(
                        conversation_id,
                        &format!("rollback launch failed: {e}. release reverted to deployed."),
                    )
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

fn render_release(release: &Release) -> String {
    format!(
        "release {} — {} @ {} — status: {:?}\ninitiated by {}\napprovals: {}",
        release.id,
        release.service_name,
        release.release_tag,
        release.status,
        release.initiated_by,
        release.approved_list.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use release_ci::{CiTriggerClient, CiTriggerConfig};
    use release_core::{Database, NewRelease, ReleaseUpdate};
    use release_rollback::{ProductionHost, RollbackExecutor};
    use secrecy::SecretString;
    use std::collections::{HashMap as StdHashMap, HashSet};
    use tokio::sync::Mutex as TokioMutex;

    struct RecordingTransport {
        messages: TokioMutex<Vec<(String, String)>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self { messages: TokioMutex::new(Vec::new()) }
        }

        async fn last(&self) -> String {
            self.messages.lock().await.last().unwrap().1.clone()
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), ChatTransportError> {
            self.messages
                .lock()
                .await
                .push((conversation_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn update_message(
            &self,
            _conversation_id: &str,
            _message_id: &str,
            _text: &str,
        ) -> Result<(), ChatTransportError> {
            Ok(())
        }
    }

    async fn console_with(required: &[&str], admins: &[&str]) -> (OperatorConsole, Arc<RecordingTransport>) {
        let db = Database::in_memory().await.unwrap();
        let ci = CiTriggerClient::new(CiTriggerConfig::default(), SecretString::new("t".into())).unwrap();
        let rollback = RollbackExecutor::new(
            ProductionHost::default(),
            SecretString::new("p".into()),
            "http://localhost".into(),
        );
        let policy = crate::engine::ApprovalPolicy::new(
            required.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
            admins.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
        );
        let engine = Arc::new(ReleaseEngine::new(
            db,
            ci,
            crate::engine::CiDispatchTarget { repo: "svc".into() },
            rollback,
            StdHashMap::new(),
            policy,
        ));
        let transport = Arc::new(RecordingTransport::new());
        (OperatorConsole::new(engine.clone(), transport.clone()), transport)
    }

    #[tokio::test]
    async fn refresh_renders_the_first_release_in_a_view() {
        let (console, transport) = console_with(&["alice"], &["alice"]).await;
        console
            .engine
            .create(NewRelease {
                service_name: "checkout".into(),
                release_tag: "v1".into(),
                initiated_by: "ci".into(),
                github_run_id: None,
                github_action_link: None,
                github_ref: None,
            })
            .await
            .unwrap();

        console.refresh("conv1", ReleaseView::Active).await.unwrap();
        assert!(transport.last().await.contains("checkout"));
    }

    #[tokio::test]
    async fn approve_is_rejected_for_an_ineligible_actor() {
        let (console, _transport) = console_with(&["alice"], &["alice"]).await;
        let release = console
            .engine
            .create(NewRelease {
                service_name: "checkout".into(),
                release_tag: "v1".into(),
                initiated_by: "ci".into(),
                github_run_id: None,
                github_action_link: None,
                github_ref: None,
            })
            .await
            .unwrap();
        console
            .engine
            .update(release.id, ReleaseUpdate { status: Some(release_core::ReleaseStatus::StageBuilding), ..Default::default() })
            .await
            .unwrap();
        console
            .engine
            .update(release.id, ReleaseUpdate { status: Some(release_core::ReleaseStatus::StageTestRollback), ..Default::default() })
            .await
            .unwrap();
        console
            .engine
            .update(release.id, ReleaseUpdate { status: Some(release_core::ReleaseStatus::ManualTesting), ..Default::default() })
            .await
            .unwrap();

        console.refresh("conv1", ReleaseView::Active).await.unwrap();
        let err = console.approve("conv1", "mallory").await.unwrap_err();
        assert!(matches!(err, ConsoleError::NotEligible(_)));
    }

    #[tokio::test]
    async fn navigation_wraps_around_the_cached_list() {
        let (console, _transport) = console_with(&["alice"], &["alice"]).await;
        for tag in ["v1", "v2"] {
            console
                .engine
                .create(NewRelease {
                    service_name: "checkout".into(),
                    release_tag: tag.into(),
                    initiated_by: "ci".into(),
                    github_run_id: None,
                    github_action_link: None,
                    github_ref: None,
                })
                .await
                .unwrap();
        }
        console.refresh("conv1", ReleaseView::Active).await.unwrap();
        console.previous("conv1").await.unwrap();
        let dialogs = console.dialogs.lock().await;
        assert_eq!(dialogs.get("conv1").unwrap().current_index, 1);
    }
}
