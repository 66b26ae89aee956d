//! release-web — the two external surfaces spec.md puts in front of
//! the release state machine: the Event Intake HTTP API (`api`) that
//! CI and the rollback plan's callbacks post/patch against, and the
//! Operator Console (`console`) that drives approvals and rollbacks
//! from a chat surface. `engine` is the composition root both sit on
//! top of — it is the only thing in this crate that talks to
//! `release-core`, `release-ci`, and `release-rollback` together.

pub mod api;
pub mod console;
pub mod engine;

pub use api::{AppState, ApiError, create_intake_router};
pub use console::{ChatTransport, ChatTransportError, ConsoleError, DialogState, OperatorConsole, PendingRollback, ReleaseView};
pub use engine::{ApprovalOutcome, ApprovalPolicy, CiDispatchTarget, EngineError, ReleaseEngine};
