//! release-rollback — SSH-based remote execution of release rollback
//! scripts against the production host.

pub mod executor;
pub mod script;

pub use executor::{ProductionHost, RemoteScript, RollbackExecutor, RollbackLaunchError, RollbackRequest};
pub use script::{generate_rollback_script, ServiceTopology};
