//! Rollback Executor — opens an SSH session to the production host,
//! writes a generated rollback script into place, and launches it
//! detached.
//!
//! Ported from `ReleaseService.rollback_to_tag` in
//! `original_source/src/loom-release-tg-bot/internal/service/release/service.py`,
//! which uses `asyncssh.connect(host=prod_host, username="root",
//! password=prod_password, connect_timeout=30, known_hosts=None)`,
//! writes the script through an SFTP file handle, then runs
//! `chmod +x {script} && nohup bash {script} > /dev/null 2>&1 &
//! echo $!` so the rollback survives the SSH session closing. Since
//! the script body can contain arbitrary shell metacharacters, it is
//! base64-encoded client-side and decoded on the remote end through
//! the same exec channel used to launch it, rather than opened as a
//! literal shell string.
//!
//! The service-struct shape (config fields, one method per lifecycle
//! operation) follows `orchestrate-core/src/deployment_rollback.rs`'s
//! `DeploymentRollback`, whose own rollback execution is simulated;
//! the real remote-exec mechanism is grounded instead on
//! `async-ssh2-tokio`, a password-capable async SSH client genuinely
//! used elsewhere in the retrieval pack
//! (`demohiiiii-rneter/Cargo.toml`), matching the original's
//! password-authenticated `asyncssh` session more closely than a
//! key-only client would.

use std::time::Duration;

use async_ssh2_tokio::{AuthMethod, Client, ServerCheckMethod};
use base64::{engine::general_purpose::STANDARD, Engine};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{info, warn};

use crate::script::{generate_rollback_script, ServiceTopology};

#[derive(Debug, Error)]
pub enum RollbackLaunchError {
    #[error("timed out connecting to production host")]
    ConnectTimeout,

    #[error("failed to connect to production host: {0}")]
    Connect(#[source] async_ssh2_tokio::Error),

    #[error("failed to write rollback script to remote host: {0}")]
    Upload(#[source] async_ssh2_tokio::Error),

    #[error("failed to launch rollback script: {0}")]
    Launch(#[source] async_ssh2_tokio::Error),

    #[error("remote command exited with non-zero status {0}")]
    RemoteFailure(u32),
}

pub type Result<T> = std::result::Result<T, RollbackLaunchError>;

#[derive(Debug, Clone)]
pub struct ProductionHost {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl Default for ProductionHost {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: "root".to_string(),
        }
    }
}

/// Everything needed to build and launch one rollback run.
#[derive(Debug, Clone)]
pub struct RollbackRequest {
    pub release_id: i64,
    pub service_name: String,
    pub target_tag: String,
    pub topology: ServiceTopology,
}

pub struct RollbackExecutor {
    host: ProductionHost,
    password: SecretString,
    event_intake_base_url: String,
}

impl RollbackExecutor {
    pub fn new(
        host: ProductionHost,
        password: SecretString,
        event_intake_base_url: String,
    ) -> Self {
        Self {
            host,
            password,
            event_intake_base_url,
        }
    }

    async fn connect(&self) -> Result<Client> {
        let connect = Client::connect(
            (self.host.host.as_str(), self.host.port),
            &self.host.username,
            AuthMethod::with_password(self.password.expose_secret()),
            ServerCheckMethod::NoCheck,
        );

        match tokio::time::timeout(Duration::from_secs(30), connect).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(e)) => Err(RollbackLaunchError::Connect(e)),
            Err(_) => Err(RollbackLaunchError::ConnectTimeout),
        }
    }

    /// Generates the rollback script, writes it to `/tmp` on the
    /// production host, and launches it detached (`nohup ... &
    /// echo $!`) so the remote process keeps running after the SSH
    /// session is torn down.
    pub async fn launch_rollback(&self, request: &RollbackRequest) -> Result<RemoteScript> {
        let client = self.connect().await?;

        let timestamp = chrono::Utc::now().timestamp();
        let script_path = format!(
            "/tmp/rollback_{}_{}_{}.sh",
            request.service_name, request.target_tag, timestamp
        );

        let script_body = generate_rollback_script(
            &self.event_intake_base_url,
            request.release_id,
            &request.service_name,
            &request.target_tag,
            &request.topology,
        );
        let encoded = STANDARD.encode(script_body.as_bytes());

        let write_command = format!("echo {encoded} | base64 -d > {script_path}");
        let write_result = client
            .execute(&write_command)
            .await
            .map_err(RollbackLaunchError::Upload)?;
        if write_result.exit_status != 0 {
            warn!(
                release_id = request.release_id,
                script_path, "rollback script upload failed on remote host"
            );
            return Err(RollbackLaunchError::RemoteFailure(write_result.exit_status));
        }

        let launch_command = format!(
            "chmod +x {path} && nohup bash {path} > /dev/null 2>&1 & echo $!",
            path = script_path
        );
        let launch_result = client
            .execute(&launch_command)
            .await
            .map_err(RollbackLaunchError::Launch)?;

        let pid = launch_result.stdout.trim().to_string();

        client.disconnect().await.ok();

        info!(
            release_id = request.release_id,
            script_path, pid, "rollback script launched on production host"
        );

        Ok(RemoteScript {
            script_path,
            remote_pid: pid,
        })
    }
}

/// Handle to the launched remote script, surfaced to the operator
/// console so it can be referenced in a later status update.
#[derive(Debug, Clone)]
pub struct RemoteScript {
    pub script_path: String,
    pub remote_pid: String,
}
