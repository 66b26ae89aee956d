//! CI Trigger Client — fires a GitHub Actions `workflow_dispatch`
//! event once a release's approval quorum closes.
//!
//! HTTP client construction follows
//! `orchestrate-core/src/ci/github_actions.rs::GitHubActionsClient::new`
//! (bounded timeout, fixed user agent). The request shape is ported
//! from `original_source`'s
//! `pkg/client/external/github/client.py::GitHubClient.trigger_workflow`:
//! `POST /repos/{owner}/{repo}/actions/workflows/{workflow_id}/dispatches`
//! with a bearer token and a `{ref, inputs}` JSON body.

use std::collections::HashMap;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CiDispatchError {
    #[error("request to GitHub Actions failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub Actions returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, CiDispatchError>;

#[derive(Debug, Clone)]
pub struct CiTriggerConfig {
    pub api_base_url: String,
    pub owner: String,
}

impl Default for CiTriggerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            owner: String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DispatchBody {
    #[serde(rename = "ref")]
    git_ref: String,
    inputs: HashMap<String, String>,
}

/// Fires `workflow_dispatch` for one GitHub Actions workflow.
pub struct CiTriggerClient {
    http: reqwest::Client,
    config: CiTriggerConfig,
    token: SecretString,
}

impl CiTriggerClient {
    pub fn new(config: CiTriggerConfig, token: SecretString) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("release-orchestrator")
            .build()?;
        Ok(Self {
            http,
            config,
            token,
        })
    }

    /// Dispatches `workflow_id` against `repo` for `release_id`/
    /// `release_tag`, mirroring the inputs the original bot sends
    /// (`on-approve-manual-testing.yaml.yml`).
    pub async fn trigger_workflow(
        &self,
        repo: &str,
        workflow_id: &str,
        git_ref: &str,
        inputs: HashMap<String, String>,
    ) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/actions/workflows/{}/dispatches",
            self.config.api_base_url, self.config.owner, repo, workflow_id
        );

        let body = DispatchBody {
            git_ref: git_ref.to_string(),
            inputs,
        };

        let response = self
            .http
            .post(&url)
            .header("Accept", "application/vnd.github+json")
            .header(
                "Authorization",
                format!("Bearer {}", self.token.expose_secret()),
            )
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(repo, workflow_id, status = status.as_u16(), "workflow_dispatch rejected by GitHub");
            return Err(CiDispatchError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        info!(repo, workflow_id, git_ref, "workflow_dispatch sent");
        Ok(())
    }

    /// Convenience wrapper matching the bot's manual-testing approval
    /// dispatch: `{release_id, release_tag}` as string-valued inputs.
    pub async fn trigger_manual_testing_approved(
        &self,
        repo: &str,
        release_id: i64,
        release_tag: &str,
    ) -> Result<()> {
        let mut inputs = HashMap::new();
        inputs.insert("release_id".to_string(), release_id.to_string());
        inputs.insert("release_tag".to_string(), release_tag.to_string());
        self.trigger_workflow(repo, "on-approve-manual-testing.yaml.yml", "main", inputs)
            .await
    }
}
