//! Remediation through GitHub Actions `workflow_dispatch`.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use tunnelwatch_domain::{RemediationDispatchError, RemediationTarget};
use tunnelwatch_ports::RemediationPort;

const USER_AGENT: &str = concat!("tunnelwatch/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "application/vnd.github+json";
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
}

#[derive(Clone)]
pub struct GithubWorkflowDispatcher {
    client: reqwest::Client,
    base_url: String,
    workflow_file: String,
}

impl fmt::Debug for GithubWorkflowDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubWorkflowDispatcher")
            .field("base_url", &self.base_url)
            .field("workflow_file", &self.workflow_file)
            .finish()
    }
}

impl GithubWorkflowDispatcher {
    pub fn new(
        base_url: impl Into<String>,
        workflow_file: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build remediation HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            workflow_file: workflow_file.into(),
        })
    }

    pub fn dispatch_url(&self, target: &RemediationTarget) -> String {
        format!(
            "{}/repos/{}/{}/actions/workflows/{}/dispatches",
            self.base_url, target.owner, target.repo, self.workflow_file
        )
    }
}

#[async_trait]
impl RemediationPort for GithubWorkflowDispatcher {
    async fn dispatch_workflow(
        &self,
        target: &RemediationTarget,
    ) -> Result<u16, RemediationDispatchError> {
        let url = self.dispatch_url(target);
        tracing::debug!(%url, branch = %target.branch, "dispatching workflow");
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, format!("token {}", target.credential))
            .header(reqwest::header::ACCEPT, ACCEPT)
            .json(&DispatchRequest {
                git_ref: &target.branch,
            })
            .send()
            .await
            .map_err(|err| RemediationDispatchError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(status.as_u16());
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemediationDispatchError::Rejected {
            status: status.as_u16(),
            body: truncate(body.trim()),
        })
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((end, _)) => format!("{}…", &body[..end]),
        None => body.to_string(),
    }
}
