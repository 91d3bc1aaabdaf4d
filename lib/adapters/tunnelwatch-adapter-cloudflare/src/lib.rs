//! Tunnel listing against the Cloudflare v4 API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use tunnelwatch_domain::{AccountFetchError, AccountGroup, ObservedUnit};
use tunnelwatch_ports::MonitoringPort;

const USER_AGENT: &str = concat!("tunnelwatch/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    #[serde(default)]
    result: Option<Vec<TunnelRecord>>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TunnelRecord {
    id: String,
    name: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CloudflareMonitor {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl CloudflareMonitor {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build monitoring HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn tunnels_url(&self, account_id: &str) -> String {
        format!("{}/accounts/{account_id}/tunnels", self.base_url)
    }

    fn transport_error(&self, err: reqwest::Error) -> AccountFetchError {
        if err.is_timeout() {
            AccountFetchError::Timeout(self.timeout)
        } else {
            AccountFetchError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl MonitoringPort for CloudflareMonitor {
    async fn list_units(
        &self,
        account: &AccountGroup,
    ) -> Result<Vec<ObservedUnit>, AccountFetchError> {
        let response = self
            .client
            .get(self.tunnels_url(&account.id))
            .query(&[("is_deleted", "false")])
            .bearer_auth(&account.credential)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| self.transport_error(err))?;
        tracing::debug!(account = %account.alias, status, "tunnel listing received");
        decode_envelope(&account.id, status, &body)
    }
}

/// Maps a tunnel listing response onto observed units.
///
/// The envelope's `success` flag is authoritative; a 2xx with `success: false` is still an
/// error. Tunnels without a status are reported as `unknown`.
pub fn decode_envelope(
    account_id: &str,
    status: u16,
    body: &str,
) -> Result<Vec<ObservedUnit>, AccountFetchError> {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(err) if (200..300).contains(&status) => {
            return Err(AccountFetchError::Payload(err.to_string()));
        }
        Err(_) => {
            return Err(AccountFetchError::Status {
                status,
                message: truncate(body.trim()),
            });
        }
    };

    if !envelope.success || !(200..300).contains(&status) {
        let message = envelope
            .errors
            .iter()
            .map(|error| match error.code {
                Some(code) => format!("{code}: {}", error.message),
                None => error.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        return Err(AccountFetchError::Status {
            status,
            message: if message.is_empty() {
                "API error".to_string()
            } else {
                message
            },
        });
    }

    Ok(envelope
        .result
        .unwrap_or_default()
        .into_iter()
        .map(|tunnel| ObservedUnit {
            name: tunnel.name,
            id: tunnel.id,
            status: tunnel.status.unwrap_or_else(|| "unknown".to_string()),
            account_id: account_id.to_string(),
        })
        .collect())
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((end, _)) => format!("{}…", &body[..end]),
        None => body.to_string(),
    }
}
