//! Health probing of a running `bw serve`

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{map_probe_error, ProbeError};

/// Lock state reported by `bw serve`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Unlocked,
    /// Any other reported state, e.g. `locked` or `unauthenticated`
    Locked(String),
}

impl BackendStatus {
    pub fn is_unlocked(&self) -> bool {
        matches!(self, Self::Unlocked)
    }
}

/// Payload of `GET /status`
#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    success: bool,
    data: Option<StatusData>,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    template: Option<StatusTemplate>,
}

#[derive(Debug, Deserialize)]
struct StatusTemplate {
    status: Option<String>,
}

impl StatusResponse {
    fn into_status(self) -> Result<BackendStatus, ProbeError> {
        if !self.success {
            return Err(ProbeError::Malformed("success=false".to_string()));
        }

        let status = self
            .data
            .and_then(|d| d.template)
            .and_then(|t| t.status)
            .ok_or_else(|| ProbeError::Malformed("missing data.template.status".to_string()))?;

        if status == "unlocked" {
            Ok(BackendStatus::Unlocked)
        } else {
            Ok(BackendStatus::Locked(status))
        }
    }
}

/// Live round-trip check against the backend
#[async_trait]
pub trait BackendProbe: Send + Sync {
    async fn status(&self) -> Result<BackendStatus, ProbeError>;
}

/// Probe that calls `GET /status` on `bw serve`
#[derive(Debug, Clone)]
pub struct HttpStatusProbe {
    client: reqwest::Client,
    status_url: String,
}

impl HttpStatusProbe {
    /// Create a probe for the backend at `base_url` with a request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(map_probe_error)?;

        Ok(Self {
            client,
            status_url: format!("{}/status", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl BackendProbe for HttpStatusProbe {
    async fn status(&self) -> Result<BackendStatus, ProbeError> {
        debug!(url = %self.status_url, "Probing backend status");

        let response = self
            .client
            .get(&self.status_url)
            .send()
            .await
            .map_err(map_probe_error)?
            .error_for_status()
            .map_err(map_probe_error)?;

        let body: StatusResponse = response.json().await.map_err(map_probe_error)?;
        body.into_status()
    }
}
