//! Workspace service client
//!
//! Implements [`IWorkspaceReplicator`] over the workspace service's REST
//! API:
//!
//! - `GET  /workspaces/{workspaceId}/session` returns `{"sessionId": ...}`,
//!   or 404 when the workspace has no active session
//! - `POST /sessions/{sessionId}/pull-mirror` with a [`PullSignal`] body
//!
//! Timeouts, connection failures, throttling and 5xx responses are
//! transient; every other failure is permanent. Nothing is retried here.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use mirrorsync_core::domain::WorkspaceId;
use mirrorsync_core::ports::{
    IWorkspaceReplicator, PullSignal, ReplicationError, WorkspaceSession,
};

use crate::client::ApiClient;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: String,
}

/// Replicator talking to the workspace service over HTTP
#[derive(Debug, Clone)]
pub struct HttpWorkspaceReplicator {
    client: ApiClient,
    timeout: Duration,
}

impl HttpWorkspaceReplicator {
    /// Creates a replicator for the service at `endpoint`
    pub fn new(
        endpoint: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: ApiClient::with_base_url(access_token, endpoint),
            timeout,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ReplicationError> {
        builder
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ReplicationError::Transient(e.to_string()))
    }
}

fn invalid_url(e: mirrorsync_core::ports::ProviderError) -> ReplicationError {
    ReplicationError::Permanent(e.to_string())
}

/// Maps a non-success status onto a replication failure
fn status_error(status: StatusCode, body: &str) -> ReplicationError {
    let message = if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), body)
    };
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        ReplicationError::Transient(message)
    } else {
        ReplicationError::Permanent(message)
    }
}

async fn failure(response: Response) -> ReplicationError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    status_error(status, body.trim())
}

#[async_trait::async_trait]
impl IWorkspaceReplicator for HttpWorkspaceReplicator {
    async fn active_session(
        &self,
        workspace: &WorkspaceId,
    ) -> Result<Option<WorkspaceSession>, ReplicationError> {
        let url = self
            .client
            .url_for(&["workspaces"], &[workspace.as_str(), "session"])
            .map_err(invalid_url)?;
        let response = self.send(self.client.request_url(Method::GET, url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(workspace = %workspace, "No active workspace session");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(failure(response).await);
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| ReplicationError::Permanent(format!("invalid session response: {e}")))?;
        Ok(Some(WorkspaceSession {
            id: session.session_id,
        }))
    }

    async fn signal_pull(
        &self,
        session: &WorkspaceSession,
        signal: &PullSignal,
    ) -> Result<(), ReplicationError> {
        let url = self
            .client
            .url_for(&["sessions"], &[session.id.as_str(), "pull-mirror"])
            .map_err(invalid_url)?;
        let response = self
            .send(self.client.request_url(Method::POST, url).json(signal))
            .await?;

        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        debug!(session = %session.id, provider = %signal.provider, "Signalled workspace to pull mirror");
        Ok(())
    }
}

/// Replicator used when no workspace service is configured
///
/// Never finds a session, so every pass settles at `ready`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledReplicator;

#[async_trait::async_trait]
impl IWorkspaceReplicator for DisabledReplicator {
    async fn active_session(
        &self,
        _workspace: &WorkspaceId,
    ) -> Result<Option<WorkspaceSession>, ReplicationError> {
        Ok(None)
    }

    async fn signal_pull(
        &self,
        _session: &WorkspaceSession,
        _signal: &PullSignal,
    ) -> Result<(), ReplicationError> {
        Ok(())
    }
}
