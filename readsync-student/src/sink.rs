//! Report delivery to the Session Hub
//!
//! The driver talks to the hub through the [`ProgressSink`] seam so
//! tests can capture reports without a server. [`HubClient`] is the
//! HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use readsync_common::api::{
    CreateSessionRequest, CreateSessionResponse, ErrorResponse, JoinSessionRequest,
    JoinSessionResponse, OkResponse, ProgressAck, ProgressReport,
};
use readsync_common::{Error, Result};

const USER_AGENT: &str = concat!("readsync-student/", env!("CARGO_PKG_VERSION"));

/// Destination for tracker output
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Register a student with the session, returning the assigned id
    async fn join(
        &self,
        session_id: &str,
        request: JoinSessionRequest,
    ) -> Result<JoinSessionResponse>;

    /// Deliver one progress report
    async fn report(&self, session_id: &str, report: ProgressReport) -> Result<ProgressAck>;
}

/// HTTP sink talking to a readsync-hub instance
#[derive(Clone)]
pub struct HubClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl HubClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// Create a session; used by tooling, not by the tracker itself
    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CreateSessionResponse> {
        // A caller-supplied id can collide, so keep it for the error path
        let session_id = request.session_id.clone().unwrap_or_default();
        let url = format!("{}/api/session", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        decode(&session_id, response).await
    }

    /// End a session; used by tooling, not by the tracker itself
    pub async fn end_session(&self, session_id: &str) -> Result<OkResponse> {
        let url = format!("{}/api/session/{}/end", self.base_url, session_id);
        let response = self
            .http_client
            .post(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        decode(session_id, response).await
    }
}

#[async_trait]
impl ProgressSink for HubClient {
    async fn join(
        &self,
        session_id: &str,
        request: JoinSessionRequest,
    ) -> Result<JoinSessionResponse> {
        let url = format!("{}/api/session/{}/join", self.base_url, session_id);
        debug!(session_id = %session_id, url = %url, "joining session");
        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        decode(session_id, response).await
    }

    async fn report(&self, session_id: &str, report: ProgressReport) -> Result<ProgressAck> {
        let url = format!("{}/api/session/{}/progress", self.base_url, session_id);
        let response = self
            .http_client
            .post(&url)
            .json(&report)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        decode(session_id, response).await
    }
}

/// Map hub status codes back onto domain errors
async fn decode<T: serde::de::DeserializeOwned>(
    session_id: &str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();

    if status.as_u16() == 404 {
        return Err(Error::SessionNotFound(session_id.to_string()));
    }

    if status.as_u16() == 410 {
        return Err(Error::SessionEnded(session_id.to_string()));
    }

    if status.as_u16() == 409 {
        return Err(Error::AlreadyExists(session_id.to_string()));
    }

    if status.as_u16() == 400 {
        let body: ErrorResponse = response
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        return Err(Error::MalformedReport(body.error));
    }

    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(Error::Http(format!(
            "HTTP {}: {}",
            status.as_u16(),
            error_text
        )));
    }

    response.json().await.map_err(|e| Error::Http(e.to_string()))
}
