//! # Dispatcher Client
//!
//! Form-encoded HTTP client for the remote work dispatcher: `get_work`
//! fetches the next task payload, `send_report` posts a batch of results.
//! Both calls carry fresh node identity metadata. Neither retries: the
//! scheduler decides what a failed poll means.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::multipart::Form;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, trace};

use pincast_common::Config;

use crate::task::{WorkPayload, WorkResult};
use crate::USER_AGENT;

// ════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ════════════════════════════════════════════════════════════════════════════

/// Fixed capacity value reported in the `avail` field (50 GiB).
pub const REPORTED_CAPACITY_BYTES: u64 = 50 * 1024 * 1024 * 1024;

/// Client version reported in the `version` field.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

// ════════════════════════════════════════════════════════════════════════════
// TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Node identity metadata attached to every dispatcher call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    /// Current daemon peer count.
    pub peers: u64,
    /// The daemon's node identifier.
    pub daemon_id: String,
    /// The daemon's version string.
    pub daemon_version: String,
    /// Whether the daemon reports itself online.
    pub online: bool,
}

/// Failures talking to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("dispatcher returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("undecodable dispatcher payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            DispatchError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            DispatchError::Decode(e.to_string())
        } else {
            DispatchError::Transport(e.to_string())
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// FORM RENDERING
// ════════════════════════════════════════════════════════════════════════════

fn bool_field(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

/// Identity fields shared by `/Request` and `/Response`.
pub fn identity_fields(email: &str, status: &NodeStatus) -> Vec<(&'static str, String)> {
    vec![
        ("email", email.to_string()),
        ("version", CLIENT_VERSION.to_string()),
        ("peers", status.peers.to_string()),
        ("ipfs_id", status.daemon_id.clone()),
        ("ipfs_ver", status.daemon_version.clone()),
        ("online", bool_field(status.online)),
    ]
}

/// Full `/Response` field set: identity, disk usage, fixed capacity, then
/// every result's fields in batch order.
pub fn report_fields(
    email: &str,
    status: &NodeStatus,
    used_bytes: u64,
    results: &[WorkResult],
) -> Vec<(&'static str, String)> {
    let mut fields = identity_fields(email, status);
    fields.push(("used", used_bytes.to_string()));
    fields.push(("avail", REPORTED_CAPACITY_BYTES.to_string()));
    for result in results {
        fields.extend(result.fields());
    }
    fields
}

fn build_form(fields: Vec<(&'static str, String)>) -> Form {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    form
}

// ════════════════════════════════════════════════════════════════════════════
// TRAIT & CLIENT
// ════════════════════════════════════════════════════════════════════════════

/// Boundary to the remote work dispatcher.
#[async_trait]
pub trait WorkDispatcher: Send + Sync {
    /// Fetch the next task payload.
    async fn get_work(&self, status: &NodeStatus) -> Result<WorkPayload, DispatchError>;

    /// Submit an ordered batch of results; returns the raw acknowledgment
    /// body, useful only as a diagnostic.
    async fn send_report(
        &self,
        status: &NodeStatus,
        used_bytes: u64,
        results: &[WorkResult],
    ) -> Result<String, DispatchError>;
}

/// reqwest-backed dispatcher client.
pub struct HttpDispatcher {
    base: String,
    email: String,
    client: Client,
}

impl HttpDispatcher {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(config.status_timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("reqwest client");
        HttpDispatcher {
            base: config.dispatcher_url.clone(),
            email: config.email.clone(),
            client,
        }
    }
}

#[async_trait]
impl WorkDispatcher for HttpDispatcher {
    async fn get_work(&self, status: &NodeStatus) -> Result<WorkPayload, DispatchError> {
        let url = format!("{}/Request", self.base);
        trace!(%url, "requesting work");
        let payload = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .multipart(build_form(identity_fields(&self.email, status)))
            .send()
            .await?
            .error_for_status()?
            .json::<WorkPayload>()
            .await?;
        debug!(?payload, "received work payload");
        Ok(payload)
    }

    async fn send_report(
        &self,
        status: &NodeStatus,
        used_bytes: u64,
        results: &[WorkResult],
    ) -> Result<String, DispatchError> {
        let url = format!("{}/Response", self.base);
        debug!(%url, count = results.len(), "submitting results");
        let body = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .multipart(build_form(report_fields(
                &self.email,
                status,
                used_bytes,
                results,
            )))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        trace!(%body, "dispatcher acknowledgment");
        Ok(body)
    }
}
