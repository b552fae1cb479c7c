//! Reachability probing
//!
//! A probe is a single GET through the shared [`ProxyClient`]. Every
//! network-facing failure is caught here and turned into a [`ProbeError`];
//! nothing above this module ever sees a raw transport error.

use crate::outbound::ProxyClient;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Typed probe failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// DNS failure, refused connection, timeout, malformed URL, redirect loop
    #[error("{0}")]
    Unreachable(String),

    /// Host answered, resource absent
    #[error("status code is 404")]
    NotFound,

    /// Echo endpoint answered with something other than `{"origin": ...}`
    #[error("invalid echo response: {0}")]
    InvalidEcho(String),
}

impl ProbeError {
    fn unreachable(err: &reqwest::Error) -> Self {
        ProbeError::Unreachable(error_chain(err))
    }
}

/// Successful probe outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSuccess {
    /// URL the request ended at after following redirects
    pub final_url: String,
}

pub type ProbeResult = std::result::Result<ProbeSuccess, ProbeError>;

/// Body returned by the IP echo endpoint
#[derive(Debug, Deserialize)]
struct EchoResponse {
    origin: String,
}

/// Render an error with its source chain, reqwest keeps the useful part
/// (e.g. "connection refused") in the sources
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Single-shot reachability probe
#[derive(Clone, Debug)]
pub struct ReachabilityProbe {
    client: ProxyClient,
}

impl ReachabilityProbe {
    pub fn new(client: ProxyClient) -> Self {
        ReachabilityProbe { client }
    }

    /// Per-request timeout of the underlying client
    pub fn timeout(&self) -> std::time::Duration {
        self.client.timeout()
    }

    /// GET `target` and report where it ended up
    ///
    /// Any status other than 404 counts as reachable, error statuses
    /// included. The body is never read.
    pub async fn probe(&self, target: &str) -> ProbeResult {
        let response = self.fetch(target).await?;
        let final_url = response.url().to_string();
        debug!("Probe {} resolved to {} ({})", target, final_url, response.status());
        Ok(ProbeSuccess { final_url })
    }

    /// GET an IP echo endpoint and extract the caller's origin address
    pub async fn public_ip(&self, echo_url: &str) -> std::result::Result<String, ProbeError> {
        let response = self.fetch(echo_url).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| ProbeError::unreachable(&e))?;

        let echo: EchoResponse = serde_json::from_slice(&body).map_err(|e| {
            debug!("Echo body: {}", String::from_utf8_lossy(&body));
            ProbeError::InvalidEcho(e.to_string())
        })?;

        let origin = echo.origin.trim();
        if origin.is_empty() {
            return Err(ProbeError::InvalidEcho("empty origin".to_string()));
        }

        Ok(origin.to_string())
    }

    async fn fetch(&self, target: &str) -> std::result::Result<reqwest::Response, ProbeError> {
        let response = self
            .client
            .get(target)
            .await
            .map_err(|e| ProbeError::unreachable(&e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProbeError::NotFound);
        }

        Ok(response)
    }
}

/// Source of the agent's current public IP
#[async_trait]
pub trait IpSource: Send + Sync {
    async fn public_ip(&self) -> std::result::Result<String, ProbeError>;
}

/// [`IpSource`] backed by an HTTP IP echo endpoint
#[derive(Clone, Debug)]
pub struct EchoSource {
    probe: ReachabilityProbe,
    url: String,
}

impl EchoSource {
    pub fn new(probe: ReachabilityProbe, url: impl Into<String>) -> Self {
        EchoSource {
            probe,
            url: url.into(),
        }
    }
}

#[async_trait]
impl IpSource for EchoSource {
    async fn public_ip(&self) -> std::result::Result<String, ProbeError> {
        self.probe.public_ip(&self.url).await
    }
}
