//! HTTP transport abstraction.
//!
//! The client only speaks `HttpTransport`; production uses reqwest, tests
//! use [`ScriptedTransport`] with canned responses.

use crate::request::ApiRequest;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// A raw HTTP response as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Look up a header value, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transport-level failures (no HTTP status was obtained).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failure: {reason}")]
    Failed { reason: String },

    /// TLS trust evaluation failed. Mapped to `PINNING_FAIL` when the
    /// manifest enables pinning.
    #[error("TLS trust evaluation failed: {reason}")]
    TlsUntrusted { reason: String },
}

/// Executes one HTTP exchange. Implementations must be thread-safe.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, TransportError>;
}

// ============================================================================
// PRODUCTION TRANSPORT (reqwest)
// ============================================================================

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest-backed transport.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Failed {
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            TransportError::Failed {
                reason: format!("invalid method '{}': {e}", request.method),
            }
        })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Failed {
                reason: e.to_string(),
            })?
            .to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> TransportError {
    // reqwest does not expose the TLS failure class as a variant; the
    // rendered error chain is the only discriminator available.
    let rendered = format!("{error:?}");
    if rendered.contains("certificate") || rendered.contains("UnknownIssuer") {
        TransportError::TlsUntrusted {
            reason: error.to_string(),
        }
    } else {
        TransportError::Failed {
            reason: error.to_string(),
        }
    }
}

// ============================================================================
// SCRIPTED TRANSPORT (for tests)
// ============================================================================

/// Transport returning canned responses in order and recording every
/// request it sees.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a canned response.
    pub fn push_response(&self, status: u16, headers: &[(&str, &str)], body: &[u8]) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(RawResponse {
                status,
                headers: headers
                    .iter()
                    .map(|(n, v)| (n.to_string(), v.to_string()))
                    .collect(),
                body: body.to_vec(),
            }));
    }

    /// Enqueue a canned transport failure.
    pub fn push_error(&self, error: TransportError) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
    }

    /// Every request executed so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::Failed {
                    reason: "no scripted response enqueued".to_string(),
                })
            })
    }
}
