//! The journey API client: retries, idempotency, trace context, error
//! mapping.

use crate::request::build_request;
use crate::resolver::OpenApiResolver;
use crate::transport::{HttpTransport, RawResponse, TransportError};
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use wayfarer_core::{new_traceparent, ApiClientError, ErrorCode};

/// Total attempts per call, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// A successful API response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Parsed JSON body; `None` when the body is empty or not JSON.
    pub body: Option<Value>,
}

/// Stateful wrapper over an HTTP transport bound to one OpenAPI bundle.
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    resolver: Arc<OpenApiResolver>,
    base_url: String,
    default_headers: HashMap<String, String>,
    pinning: bool,
    cancelled: AtomicBool,
    cancel_notify: Notify,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        resolver: Arc<OpenApiResolver>,
        base_url: impl Into<String>,
        default_headers: HashMap<String, String>,
        pinning: bool,
    ) -> Self {
        Self {
            transport,
            resolver,
            base_url: base_url.into(),
            default_headers,
            pinning,
            cancelled: AtomicBool::new(false),
            cancel_notify: Notify::new(),
        }
    }

    /// Cancel in-flight retry backoffs. A cancelled sleep surfaces as a
    /// transport failure.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_waiters();
    }

    /// Invoke an operation by identifier.
    ///
    /// Retries up to three attempts on 408, 429 and 5xx, honoring
    /// `Retry-After`; every request carries a fresh `traceparent`, and a
    /// non-empty idempotency key is sent as `X-Idempotency-Key`.
    pub async fn call(
        &self,
        operation_id: &str,
        body: Option<&Value>,
        headers: &HashMap<String, String>,
        idempotency_key: Option<&str>,
    ) -> Result<ApiResponse, ApiClientError> {
        let operation = self.resolver.operation(operation_id).ok_or_else(|| {
            ApiClientError::RequestBuildFailed(wayfarer_core::ResolverError::RequestBuildFailed {
                reason: format!("unknown operationId '{operation_id}'"),
            })
        })?;

        let mut merged = self.default_headers.clone();
        merged.extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut request = build_request(&self.base_url, operation, body, &merged)?;
        request.set_header("traceparent", new_traceparent());
        if let Some(key) = idempotency_key.filter(|key| !key.is_empty()) {
            request.set_header("X-Idempotency-Key", key);
        }

        let has_idempotency_key = request.header("X-Idempotency-Key").is_some();
        let mut attempt: u32 = 0;
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(ApiClientError::Transport {
                    reason: "cancelled".to_string(),
                });
            }

            match self.transport.execute(&request).await {
                Err(TransportError::TlsUntrusted { reason }) if self.pinning => {
                    tracing::error!(operation_id, %reason, "certificate pinning failure");
                    return Err(ApiClientError::HttpError {
                        status: -1,
                        code: ErrorCode::PinningFail,
                    });
                }
                Err(error) => {
                    // Transport failures exit immediately; only retriable
                    // HTTP statuses re-enter the loop.
                    return Err(ApiClientError::Transport {
                        reason: error.to_string(),
                    });
                }
                Ok(response) => {
                    let status = response.status;
                    if (200..300).contains(&status) {
                        return Ok(into_api_response(response));
                    }

                    let code = map_status(status, has_idempotency_key);
                    if !is_retryable(status) {
                        return Err(ApiClientError::HttpError {
                            status: status as i32,
                            code,
                        });
                    }

                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(ApiClientError::RetryLimitExceeded {
                            attempts: MAX_ATTEMPTS,
                            status: status as i32,
                            code,
                        });
                    }

                    let delay = retry_after(&response).unwrap_or_else(|| backoff(attempt - 1));
                    tracing::warn!(
                        operation_id,
                        status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after retriable status"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel_notify.notified() => {
                            return Err(ApiClientError::Transport {
                                reason: "cancelled during retry backoff".to_string(),
                            });
                        }
                    }
                }
            }
        }
    }
}

fn into_api_response(response: RawResponse) -> ApiResponse {
    let body = if response.body.is_empty() {
        None
    } else {
        serde_json::from_slice(&response.body).ok()
    };
    ApiResponse {
        status: response.status,
        headers: response.headers,
        body,
    }
}

fn is_retryable(status: u16) -> bool {
    matches!(status, 408 | 429) || (500..600).contains(&status)
}

/// The fixed HTTP-status-to-error-code mapping.
fn map_status(status: u16, has_idempotency_key: bool) -> ErrorCode {
    match status {
        401 | 403 => ErrorCode::AuthExpired,
        408 => ErrorCode::NetTimeout,
        409 if has_idempotency_key => ErrorCode::IdempotentReplay,
        400 | 422 => ErrorCode::ValidationFail,
        429 => ErrorCode::RateLimited,
        _ => ErrorCode::Unknown,
    }
}

/// `Retry-After` in seconds, parsed as a number.
fn retry_after(response: &RawResponse) -> Option<Duration> {
    let seconds: f64 = response.header("Retry-After")?.trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

/// `0.5 * 2^n` seconds plus up to 250ms of jitter.
fn backoff(exponent: u32) -> Duration {
    let base = 0.5_f64 * f64::from(1u32 << exponent.min(16));
    let jitter: f64 = rand::rng().random_range(0.0..0.25);
    Duration::from_secs_f64(base + jitter)
}
