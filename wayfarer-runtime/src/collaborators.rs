//! External collaborator seams the embedding application implements.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use wayfarer_bridge::{Bridge, OutboundEnvelope, PageSink};

/// JavaScript global the hosted page exposes to receive envelopes.
pub const DEFAULT_BRIDGE_NAME: &str = "WayfarerBridge";

/// The embedded web view widget.
///
/// The runtime drives it with exactly two operations: present a URL with
/// the bridge attached, and evaluate a script on the current page. Page
/// messages flow back by the host calling [`Bridge::handle_incoming`].
#[async_trait]
pub trait WebViewHost: Send + Sync {
    async fn present(
        &self,
        url: &str,
        bridge: Arc<Bridge>,
        allowed_origins: &[String],
        allow_file_origins: bool,
    );

    async fn dispatch_to_page(&self, script: &str);
}

/// Telemetry sink. A single emit seam; no metrics surface.
pub trait EventSink: Send + Sync {
    fn emit(&self, name: &str, attributes: &Value);
}

/// Default sink: structured tracing events.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, name: &str, attributes: &Value) {
        tracing::info!(target: "wayfarer::telemetry", event = name, %attributes);
    }
}

/// Sink for callers that opted out of telemetry.
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _name: &str, _attributes: &Value) {}
}

/// Interactive sign-in failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("sign-in failed: {reason}")]
pub struct SignInError {
    pub reason: String,
}

/// The OIDC sign-in surface. Only invoked when the manifest sets
/// `security.requireHandshake`.
#[async_trait]
pub trait SignInProvider: Send + Sync {
    /// Complete sign-in if a session is required, returning the callback
    /// URL the surface redirected to.
    async fn sign_in_if_needed(
        &self,
        auth_url: &str,
        redirect_scheme: &str,
    ) -> Result<String, SignInError>;
}

/// Production page sink: serializes each envelope and evaluates the
/// receive hook on the hosted page.
pub struct ScriptPageSink {
    host: Arc<dyn WebViewHost>,
    bridge_name: String,
}

impl ScriptPageSink {
    pub fn new(host: Arc<dyn WebViewHost>) -> Self {
        Self {
            host,
            bridge_name: DEFAULT_BRIDGE_NAME.to_string(),
        }
    }

    pub fn with_bridge_name(host: Arc<dyn WebViewHost>, bridge_name: impl Into<String>) -> Self {
        Self {
            host,
            bridge_name: bridge_name.into(),
        }
    }
}

#[async_trait]
impl PageSink for ScriptPageSink {
    async fn deliver(&self, envelope: &OutboundEnvelope) {
        match serde_json::to_string(envelope) {
            Ok(json) => {
                let name = &self.bridge_name;
                let script = format!("window.{name} && window.{name}.receive({json})");
                self.host.dispatch_to_page(&script).await;
            }
            Err(error) => {
                tracing::warn!(%error, name = %envelope.name, "failed to serialize outbound envelope");
            }
        }
    }
}
