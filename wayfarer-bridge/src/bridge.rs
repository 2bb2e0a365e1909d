//! The bridge state machine: handshake, gating, dispatch, signing.

use crate::envelope::{EnvelopeKind, EnvelopeMeta, InboundEnvelope, OutboundEnvelope};
use crate::plugin::PluginRegistry;
use crate::sink::PageSink;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;
use wayfarer_core::{
    is_origin_allowed, new_traceparent, CorrelationId, BRIDGE_VERSION, SDK_VERSION,
};
use wayfarer_signing::EnvelopeSigner;

/// Write-only forward of page events into the state machine's queue.
pub type EventForward = Arc<dyn Fn(String, Value) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum BridgeState {
    NotReady,
    Ready { origin: String, page_nonce: String },
}

/// Construction parameters for [`Bridge`].
pub struct BridgeParams {
    /// Origins accepted at handshake, from the manifest.
    pub allowed_origins: Vec<String>,
    pub allow_file_origins: bool,
    /// Methods accepted while the first step is current.
    pub allowed_methods: Vec<String>,
    /// Optional envelope signer; unsigned bridges omit `sig`.
    pub signer: Option<Arc<EnvelopeSigner>>,
    pub plugins: Arc<PluginRegistry>,
    pub sink: Arc<dyn PageSink>,
    /// Write-only event forward into the state machine.
    pub forward: EventForward,
    pub correlation_id: CorrelationId,
    /// Invoked when a handshake is blocked; lets the orchestrator end the
    /// journey with `ORIGIN_BLOCKED`.
    pub on_origin_blocked: Option<Arc<dyn Fn(String) + Send + Sync>>,
}

/// The signed, origin-gated message channel.
///
/// Until a `bridge_hello` from an allow-listed origin completes, the only
/// envelopes this bridge emits are `ORIGIN_BLOCKED` and `bridge_ready`.
/// A repeated `bridge_hello` re-validates (pages reload); a failed
/// re-handshake drops the bridge back to not-ready.
pub struct Bridge {
    allowed_origins: Vec<String>,
    allow_file_origins: bool,
    state: RwLock<BridgeState>,
    allowed_methods: RwLock<HashSet<String>>,
    signer: Option<Arc<EnvelopeSigner>>,
    plugins: Arc<PluginRegistry>,
    sink: Arc<dyn PageSink>,
    forward: EventForward,
    correlation_id: CorrelationId,
    on_origin_blocked: Option<Arc<dyn Fn(String) + Send + Sync>>,
}

impl Bridge {
    pub fn new(params: BridgeParams) -> Self {
        Self {
            allowed_origins: params.allowed_origins,
            allow_file_origins: params.allow_file_origins,
            state: RwLock::new(BridgeState::NotReady),
            allowed_methods: RwLock::new(params.allowed_methods.into_iter().collect()),
            signer: params.signer,
            plugins: params.plugins,
            sink: params.sink,
            forward: params.forward,
            correlation_id: params.correlation_id,
            on_origin_blocked: params.on_origin_blocked,
        }
    }

    /// Whether the handshake has completed.
    pub fn is_ready(&self) -> bool {
        matches!(*self.read_state(), BridgeState::Ready { .. })
    }

    /// Replace the method allow-list atomically. Called on every step
    /// entry with the new step's `bridgeAllow`.
    pub fn update_allowed_methods(&self, methods: &[String]) {
        let mut allowed = self
            .allowed_methods
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *allowed = methods.iter().cloned().collect();
    }

    /// Process one inbound envelope from the page. Receipt may happen on
    /// any thread; forwarded events land on the state machine's queue.
    pub async fn handle_incoming(&self, envelope: InboundEnvelope) {
        let ready = self.is_ready();

        if envelope.kind == EnvelopeKind::Event && envelope.name == "bridge_hello" {
            self.handshake(&envelope.payload).await;
            return;
        }

        if !ready {
            tracing::warn!(name = %envelope.name, "inbound message before handshake");
            self.emit_event("ORIGIN_BLOCKED", json!({ "reason": "bridge not ready" }))
                .await;
            return;
        }

        match envelope.kind {
            EnvelopeKind::Event => (self.forward)(envelope.name, envelope.payload),
            EnvelopeKind::Request => self.handle_request(envelope).await,
            EnvelopeKind::Response => {
                tracing::debug!(name = %envelope.name, "ignoring unsolicited response envelope");
            }
        }
    }

    async fn handshake(&self, payload: &Value) {
        let origin = payload
            .get("origin")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let page_nonce = payload
            .get("pageNonce")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if !is_origin_allowed(&origin, &self.allowed_origins, self.allow_file_origins) {
            tracing::warn!(%origin, "bridge handshake blocked");
            *self.write_state() = BridgeState::NotReady;
            if let Some(hook) = &self.on_origin_blocked {
                hook(origin.clone());
            }
            self.emit_event("ORIGIN_BLOCKED", json!({ "origin": origin }))
                .await;
            return;
        }

        tracing::debug!(%origin, "bridge handshake accepted");
        *self.write_state() = BridgeState::Ready {
            origin: origin.clone(),
            page_nonce: page_nonce.clone(),
        };

        let session_proof = self.session_proof(&origin, &page_nonce);
        let mut ready_payload = json!({
            "sdkCapabilities": ["bridge.v1", "attestation.stub"],
            "sessionProofJws": session_proof,
        });
        if let Some(signer) = &self.signer {
            ready_payload["signerKey"] =
                serde_json::to_value(signer.public_jwk()).unwrap_or(Value::Null);
        }
        self.emit_event("bridge_ready", ready_payload).await;
    }

    async fn handle_request(&self, envelope: InboundEnvelope) {
        let allowed = self
            .allowed_methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&envelope.name);
        if !allowed {
            tracing::warn!(method = %envelope.name, "request outside the step allow-list");
            self.emit_event("BRIDGE_FORBIDDEN", json!({ "method": envelope.name }))
                .await;
            return;
        }

        if let Some(plugin) = self.plugins.resolve(&envelope.name) {
            match plugin.handle(&envelope.name, envelope.payload.clone()).await {
                Ok(result) => {
                    self.send(EnvelopeKind::Response, envelope.name, envelope.id, result)
                        .await;
                }
                Err(error) => {
                    tracing::warn!(method = %envelope.name, %error, "plugin failed");
                    self.emit_event("BRIDGE_ERROR", json!({ "reason": error.to_string() }))
                        .await;
                }
            }
            return;
        }

        // No plugin claims the method: hand it to the state machine and
        // acknowledge receipt.
        (self.forward)(envelope.name.clone(), envelope.payload.clone());
        self.send(
            EnvelopeKind::Response,
            envelope.name,
            envelope.id,
            json!({ "ack": true }),
        )
        .await;
    }

    /// Emit an event envelope to the page.
    pub async fn emit_event(&self, name: &str, payload: Value) {
        self.send(EnvelopeKind::Event, name.to_string(), None, payload)
            .await;
    }

    async fn send(&self, kind: EnvelopeKind, name: String, id: Option<Value>, payload: Value) {
        let meta = EnvelopeMeta {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            nonce: Uuid::new_v4().to_string(),
            bridge_version: BRIDGE_VERSION.to_string(),
            sdk_version: SDK_VERSION.to_string(),
            traceparent: new_traceparent(),
        };

        let sig = self.signer.as_ref().and_then(|signer| {
            let meta_value = serde_json::to_value(&meta).unwrap_or(Value::Null);
            let claims = json!({ "name": name, "payload": payload, "meta": meta_value });
            match signer.sign_claims(&claims) {
                Ok(sig) => Some(sig),
                Err(error) => {
                    tracing::warn!(%error, "failed to sign outbound envelope");
                    None
                }
            }
        });

        let envelope = OutboundEnvelope {
            kind,
            name,
            id,
            payload,
            meta,
            sig,
        };
        self.sink.deliver(&envelope).await;
    }

    fn session_proof(&self, origin: &str, page_nonce: &str) -> Option<String> {
        let signer = self.signer.as_ref()?;
        let claims = json!({
            "correlationId": self.correlation_id.to_string(),
            "origin": origin,
            "pageNonce": page_nonce,
            "iat": Utc::now().timestamp(),
        });
        match signer.sign_claims(&claims) {
            Ok(proof) => Some(proof),
            Err(error) => {
                tracing::warn!(%error, "failed to sign session proof");
                None
            }
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, BridgeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, BridgeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
