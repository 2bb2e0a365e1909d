//! Bridge message envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message kind discriminator shared by both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Event,
    Request,
    Response,
}

/// Message from the page to native code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    pub kind: EnvelopeKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub payload: Value,
}

impl InboundEnvelope {
    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: EnvelopeKind::Event,
            name: name.into(),
            id: None,
            payload,
        }
    }

    pub fn request(name: impl Into<String>, id: Value, payload: Value) -> Self {
        Self {
            kind: EnvelopeKind::Request,
            name: name.into(),
            id: Some(id),
            payload,
        }
    }
}

/// Trace metadata stamped onto every outbound envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMeta {
    /// ISO-8601 timestamp.
    pub ts: String,
    /// Fresh UUID per envelope.
    pub nonce: String,
    pub bridge_version: String,
    pub sdk_version: String,
    pub traceparent: String,
}

/// Message from native code to the page. `sig` is present iff a signer is
/// configured: an ES256 JWS over the canonical JSON of
/// `{ name, payload, meta }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope {
    pub kind: EnvelopeKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub payload: Value,
    pub meta: EnvelopeMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}
