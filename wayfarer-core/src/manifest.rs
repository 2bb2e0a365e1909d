//! Manifest document model
//!
//! The manifest is the signed, versioned configuration document describing
//! a journey. It is deserialized once per journey and immutable thereafter.
//! Loading, signature verification and validation live in
//! `wayfarer-manifest`; this module is only the shape of the document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A signed journey manifest (`manifestVersion` 1.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Document version; must begin with "1.1".
    pub manifest_version: String,
    /// Minimum runtime version able to interpret this manifest.
    pub min_sdk: String,
    /// Identifier of the journey this manifest describes.
    pub journey_id: String,
    /// Location of the OpenAPI bundle (URL or file reference).
    pub oapi_bundle: String,
    /// Key into `steps` where the journey begins.
    pub start_step: String,
    /// Default headers applied to every API call.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Security posture for the hosted surface.
    pub security: SecurityPolicy,
    /// Which steps write resume snapshots; absent means all of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_policy: Option<ResumePolicy>,
    /// The journey's step graph.
    pub steps: HashMap<String, Step>,
    /// Detached JWS compact serialization (`header..signature`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Manifest {
    /// Look up a step by identifier.
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.get(step_id)
    }
}

/// Security section of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    /// Origins the web bridge accepts a handshake from. Must be non-empty.
    pub allowed_origins: Vec<String>,
    /// Whether the API client should treat TLS trust failures as pin failures.
    #[serde(default)]
    pub pinning: bool,
    /// Opaque attestation parameters; interpreted by attestation plugins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<HashMap<String, Value>>,
    /// Whether the hosted surface requires a sign-in before presentation.
    #[serde(default)]
    pub require_handshake: bool,
}

/// Resume snapshot policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePolicy {
    /// Step identifiers that write a snapshot on entry.
    pub snapshot_on: Vec<String>,
}

/// Kind of a journey step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Hosted web page presented in the embedded web view.
    Web,
    /// Native plugin invocation.
    Native,
    /// Server-side only; driven entirely by bindings.
    Server,
    /// Absorbing final state producing the journey result.
    Terminal,
}

/// One node of the journey state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Initial page to load, for `web` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Plugin method name, for `native` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    /// Arbitrary JSON parameters for the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// If present, a timer fires the synthetic `"timeout"` event this many
    /// milliseconds after step entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Declarative API bindings evaluated against inbound events, in order.
    #[serde(default)]
    pub bindings: Vec<Binding>,
    /// Transitions keyed by event name.
    #[serde(default)]
    pub on: HashMap<String, Transition>,
    /// Payload returned to the caller, for `terminal` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Bridge method names accepted while this step is current.
    #[serde(default)]
    pub bridge_allow: Vec<String>,
    /// `X-Idempotency-Key` applied to this step's bindings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl Step {
    pub fn is_terminal(&self) -> bool {
        self.step_type == StepType::Terminal
    }
}

/// Declarative rule attaching an API operation to an inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    /// Event name this binding reacts to.
    pub on_event: String,
    /// The operation to invoke.
    pub call: BindingCall,
    /// Event emitted to the page when the call succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success_emit: Option<String>,
    /// Event emitted to the page when the call fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error_emit: Option<String>,
}

/// The API-call half of a binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingCall {
    /// OpenAPI `operationId` to invoke.
    pub operation_id: String,
    /// Dotted path into the event payload supplying the request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args_from: Option<String>,
    /// Extra headers merged onto the request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Rule moving the state machine from one step to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    /// Target step identifier; absent means stay on the current step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Event emitted to the page when the transition fires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emit: Option<String>,
    /// Boolean guard expression; a false evaluation drops the transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard_expr: Option<String>,
}
