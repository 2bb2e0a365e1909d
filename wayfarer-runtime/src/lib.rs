//! Wayfarer Runtime - Orchestration
//!
//! The composition glue that wires a manifest-load into a running
//! journey: loader, resolver, API client, state machine, bridge and
//! session, plus the collaborator seams the embedding application
//! implements (web view host, telemetry sink, plugins, sign-in).

mod collaborators;
mod events;
mod runtime;

pub use collaborators::{
    EventSink, NullEventSink, ScriptPageSink, SignInError, SignInProvider, TracingEventSink,
    WebViewHost, DEFAULT_BRIDGE_NAME,
};
pub use events::EventEmitter;
pub use runtime::JourneyRuntime;

// The surface a partner application needs, re-exported from the
// subsystem crates.
pub use wayfarer_bridge::{Bridge, InboundEnvelope, OutboundEnvelope, Plugin, PluginRegistry};
pub use wayfarer_core::{
    Environment, ErrorCode, FeatureFlags, JourneyResult, RuntimeConfig, WayfarerError,
    WayfarerResult,
};
pub use wayfarer_session::{KeyringSnapshotStore, MemorySnapshotStore, SessionManager};
pub use wayfarer_signing::{EnvelopeSigner, Es256PublicKey, TrustStore};
