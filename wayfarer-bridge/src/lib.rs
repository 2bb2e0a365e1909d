//! Wayfarer Bridge - Web Message Channel
//!
//! An origin-gated, per-step allow-listed, optionally signed message
//! channel between the hosted web surface and native code, with a
//! two-party handshake. Inbound traffic is gated until a `bridge_hello`
//! from an allow-listed origin completes; outbound envelopes carry trace
//! metadata and, when a signer is configured, an ES256 signature.

mod bridge;
mod envelope;
mod plugin;
mod sink;

pub use bridge::{Bridge, BridgeParams, EventForward};
pub use envelope::{EnvelopeKind, EnvelopeMeta, InboundEnvelope, OutboundEnvelope};
pub use plugin::{Plugin, PluginRegistry};
pub use sink::{CapturePageSink, PageSink};
