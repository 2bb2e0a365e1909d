//! Wayfarer API - OpenAPI Resolver and API Client
//!
//! Maps manifest-referenced operation identifiers to HTTP requests and
//! executes them with retry/backoff, idempotency keys, trace context and
//! the fixed status-to-error-code mapping. The HTTP stack sits behind the
//! `HttpTransport` trait so journeys are testable against a scripted
//! transport.

mod client;
mod request;
mod resolver;
mod transport;

pub use client::{ApiClient, ApiResponse};
pub use request::{build_request, ApiRequest};
pub use resolver::{Operation, OpenApiResolver};
pub use transport::{
    HttpTransport, RawResponse, ReqwestTransport, ScriptedTransport, TransportError,
};
