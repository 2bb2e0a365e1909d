//! Wayfarer Core - Data Model
//!
//! Pure data structures with no behavior beyond validation. All other
//! crates depend on this. Loading, signing, interpretation and IO live
//! in the sibling crates.

mod config;
mod error;
mod identity;
mod manifest;
mod origin;
mod result;
mod trace;

// Re-export configuration types
pub use config::*;

// Re-export error types
pub use error::*;

// Re-export identity types
pub use identity::*;

// Re-export manifest document types
pub use manifest::*;

// Re-export the origin allow-list check
pub use origin::is_origin_allowed;

// Re-export journey result types
pub use result::*;

// Re-export trace context helpers
pub use trace::new_traceparent;

/// Version of the runtime, compared against a manifest's `minSdk`.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire version of the bridge protocol, carried in every outbound envelope.
pub const BRIDGE_VERSION: &str = "1.1";

/// Manifest document versions this runtime accepts must begin with this.
pub const MANIFEST_VERSION_PREFIX: &str = "1.1";
