//! Wayfarer Manifest - Loader and Validator
//!
//! Fetches a journey manifest, verifies its detached ES256 signature
//! against the trust store, decodes it and enforces the document
//! invariants before anything else in the runtime touches it.

mod loader;
mod validate;

pub use loader::{ManifestLoader, PRODUCTION_MANIFEST_BASE};
pub use validate::validate_manifest;
