//! Wayfarer Signing - Detached JWS and Trust Material
//!
//! Everything cryptographic in the runtime lives here:
//! - canonical JSON (the payload form both signer and verifier must agree on)
//! - detached JWS parsing and ES256 verification for manifest signatures
//! - the `kid`-indexed trust store with its stubbed refresh extension point
//! - the envelope signer producing bridge signatures and session proofs

mod canonical;
mod jws;
mod keys;
mod signer;

pub use canonical::canonical_json;
pub use jws::{verify_compact, verify_detached, DetachedJws, JwsHeader};
pub use keys::{Es256PublicKey, TrustStore};
pub use signer::EnvelopeSigner;
