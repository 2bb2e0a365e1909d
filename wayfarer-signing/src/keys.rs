//! Trust store for manifest signing keys.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use wayfarer_core::SigningError;

/// Public half of a P-256 signing key, JWK style: base64url-encoded
/// curve point coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Es256PublicKey {
    pub x: String,
    pub y: String,
}

/// `kid`-indexed store of manifest verification keys.
///
/// Reads are concurrent, writes exclusive. Trust material is provisioned
/// at construction; `refresh_from_remote` is the extension point for a
/// future remote-refresh protocol and currently always refuses.
#[derive(Debug, Default)]
pub struct TrustStore {
    keys: RwLock<HashMap<String, Es256PublicKey>>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(keys: impl IntoIterator<Item = (String, Es256PublicKey)>) -> Self {
        Self {
            keys: RwLock::new(keys.into_iter().collect()),
        }
    }

    /// Add or replace a verification key.
    pub fn insert(&self, kid: impl Into<String>, key: Es256PublicKey) {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kid.into(), key);
    }

    /// Resolve a key by `kid`.
    pub fn resolve(&self, kid: &str) -> Option<Es256PublicKey> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kid)
            .cloned()
    }

    /// Stubbed extension point for remote trust refresh. No refresh
    /// protocol is specified for this version.
    pub fn refresh_from_remote(&self) -> Result<(), SigningError> {
        Err(SigningError::RefreshUnsupported)
    }
}
