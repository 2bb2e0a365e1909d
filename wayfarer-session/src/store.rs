//! Snapshot store abstraction.

use keyring::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// Key-value slot contract for snapshot persistence.
///
/// Implementations report success as a boolean rather than erroring: a
/// failed snapshot write degrades resume, it never fails a journey.
pub trait SnapshotStore: Send + Sync + fmt::Debug {
    fn set(&self, data: &[u8], service: &str, account: &str) -> bool;
    fn get(&self, service: &str, account: &str) -> Option<Vec<u8>>;
    fn delete(&self, service: &str, account: &str) -> bool;
}

// ============================================================================
// PLATFORM SECURE STORE
// ============================================================================

/// Platform keychain/keyring backed store. Data is only readable after
/// first unlock on the device that wrote it.
#[derive(Debug, Default)]
pub struct KeyringSnapshotStore;

impl KeyringSnapshotStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, account: &str) -> Option<Entry> {
        match Entry::new(service, account) {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(%error, service, account, "secure store entry unavailable");
                None
            }
        }
    }
}

impl SnapshotStore for KeyringSnapshotStore {
    fn set(&self, data: &[u8], service: &str, account: &str) -> bool {
        let Ok(text) = std::str::from_utf8(data) else {
            return false;
        };
        let Some(entry) = Self::entry(service, account) else {
            return false;
        };
        match entry.set_password(text) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, service, "secure store write failed");
                false
            }
        }
    }

    fn get(&self, service: &str, account: &str) -> Option<Vec<u8>> {
        let entry = Self::entry(service, account)?;
        match entry.get_password() {
            Ok(value) => Some(value.into_bytes()),
            Err(keyring::Error::NoEntry) => None,
            Err(error) => {
                tracing::warn!(%error, service, "secure store read failed");
                None
            }
        }
    }

    fn delete(&self, service: &str, account: &str) -> bool {
        let Some(entry) = Self::entry(service, account) else {
            return false;
        };
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => true,
            Err(error) => {
                tracing::warn!(%error, service, "secure store delete failed");
                false
            }
        }
    }
}

// ============================================================================
// IN-MEMORY STORE (for tests)
// ============================================================================

/// In-memory store for tests and headless environments.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slots: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn set(&self, data: &[u8], service: &str, account: &str) -> bool {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((service.to_string(), account.to_string()), data.to_vec());
        true
    }

    fn get(&self, service: &str, account: &str) -> Option<Vec<u8>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(service.to_string(), account.to_string()))
            .cloned()
    }

    fn delete(&self, service: &str, account: &str) -> bool {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(service.to_string(), account.to_string()));
        true
    }
}
