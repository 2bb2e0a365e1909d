//! Wayfarer Session - Identity and Resume Snapshots
//!
//! Maintains the correlation and idempotency identity of a session and
//! persists PII-free resume snapshots in a platform-protected key-value
//! store. Exactly one snapshot slot exists per process identity.

mod session;
mod store;

pub use session::{SessionManager, Snapshot, SNAPSHOT_ACCOUNT, SNAPSHOT_SERVICE};
pub use store::{KeyringSnapshotStore, MemorySnapshotStore, SnapshotStore};
