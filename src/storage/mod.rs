//! Persisted authentication state.
//!
//! Three fields survive process restarts: the device token, the clock
//! offset, and the fingerprint of the last descriptor the server accepted.
//! Only the device identity and clock tracker write them.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::ClientResult;

/// Storage capability for the persisted auth state.
///
/// Each getter/setter is individually atomic; callers provide any
/// read-then-write exclusion they need.
pub trait AuthStore: Send + Sync {
    fn token(&self) -> Option<String>;

    fn set_token(&self, token: Option<String>) -> ClientResult<()>;

    /// Clock offset in seconds; `0.0` when never set.
    fn clock_offset(&self) -> f64;

    fn set_clock_offset(&self, offset_seconds: f64) -> ClientResult<()>;

    fn descriptor_hash(&self) -> Option<String>;

    fn set_descriptor_hash(&self, hash: Option<String>) -> ClientResult<()>;
}

/// Snapshot of every persisted field.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistedAuthState {
    #[serde(default)]
    pub device_token: Option<String>,
    #[serde(default)]
    pub clock_offset_seconds: f64,
    #[serde(default)]
    pub last_synced_descriptor_hash: Option<String>,
}
