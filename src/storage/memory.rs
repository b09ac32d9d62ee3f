//! In-memory auth state store.

use std::sync::Mutex;

use crate::error::ClientResult;

use super::{AuthStore, PersistedAuthState};

/// Thread-safe store that keeps the auth state for the process lifetime only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<PersistedAuthState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given state.
    pub fn with_state(state: PersistedAuthState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> PersistedAuthState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn update(&self, apply: impl FnOnce(&mut PersistedAuthState)) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        apply(&mut state);
    }
}

impl AuthStore for MemoryStore {
    fn token(&self) -> Option<String> {
        self.snapshot().device_token
    }

    fn set_token(&self, token: Option<String>) -> ClientResult<()> {
        self.update(|s| s.device_token = token);
        Ok(())
    }

    fn clock_offset(&self) -> f64 {
        self.snapshot().clock_offset_seconds
    }

    fn set_clock_offset(&self, offset_seconds: f64) -> ClientResult<()> {
        self.update(|s| s.clock_offset_seconds = offset_seconds);
        Ok(())
    }

    fn descriptor_hash(&self) -> Option<String> {
        self.snapshot().last_synced_descriptor_hash
    }

    fn set_descriptor_hash(&self, hash: Option<String>) -> ClientResult<()> {
        self.update(|s| s.last_synced_descriptor_hash = hash);
        Ok(())
    }
}
