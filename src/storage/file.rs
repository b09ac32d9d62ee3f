//! File-backed auth state store.
//!
//! Keeps the state as a single JSON document. Every change rewrites the
//! whole document through a temporary file and a rename, so a crash never
//! leaves a half-written state behind.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

use super::{AuthStore, PersistedAuthState};

/// Store that persists the auth state to a JSON file.
///
/// Reads are served from an in-memory copy; writes go through to disk
/// while holding the internal lock.
pub struct FileStore {
    state: Mutex<PersistedAuthState>,
    path: PathBuf,
}

impl FileStore {
    /// Open the store at `path`, loading existing state if the file exists.
    ///
    /// Creates the parent directory if it doesn't exist. A corrupt state
    /// file is discarded with a warning, which forces re-provisioning.
    pub fn open(path: &Path) -> ClientResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(path = %parent.display(), "Creating auth state directory");
                fs::create_dir_all(parent)?;
            }
        }

        let state = if path.exists() {
            let content = fs::read(path)?;
            match serde_json::from_slice(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding unreadable auth state");
                    PersistedAuthState::default()
                }
            }
        } else {
            PersistedAuthState::default()
        };

        debug!(path = %path.display(), "Auth state store opened");

        Ok(Self {
            state: Mutex::new(state),
            path: path.to_path_buf(),
        })
    }

    /// Get the path to the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> PersistedAuthState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn update(&self, apply: impl FnOnce(&mut PersistedAuthState)) -> ClientResult<()> {
        let mut state = self.state.lock().map_err(|e| ClientError::Storage {
            message: format!("Failed to acquire auth state lock: {}", e),
        })?;

        let mut next = state.clone();
        apply(&mut next);
        self.write(&next)?;
        *state = next;
        Ok(())
    }

    fn write(&self, state: &PersistedAuthState) -> ClientResult<()> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp_path = self.path.with_extension("tmp");

        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&tmp_path).map_err(|e| ClientError::Storage {
            message: format!("Failed to open {}: {}", tmp_path.display(), e),
        })?;
        file.write_all(&json)?;
        if let Err(e) = file.sync_data() {
            warn!(error = %e, "Failed to sync auth state");
        }

        fs::rename(&tmp_path, &self.path).map_err(|e| ClientError::Storage {
            message: format!(
                "Failed to replace {} with {}: {}",
                self.path.display(),
                tmp_path.display(),
                e
            ),
        })
    }
}

impl AuthStore for FileStore {
    fn token(&self) -> Option<String> {
        self.snapshot().device_token
    }

    fn set_token(&self, token: Option<String>) -> ClientResult<()> {
        self.update(|s| s.device_token = token)
    }

    fn clock_offset(&self) -> f64 {
        self.snapshot().clock_offset_seconds
    }

    fn set_clock_offset(&self, offset_seconds: f64) -> ClientResult<()> {
        self.update(|s| s.clock_offset_seconds = offset_seconds)
    }

    fn descriptor_hash(&self) -> Option<String> {
        self.snapshot().last_synced_descriptor_hash
    }

    fn set_descriptor_hash(&self, hash: Option<String>) -> ClientResult<()> {
        self.update(|s| s.last_synced_descriptor_hash = hash)
    }
}
