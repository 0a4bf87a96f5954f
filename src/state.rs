//! Persisted provisioning state.
//!
//! A small typed record with explicit defaults for each field, stored as
//! JSON under the storage root. Loose key/value reads would let an absent
//! timestamp decay into undefined-as-zero semantics; the typed record makes
//! the defaults visible instead.

use crate::error::ProvisionError;
use crate::types::InstalledBinary;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_FILE_NAME: &str = "state.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProvisionState {
    /// Absolute path of the usable server binary. Stale (and ignored) if the
    /// file no longer exists on disk.
    #[serde(default)]
    pub binary_path: Option<PathBuf>,
    /// Version tag of the managed install; `None` for a PATH-adopted binary.
    #[serde(default)]
    pub installed_version: Option<String>,
    /// Epoch milliseconds of the last registry check. 0 means never checked;
    /// only advances forward except on explicit invalidation.
    #[serde(default)]
    pub last_update_check: i64,
    /// Host application version observed on the previous run.
    #[serde(default)]
    pub last_host_version: Option<String>,
    /// RFC 3339 time of the last successful install.
    #[serde(default)]
    pub installed_at: Option<String>,
}

impl ProvisionState {
    pub fn installed_binary(&self) -> Option<InstalledBinary> {
        let path = self.binary_path.clone()?;
        Some(InstalledBinary {
            path,
            version: self.installed_version.clone(),
            installed_at: self.installed_at.clone().unwrap_or_default(),
        })
    }
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(storage_root: &Path) -> Self {
        Self {
            path: storage_root.join(STATE_FILE_NAME),
        }
    }

    /// Load the persisted state, falling back to defaults when the file is
    /// absent or unreadable. The state is a cache; a corrupt file costs one
    /// re-check, not a failed activation.
    pub fn load(&self) -> Result<ProvisionState, ProvisionError> {
        if !self.path.exists() {
            return Ok(ProvisionState::default());
        }

        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&content) {
            Ok(state) => Ok(state),
            Err(err) => {
                tracing::warn!(
                    "Discarding unreadable state file {}: {}",
                    self.path.display(),
                    err
                );
                Ok(ProvisionState::default())
            }
        }
    }

    pub fn save(&self, state: &ProvisionState) -> Result<(), ProvisionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| ProvisionError::State(e.to_string()))?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Invalidate cached path/version and reset the check timer when the
    /// host application version changed since the last run.
    pub fn invalidate_if_host_changed(&self, host_version: &str) -> Result<(), ProvisionError> {
        let mut state = self.load()?;
        if state.last_host_version.as_deref() == Some(host_version) {
            return Ok(());
        }

        tracing::debug!(
            "Host version changed ({:?} -> {}); invalidating cached install",
            state.last_host_version,
            host_version
        );
        state.binary_path = None;
        state.installed_version = None;
        state.last_update_check = 0;
        state.last_host_version = Some(host_version.to_string());
        self.save(&state)
    }
}
