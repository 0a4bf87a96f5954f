//! The provisioning state machine.
//!
//! One attempt moves through: PATH override, cached fast path, update check,
//! install, prune. Network-class failures degrade to a previously cached
//! install when one exists; only `AssetNotFound` and the no-cache case are
//! surfaced to the caller.

use crate::error::ProvisionError;
use crate::installer;
use crate::lookup::{PathLookup, SystemPathLookup};
use crate::platform::{self, ArchiveKind};
use crate::release::ReleaseFetcher;
use crate::state::StateStore;
use crate::types::ProvisioningConfig;
use crate::version;
use crate::UPSTREAM_REPO;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Managed installs live under `storage_root/iwe-{version}/`.
pub const VERSION_DIR_PREFIX: &str = "iwe-";

pub struct Provisioner {
    storage_root: PathBuf,
    config: ProvisioningConfig,
    store: StateStore,
    fetcher: ReleaseFetcher,
    path_lookup: Box<dyn PathLookup>,
    // Concurrent installs against the same destination are not safe;
    // one provisioning attempt runs at a time per storage root.
    attempt_guard: Mutex<()>,
}

impl Provisioner {
    pub fn new(storage_root: impl Into<PathBuf>, config: ProvisioningConfig) -> Self {
        let storage_root = storage_root.into();
        Self {
            store: StateStore::new(&storage_root),
            fetcher: ReleaseFetcher::new(UPSTREAM_REPO),
            path_lookup: Box::new(SystemPathLookup),
            attempt_guard: Mutex::new(()),
            storage_root,
            config,
        }
    }

    /// Replace the release fetcher, e.g. to point at a test registry.
    pub fn with_fetcher(mut self, fetcher: ReleaseFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the PATH lookup collaborator.
    pub fn with_path_lookup(mut self, lookup: Box<dyn PathLookup>) -> Self {
        self.path_lookup = lookup;
        self
    }

    /// Record the host application version, invalidating the cached install
    /// when it changed since the previous run.
    pub fn note_host_version(&self, host_version: &str) -> Result<(), ProvisionError> {
        self.store.invalidate_if_host_changed(host_version)
    }

    /// Ensure a usable server binary and return its path.
    pub async fn provision(&self) -> Result<PathBuf, ProvisionError> {
        let _attempt = self.attempt_guard.lock().await;
        self.run_attempt(false).await
    }

    /// Reset the check timer and cached install, then provision. Guarantees
    /// a network check and fresh install regardless of interval, even when a
    /// PATH binary would normally win.
    pub async fn force_update(&self) -> Result<PathBuf, ProvisionError> {
        let _attempt = self.attempt_guard.lock().await;

        let mut state = self.store.load()?;
        state.binary_path = None;
        state.installed_version = None;
        state.last_update_check = 0;
        self.store.save(&state)?;

        self.run_attempt(true).await
    }

    async fn run_attempt(&self, skip_path_lookup: bool) -> Result<PathBuf, ProvisionError> {
        let info = platform::get_system_info();
        let binary_name = platform::binary_file_name(&info.os);
        let mut state = self.store.load()?;

        // Developer override: a binary on PATH wins and skips the update
        // check entirely.
        if !skip_path_lookup {
            if let Some(path) = self.path_lookup.find(binary_name) {
                tracing::info!("Using {} from PATH: {}", binary_name, path.display());
                state.binary_path = Some(path.clone());
                state.installed_version = None;
                self.store.save(&state)?;
                return Ok(path);
            }
        }

        let cached = state.binary_path.clone().filter(|p| p.is_file());
        if cached.is_none() && state.binary_path.is_some() {
            tracing::warn!("Cached binary path no longer exists on disk; ignoring it");
        }

        let now = Utc::now().timestamp_millis();
        let interval_ms = self.config.update_check_interval_hours as i64 * 3_600_000;
        let check_due = self.config.auto_update && now - state.last_update_check > interval_ms;

        if let Some(path) = &cached {
            if !check_due {
                tracing::debug!("Update check not due; using cached binary {}", path.display());
                return Ok(path.clone());
            }
        }

        // The timestamp advances whether or not the fetch succeeds, so a
        // persistent outage does not turn every activation into a retry.
        state.last_update_check = now;
        self.store.save(&state)?;

        let release = match self.fetcher.fetch_latest().await {
            Ok(release) => release,
            Err(err) => {
                return match cached {
                    Some(path) => {
                        tracing::warn!(
                            "Update check failed ({}); falling back to cached binary {}",
                            err,
                            path.display()
                        );
                        Ok(path)
                    }
                    None => {
                        tracing::error!("Update check failed and no cached install exists: {}", err);
                        Err(ProvisionError::ProvisioningUnavailable)
                    }
                };
            }
        };

        let asset_name = platform::asset_name(&release.version, &info.os, &info.arch)?;
        // A release without a build for this platform is a registry gap and
        // is surfaced even when a cached binary exists.
        let asset = release
            .assets
            .iter()
            .find(|a| a.name == asset_name)
            .ok_or_else(|| ProvisionError::AssetNotFound(asset_name.clone()))?;

        let needs_update = match &state.installed_version {
            Some(installed) => version::is_newer(&release.version, installed),
            None => true,
        };

        if !needs_update {
            if let Some(path) = cached {
                tracing::debug!("Installed version {} is current", release.version);
                return Ok(path);
            }
        }

        tracing::info!("Installing {} {}...", binary_name, release.version);
        let version_dir = self
            .storage_root
            .join(format!("{}{}", VERSION_DIR_PREFIX, release.version));
        fs::create_dir_all(&version_dir)?;
        let dest = version_dir.join(binary_name);

        let kind = ArchiveKind::for_platform(&info.os);
        if let Err(err) = installer::install(&asset.download_url, &dest, kind, binary_name).await {
            // Don't leave an empty version directory behind
            if !dest.exists() {
                let _ = fs::remove_dir_all(&version_dir);
            }
            if let Some(path) = cached {
                if err.is_recoverable() {
                    tracing::warn!(
                        "Install of {} failed ({}); falling back to cached binary {}",
                        release.version,
                        err,
                        path.display()
                    );
                    return Ok(path);
                }
            }
            return Err(err);
        }

        let mut state = self.store.load()?;
        state.binary_path = Some(dest.clone());
        state.installed_version = Some(release.version.clone());
        state.installed_at = Some(Utc::now().to_rfc3339());
        self.store.save(&state)?;

        self.prune_old_versions(&version_dir)?;

        tracing::info!(
            "Successfully installed {} {} to {}",
            binary_name,
            release.version,
            dest.display()
        );
        Ok(dest)
    }

    /// Remove every version directory under the storage root except the one
    /// just installed. Failures here are logged, not fatal: the new install
    /// is already usable.
    fn prune_old_versions(&self, keep: &Path) -> Result<(), ProvisionError> {
        for entry in fs::read_dir(&self.storage_root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() || path == keep {
                continue;
            }
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(VERSION_DIR_PREFIX) {
                tracing::debug!("Pruning stale version directory {}", path.display());
                if let Err(err) = fs::remove_dir_all(&path) {
                    tracing::warn!("Failed to prune {}: {}", path.display(), err);
                }
            }
        }
        Ok(())
    }
}
