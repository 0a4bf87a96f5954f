//! Failure taxonomy for the provisioning lifecycle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("failed to fetch release metadata: {0}")]
    MetadataUnavailable(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("server returned status code {0}")]
    UnexpectedStatus(u16),

    #[error("redirect response missing Location header")]
    RedirectMissingLocation,

    #[error("failed to extract archive: {0}")]
    ArchiveExtractionFailed(String),

    #[error("binary '{0}' not found in archive")]
    BinaryNotFoundInArchive(String),

    #[error("no release asset published for this platform: {0}")]
    AssetNotFound(String),

    #[error("no usable binary: update check failed and no cached install exists")]
    ProvisioningUnavailable,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to persist provisioning state: {0}")]
    State(String),
}

impl ProvisionError {
    /// Network/transport-class failures that a previously cached install can
    /// cover. `AssetNotFound` is deliberately excluded: a missing platform
    /// build is surfaced even when a cache exists.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProvisionError::MetadataUnavailable(_)
                | ProvisionError::DownloadFailed(_)
                | ProvisionError::UnexpectedStatus(_)
                | ProvisionError::RedirectMissingLocation
                | ProvisionError::ArchiveExtractionFailed(_)
                | ProvisionError::BinaryNotFoundInArchive(_)
        )
    }
}
