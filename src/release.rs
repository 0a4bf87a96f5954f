//! GitHub releases API interaction.
//!
//! Fetches the latest published release descriptor for the upstream server
//! repository. A fresh descriptor is fetched per check; nothing here caches.

use crate::error::ProvisionError;
use crate::types::ReleaseDescriptor;

pub const GITHUB_API_BASE: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("iwe-provision/", env!("CARGO_PKG_VERSION"));

pub struct ReleaseFetcher {
    client: reqwest::Client,
    api_base: String,
    repo: String,
}

impl ReleaseFetcher {
    /// Fetcher against the real GitHub API for the given `owner/repo`.
    pub fn new(repo: &str) -> Self {
        Self::with_api_base(repo, GITHUB_API_BASE)
    }

    /// Fetcher against an alternate registry host, used by tests.
    pub fn with_api_base(repo: &str, api_base: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
        }
    }

    /// Fetch the latest published release. Any transport error, non-2xx
    /// status, or malformed payload fails as `MetadataUnavailable`.
    pub async fn fetch_latest(&self) -> Result<ReleaseDescriptor, ProvisionError> {
        let url = format!("{}/repos/{}/releases/latest", self.api_base, self.repo);
        tracing::debug!("Fetching latest release info from: {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| ProvisionError::MetadataUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProvisionError::MetadataUnavailable(format!(
                "registry returned status {} for {}",
                response.status(),
                self.repo
            )));
        }

        let release: ReleaseDescriptor = response
            .json()
            .await
            .map_err(|e| ProvisionError::MetadataUnavailable(format!("malformed release payload: {}", e)))?;

        tracing::debug!(
            "Latest release: {} ({} assets)",
            release.version,
            release.assets.len()
        );
        Ok(release)
    }
}
