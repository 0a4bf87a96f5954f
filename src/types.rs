use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One published upstream release: version tag plus downloadable assets.
///
/// Deserialized directly from the GitHub releases API payload; unrecognized
/// fields are ignored, but a missing `tag_name` or `assets` is a decode
/// failure rather than a partially populated descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    #[serde(rename = "tag_name")]
    pub version: String,
    pub assets: Vec<AssetRef>,
}

/// One downloadable file within a release, one per platform/architecture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetRef {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

/// The currently usable server executable, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledBinary {
    pub path: PathBuf,
    /// `None` when the binary was adopted from PATH rather than installed.
    pub version: Option<String>,
    pub installed_at: String,
}

/// Update policy supplied by the surrounding application. Never mutated by
/// the provisioning core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisioningConfig {
    #[serde(default = "default_auto_update")]
    pub auto_update: bool,
    #[serde(default = "default_check_interval_hours")]
    pub update_check_interval_hours: u64,
}

fn default_auto_update() -> bool {
    true
}
fn default_check_interval_hours() -> u64 {
    24
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            auto_update: default_auto_update(),
            update_check_interval_hours: default_check_interval_hours(),
        }
    }
}
