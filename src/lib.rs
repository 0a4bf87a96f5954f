//! Provisioning and version lifecycle management for the IWE language
//! server binary.
//!
//! The entry point is [`provision::Provisioner`], which decides whether an
//! already-installed `iwes` binary is usable, checks the upstream GitHub
//! releases for a newer version, downloads and unpacks the platform archive
//! atomically, and prunes superseded installs. Network failures degrade to a
//! previously cached install when one exists.

pub mod cli;
pub mod error;
pub mod installer;
pub mod lookup;
pub mod platform;
pub mod provision;
pub mod release;
pub mod state;
pub mod types;
pub mod version;

pub use error::ProvisionError;
pub use provision::Provisioner;
pub use types::ProvisioningConfig;

/// Name of the language server binary, without platform suffix.
pub const SERVER_BINARY: &str = "iwes";

/// GitHub repository that publishes server releases.
pub const UPSTREAM_REPO: &str = "iwe-org/iwe";
