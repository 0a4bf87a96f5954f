use crate::error::ProvisionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
}

pub fn get_system_info() -> PlatformInfo {
    PlatformInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
    }
}

/// Archive format of an upstream release asset, selected once per platform
/// rather than re-derived at each call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    /// Upstream ships zip for Windows and tar.gz for every POSIX target.
    pub fn for_platform(os: &str) -> Self {
        if os == "windows" {
            ArchiveKind::Zip
        } else {
            ArchiveKind::TarGz
        }
    }

    /// Scratch file name the downloaded archive is persisted under.
    pub fn archive_file_name(&self) -> &'static str {
        match self {
            ArchiveKind::TarGz => "release.tar.gz",
            ArchiveKind::Zip => "release.zip",
        }
    }
}

/// File name of the server binary on the given platform.
pub fn binary_file_name(os: &str) -> &'static str {
    if os == "windows" {
        "iwes.exe"
    } else {
        "iwes"
    }
}

/// Maps (version tag, OS, architecture) to the exact asset file name the
/// upstream release publishes. Pure; fails for any platform without a
/// published build.
pub fn asset_name(version: &str, os: &str, arch: &str) -> Result<String, ProvisionError> {
    match os {
        "linux" => {
            if arch == "aarch64" || arch == "arm64" {
                Ok(format!("{}-aarch64-unknown-linux-gnu.tar.gz", version))
            } else {
                Ok(format!("{}-x86_64-unknown-linux-gnu.tar.gz", version))
            }
        }
        // std::env::consts::OS reports "macos"; the platform is historically
        // called darwin in asset names.
        "macos" | "darwin" => Ok(format!("{}-universal-apple-darwin.tar.gz", version)),
        "windows" => Ok(format!("{}-x86_64-pc-windows-msvc.zip", version)),
        _ => Err(ProvisionError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}
