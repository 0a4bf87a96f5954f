//! PATH lookup collaborator.
//!
//! A binary already on the user's PATH is a developer override: it always
//! wins over managed installs and skips the update check entirely.

use std::path::PathBuf;

pub trait PathLookup: Send + Sync {
    /// Absolute path of `binary` when present on PATH. A miss is `None`,
    /// never an error.
    fn find(&self, binary: &str) -> Option<PathBuf>;
}

/// Scans the `PATH` environment variable.
pub struct SystemPathLookup;

impl PathLookup for SystemPathLookup {
    fn find(&self, binary: &str) -> Option<PathBuf> {
        let path_var = std::env::var_os("PATH")?;
        for dir in std::env::split_paths(&path_var) {
            if dir.as_os_str().is_empty() {
                continue;
            }
            let candidate = dir.join(binary);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}
