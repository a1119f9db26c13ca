//! Server executable discovery

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ProcessError, Result};

/// Locates the language server executable.
///
/// An explicit path is taken as-is when it exists; bare names are looked
/// up on `PATH` and then in a few conventional install locations.
pub struct ServerDiscovery;

impl ServerDiscovery {
    /// Resolve `executable` to a concrete path
    pub fn resolve(executable: &str) -> Result<PathBuf> {
        debug!(executable, "Resolving language server executable");

        let as_path = Path::new(executable);
        if as_path.components().count() > 1 || as_path.is_absolute() {
            if as_path.exists() {
                return Ok(as_path.to_path_buf());
            }
            warn!(executable, "Configured server path does not exist");
            return Err(ProcessError::ExecutableNotFound {
                executable: executable.to_string(),
            });
        }

        if let Ok(found) = which::which(executable) {
            debug!(path = %found.display(), "Found server on PATH");
            return Ok(found);
        }

        for candidate in Self::common_installation_paths(executable) {
            if candidate.exists() {
                debug!(path = %candidate.display(), "Found server in common location");
                return Ok(candidate);
            }
        }

        warn!(executable, "Language server executable not found");
        Err(ProcessError::ExecutableNotFound {
            executable: executable.to_string(),
        })
    }

    fn common_installation_paths(executable: &str) -> Vec<PathBuf> {
        let home = std::env::var("HOME").unwrap_or_default();
        let mut paths = Vec::new();

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from(format!("/opt/homebrew/opt/llvm/bin/{executable}")));
            paths.push(PathBuf::from(format!("/usr/local/opt/llvm/bin/{executable}")));
        }

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from(format!("/usr/lib/llvm/bin/{executable}")));
            paths.push(PathBuf::from(format!("/usr/local/bin/{executable}")));
        }

        if !home.is_empty() {
            paths.push(PathBuf::from(format!("{home}/.local/bin/{executable}")));
        }
        paths
    }
}
