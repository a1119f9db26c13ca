//! Extension settings and configuration change events

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ClientError, Result};

/// Prefix shared by every setting this extension reads
pub const SETTINGS_PREFIX: &str = "polyclang.";

/// Per-folder setting selecting which mechanism owns C/C++ files
pub const OWNERSHIP_SETTING: &str = "polyclang.folderOwnership";

/// Global extension settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtensionSettings {
    /// Server executable name or path
    pub path: String,
    /// Extra server arguments
    pub arguments: Vec<String>,
    /// Flags used when a file has no compile command
    pub fallback_flags: Vec<String>,
    /// Where the server should write its trace, if anywhere
    pub trace: Option<PathBuf>,
    /// Advertise semantic tokens support
    pub semantic_highlighting: bool,
    /// Keep the server's completion order instead of the editor's
    pub server_completion_ranking: bool,
    /// Warn about extensions that fight over C/C++ files
    pub detect_extension_conflicts: bool,
    /// How often a restart checks for a client to restart
    pub restart_poll_interval_ms: u64,
    /// How long a restart waits for readiness before giving up
    pub ready_timeout_ms: u64,
    /// Per-request timeout
    pub request_timeout_ms: u64,
    /// Log level for [`crate::logging::init_logging`]
    pub log_level: String,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            path: "clangd".to_string(),
            arguments: Vec::new(),
            fallback_flags: Vec::new(),
            trace: None,
            semantic_highlighting: true,
            server_completion_ranking: true,
            detect_extension_conflicts: true,
            restart_poll_interval_ms: 500,
            ready_timeout_ms: 30_000,
            request_timeout_ms: 10_000,
            log_level: "info".to_string(),
        }
    }
}

impl ExtensionSettings {
    pub fn restart_poll_interval(&self) -> Duration {
        Duration::from_millis(self.restart_poll_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Loads [`ExtensionSettings`] from YAML (or JSON) documents
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load settings from a file
    pub fn load_from_file(path: &Path) -> Result<ExtensionSettings> {
        debug!("Loading polyclang settings from: {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::ConfigError(format!("Failed to read settings file: {}", e))
        })?;

        Self::load_from_str(&content)
    }

    /// Load settings from a string; missing keys take their defaults
    pub fn load_from_str(content: &str) -> Result<ExtensionSettings> {
        let settings: ExtensionSettings = serde_yaml::from_str(content)
            .map_err(|e| ClientError::ConfigError(format!("Failed to parse settings: {}", e)))?;

        Self::validate(&settings)?;
        info!(server = %settings.path, "Loaded polyclang settings");
        Ok(settings)
    }

    fn validate(settings: &ExtensionSettings) -> Result<()> {
        if settings.path.trim().is_empty() {
            return Err(ClientError::ConfigError(
                "Server path must not be empty".to_string(),
            ));
        }
        if settings.restart_poll_interval_ms == 0 {
            return Err(ClientError::ConfigError(
                "restartPollIntervalMs must be greater than 0".to_string(),
            ));
        }
        if settings.ready_timeout_ms < settings.restart_poll_interval_ms {
            return Err(ClientError::ConfigError(format!(
                "readyTimeoutMs ({}) is shorter than restartPollIntervalMs ({})",
                settings.ready_timeout_ms, settings.restart_poll_interval_ms
            )));
        }
        if settings.request_timeout_ms == 0 {
            return Err(ClientError::ConfigError(
                "requestTimeoutMs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings keys reported changed by the editor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigChange {
    keys: BTreeSet<String>,
}

impl ConfigChange {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// The per-folder ownership setting changed
    pub fn affects_folder_ownership(&self) -> bool {
        self.keys.contains(OWNERSHIP_SETTING)
    }

    /// Some global extension setting changed
    pub fn affects_extension(&self) -> bool {
        self.keys
            .iter()
            .any(|key| key.starts_with(SETTINGS_PREFIX) && key != OWNERSHIP_SETTING)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}
