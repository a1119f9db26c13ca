//! Core data structures shared by routing and supervision

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Language tags a server-client is launched for
pub const SUPPORTED_LANGUAGES: [&str; 5] = ["c", "cpp", "cuda-cpp", "objective-c", "objective-cpp"];

/// Language tags whose routing rules are managed through roots
pub const MANAGED_LANGUAGES: [&str; 2] = ["c", "cpp"];

/// Document schemes the router accepts
pub const SUPPORTED_SCHEMES: [&str; 2] = ["file", "untitled"];

/// Scheme used for every rule generated from a root or folder
pub const FILE_SCHEME: &str = "file";

/// A folder URI normalised to end with exactly one `/`.
///
/// Equality and hashing are by the normalised string, so two folder
/// objects describing the same directory always map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FolderUri(String);

impl FolderUri {
    /// Normalise `uri` into a folder key
    pub fn new(uri: impl AsRef<str>) -> Self {
        let uri = uri.as_ref();
        let trimmed = uri.trim_end_matches('/');
        if trimmed.ends_with(':') {
            // scheme root such as `file:///`
            return Self(format!("{trimmed}///"));
        }
        Self(format!("{trimmed}/"))
    }

    /// Build a `file://` folder URI from a filesystem path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match url::Url::from_directory_path(path) {
            Ok(url) => Self::new(url.as_str()),
            Err(()) => Self::new(format!("file://{}", path.display())),
        }
    }

    /// The normalised URI string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `other` is this folder or lies beneath it
    pub fn contains(&self, other: &FolderUri) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Filesystem path for `file://` URIs; other schemes yield the raw string
    pub fn to_file_path(&self) -> PathBuf {
        url::Url::parse(&self.0)
            .ok()
            .filter(|url| url.scheme() == FILE_SCHEME)
            .and_then(|url| url.to_file_path().ok())
            .unwrap_or_else(|| PathBuf::from(&self.0))
    }
}

impl fmt::Display for FolderUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FolderUri {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for FolderUri {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<FolderUri> for String {
    fn from(value: FolderUri) -> Self {
        value.0
    }
}

/// A top-level project directory known to the editor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceFolder {
    /// Normalised folder URI
    pub uri: FolderUri,
    /// Display name
    pub name: String,
}

impl WorkspaceFolder {
    /// Create a folder; the name defaults to the last path segment
    pub fn new(uri: impl Into<FolderUri>) -> Self {
        let uri = uri.into();
        let name = uri
            .as_str()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self { uri, name }
    }

    /// Override the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl PartialEq for WorkspaceFolder {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for WorkspaceFolder {}

impl std::hash::Hash for WorkspaceFolder {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
    }
}

/// An open editor document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Document URI (`file:///...`, `untitled:...`)
    pub uri: String,
    /// Editor language id
    pub language_id: String,
}

impl DocumentInfo {
    pub fn new(uri: impl Into<String>, language_id: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            language_id: language_id.into(),
        }
    }

    /// URI scheme, empty when the URI has none
    pub fn scheme(&self) -> &str {
        self.uri.split_once(':').map(|(scheme, _)| scheme).unwrap_or("")
    }

    /// Whether the router should consider this document at all
    pub fn is_routable(&self) -> bool {
        SUPPORTED_SCHEMES.contains(&self.scheme())
            && SUPPORTED_LANGUAGES.contains(&self.language_id.as_str())
    }
}

/// One document-selection rule: documents matching all three fields are
/// routed to the client the rule belongs to.
///
/// Serialises as an LSP `DocumentFilter`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingRule {
    pub scheme: String,
    pub language: String,
    pub pattern: String,
}

impl RoutingRule {
    pub fn new(
        scheme: impl Into<String>,
        language: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            language: language.into(),
            pattern: pattern.into(),
        }
    }

    /// Whether this rule carries one of the root-managed language tags
    pub fn is_managed(&self) -> bool {
        self.scheme == FILE_SCHEME && MANAGED_LANGUAGES.contains(&self.language.as_str())
    }
}

/// Lifecycle state of a server-client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not started, or stopped
    Stopped,
    /// Launch in progress
    Starting,
    /// Initialized and serving requests
    Running,
    /// Stop in progress
    ShuttingDown,
    /// Connection dropped without a stop request
    Crashed,
}

/// Per-folder setting selecting which client mechanism owns C/C++ files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OwnershipMode {
    /// Any client may own the folder
    Any,
    /// Owned when a compilation database is in use
    Compile,
    /// Any other value: this mechanism does not own the folder
    Other(String),
}

impl OwnershipMode {
    /// Whether polyclang should run a client for a folder in this mode
    pub fn permits_client(&self) -> bool {
        matches!(self, OwnershipMode::Any | OwnershipMode::Compile)
    }
}

impl Default for OwnershipMode {
    fn default() -> Self {
        OwnershipMode::Any
    }
}

impl From<String> for OwnershipMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "any" => OwnershipMode::Any,
            "compile" => OwnershipMode::Compile,
            _ => OwnershipMode::Other(value),
        }
    }
}

impl From<&str> for OwnershipMode {
    fn from(value: &str) -> Self {
        OwnershipMode::from(value.to_string())
    }
}

impl From<OwnershipMode> for String {
    fn from(value: OwnershipMode) -> Self {
        match value {
            OwnershipMode::Any => "any".to_string(),
            OwnershipMode::Compile => "compile".to_string(),
            OwnershipMode::Other(other) => other,
        }
    }
}
