//! The editor seen from the orchestration layer
//!
//! Everything polyclang needs from the host editor goes through
//! [`EditorHost`]: the folder list, open documents, per-folder settings
//! and the two ways of talking to the user.

use async_trait::async_trait;

use crate::config::ExtensionSettings;
use crate::types::{DocumentInfo, OwnershipMode, WorkspaceFolder};

#[async_trait]
pub trait EditorHost: Send + Sync {
    /// All configured workspace folders
    fn workspace_folders(&self) -> Vec<WorkspaceFolder>;

    /// Documents currently open in the editor
    fn open_documents(&self) -> Vec<DocumentInfo>;

    /// Ownership setting for a folder
    fn ownership_mode(&self, folder: &WorkspaceFolder) -> OwnershipMode;

    /// Current extension settings; None keeps whatever is loaded
    fn extension_settings(&self) -> Option<ExtensionSettings> {
        None
    }

    /// Identifiers of installed editor extensions
    fn installed_extensions(&self) -> Vec<String> {
        Vec::new()
    }

    /// The innermost workspace folder containing `document_uri`
    fn workspace_folder_of(&self, document_uri: &str) -> Option<WorkspaceFolder> {
        self.workspace_folders()
            .into_iter()
            .filter(|folder| document_uri.starts_with(folder.uri.as_str()))
            .max_by_key(|folder| folder.uri.as_str().len())
    }

    /// Show an error the user has to see
    async fn show_error(&self, message: &str);

    /// Show a warning with optional actions; returns the chosen action
    async fn show_warning(&self, message: &str, actions: &[&str]) -> Option<String>;
}
