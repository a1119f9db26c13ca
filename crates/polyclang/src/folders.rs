//! Outermost workspace folder resolution

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::host::EditorHost;
use crate::types::WorkspaceFolder;

/// Maps a folder to the outermost configured workspace folder enclosing it.
///
/// Folder URIs are cached sorted ascending by length; the first one that
/// prefixes the input wins, which makes the shortest enclosing folder the
/// answer. The cache must be invalidated whenever the folder set changes.
pub struct WorkspaceFolderResolver {
    host: Arc<dyn EditorHost>,
    sorted: Mutex<Option<Vec<WorkspaceFolder>>>,
}

impl WorkspaceFolderResolver {
    pub fn new(host: Arc<dyn EditorHost>) -> Self {
        Self {
            host,
            sorted: Mutex::new(None),
        }
    }

    /// Outermost folder enclosing `folder`; `folder` itself when none does
    pub fn outermost(&self, folder: &WorkspaceFolder) -> WorkspaceFolder {
        let mut cache = self.sorted.lock();
        let sorted = cache.get_or_insert_with(|| {
            let mut folders = self.host.workspace_folders();
            folders.sort_by_key(|f| f.uri.as_str().len());
            folders
        });

        let found = sorted
            .iter()
            .find(|candidate| candidate.uri.contains(&folder.uri))
            .cloned()
            .unwrap_or_else(|| folder.clone());

        trace!(folder = %folder.uri, outermost = %found.uri, "Resolved outermost folder");
        found
    }

    /// Drop the cached folder list
    pub fn invalidate(&self) {
        *self.sorted.lock() = None;
    }
}
