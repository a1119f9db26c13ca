//! Folder → server-client registry

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::types::{FolderUri, WorkspaceFolder};

/// Holds at most one client handle per workspace folder.
///
/// `ensure` checks and inserts under a single write guard without awaiting
/// in between, so concurrent callers for the same folder share one handle.
pub struct ClientRegistry<H> {
    clients: RwLock<HashMap<FolderUri, H>>,
}

impl<H: Clone> ClientRegistry<H> {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Handle registered for `folder`
    pub async fn get(&self, folder: &FolderUri) -> Option<H> {
        self.clients.read().await.get(folder).cloned()
    }

    /// Existing handle for `folder`, or a new one from `factory`.
    ///
    /// The boolean is true when the handle was created by this call.
    ///
    /// ```
    /// use polyclang::{ClientRegistry, WorkspaceFolder};
    ///
    /// # tokio_test::block_on(async {
    /// let registry = ClientRegistry::new();
    /// let folder = WorkspaceFolder::new("file:///ws");
    ///
    /// let (first, created) = registry.ensure(&folder, || 1).await;
    /// assert!(created);
    /// let (second, created) = registry.ensure(&folder, || 2).await;
    /// assert!(!created);
    /// assert_eq!(first, second);
    /// # });
    /// ```
    pub async fn ensure<F>(&self, folder: &WorkspaceFolder, factory: F) -> (H, bool)
    where
        F: FnOnce() -> H,
    {
        let mut clients = self.clients.write().await;

        if let Some(existing) = clients.get(&folder.uri) {
            debug!(folder = %folder.uri, "Reusing registered client");
            return (existing.clone(), false);
        }

        let handle = factory();
        clients.insert(folder.uri.clone(), handle.clone());
        info!(folder = %folder.uri, registered = clients.len(), "Registered new client");
        (handle, true)
    }

    /// Unregister and return the handle; the caller stops it
    pub async fn remove(&self, folder: &FolderUri) -> Option<H> {
        let removed = self.clients.write().await.remove(folder);
        if removed.is_some() {
            info!(folder = %folder, "Unregistered client");
        }
        removed
    }

    /// Unregister everything, returning the handles to stop
    pub async fn drain(&self) -> Vec<(FolderUri, H)> {
        let mut clients = self.clients.write().await;
        let drained: Vec<_> = clients.drain().collect();
        if !drained.is_empty() {
            info!(count = drained.len(), "Unregistered all clients");
        }
        drained
    }

    /// Folders that currently own a client
    pub async fn folders(&self) -> Vec<FolderUri> {
        let mut folders: Vec<_> = self.clients.read().await.keys().cloned().collect();
        folders.sort();
        folders
    }

    /// Snapshot of all registered handles, in folder order
    pub async fn handles(&self) -> Vec<H> {
        let clients = self.clients.read().await;
        let mut entries: Vec<_> = clients.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, handle)| handle.clone()).collect()
    }

    pub async fn contains(&self, folder: &FolderUri) -> bool {
        self.clients.read().await.contains_key(folder)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

impl<H: Clone> Default for ClientRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn folder(uri: &str) -> WorkspaceFolder {
        WorkspaceFolder::new(uri)
    }

    #[tokio::test]
    async fn test_ensure_creates_once_per_folder() {
        let registry: ClientRegistry<Arc<String>> = ClientRegistry::new();
        let created = AtomicUsize::new(0);

        let (first, was_new) = registry
            .ensure(&folder("file:///ws"), || {
                created.fetch_add(1, Ordering::SeqCst);
                Arc::new("ws".to_string())
            })
            .await;
        assert!(was_new);

        let (second, was_new) = registry
            .ensure(&folder("file:///ws/"), || {
                created.fetch_add(1, Ordering::SeqCst);
                Arc::new("other".to_string())
            })
            .await;
        assert!(!was_new);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_is_single_flight() {
        let registry: Arc<ClientRegistry<Arc<usize>>> = Arc::new(ClientRegistry::new());
        let created = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                let created = created.clone();
                tokio::spawn(async move {
                    registry
                        .ensure(&folder("file:///shared"), || {
                            created.fetch_add(1, Ordering::SeqCst);
                            Arc::new(i)
                        })
                        .await
                        .0
                })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_remove_and_drain() {
        let registry: ClientRegistry<u32> = ClientRegistry::new();
        registry.ensure(&folder("file:///a"), || 1).await;
        registry.ensure(&folder("file:///b"), || 2).await;

        assert_eq!(registry.remove(&FolderUri::new("file:///a")).await, Some(1));
        assert_eq!(registry.remove(&FolderUri::new("file:///a")).await, None);
        assert_eq!(registry.folders().await, vec![FolderUri::new("file:///b")]);

        let drained = registry.drain().await;
        assert_eq!(drained, vec![(FolderUri::new("file:///b"), 2)]);
        assert!(registry.is_empty().await);
    }
}
