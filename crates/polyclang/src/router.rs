//! Editor events to client lifecycle actions

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::config::ConfigChange;
use crate::folders::WorkspaceFolderResolver;
use crate::host::EditorHost;
use crate::registry::ClientRegistry;
use crate::supervisor::{ClientEnvironment, ClientHandle, ClientSupervisor};
use crate::types::{DocumentInfo, FolderUri, WorkspaceFolder};

/// Decides which folder's client serves a document and keeps the registry
/// in step with folder and configuration changes.
pub struct DocumentRouter {
    env: Arc<ClientEnvironment>,
    resolver: Arc<WorkspaceFolderResolver>,
    registry: Arc<ClientRegistry<ClientHandle>>,
}

impl DocumentRouter {
    pub fn new(
        env: Arc<ClientEnvironment>,
        resolver: Arc<WorkspaceFolderResolver>,
        registry: Arc<ClientRegistry<ClientHandle>>,
    ) -> Self {
        Self {
            env,
            resolver,
            registry,
        }
    }

    fn host(&self) -> &dyn EditorHost {
        self.env.host.as_ref()
    }

    /// Make sure a client serves `doc`, starting one when needed.
    ///
    /// Returns the serving client, or None when the document is not ours.
    pub async fn did_open(&self, doc: &DocumentInfo) -> Option<ClientHandle> {
        if !doc.is_routable() {
            trace!(uri = %doc.uri, language = %doc.language_id, "Ignoring document");
            return None;
        }

        let Some(folder) = self.host().workspace_folder_of(&doc.uri) else {
            trace!(uri = %doc.uri, "Document is outside every workspace folder");
            return None;
        };
        let folder = self.resolver.outermost(&folder);

        if !self.host().ownership_mode(&folder).permits_client() {
            debug!(folder = %folder.uri, "Folder is owned by another mechanism");
            return None;
        }

        Some(self.ensure_started(&folder).await)
    }

    async fn ensure_started(&self, folder: &WorkspaceFolder) -> ClientHandle {
        if let Some(existing) = self.registry.get(&folder.uri).await {
            return existing;
        }

        let (handle, created) = self
            .registry
            .ensure(folder, || {
                Arc::new(ClientSupervisor::new(folder.clone(), self.env.clone()))
            })
            .await;

        if created {
            if let Err(e) = handle.start().await {
                warn!(folder = %folder.uri, error = %e, "Client failed to start");
            }
        }
        handle
    }

    /// React to workspace folders being added or removed.
    ///
    /// A client whose folder is now nested inside another folder is retired
    /// in favour of the outer one. Removing a folder routes open documents
    /// again so folders it used to enclose get their own client.
    pub async fn did_change_workspace_folders(
        &self,
        added: &[WorkspaceFolder],
        removed: &[WorkspaceFolder],
    ) {
        self.resolver.invalidate();

        let mut dropped = false;
        for folder in removed {
            dropped |= self.retire(&folder.uri).await;
        }

        for uri in self.registry.folders().await {
            let outermost = self.resolver.outermost(&WorkspaceFolder::new(uri.clone()));
            if outermost.uri != uri {
                debug!(folder = %uri, outer = %outermost.uri, "Folder is now nested");
                self.retire(&uri).await;
            }
        }

        for folder in added {
            let folder = self.resolver.outermost(folder);
            if !self.host().ownership_mode(&folder).permits_client() {
                continue;
            }
            self.ensure_started(&folder).await;
        }

        if dropped {
            self.route_open_documents().await;
        }
    }

    /// Unregister and retire the client of `uri`, if any
    async fn retire(&self, uri: &FolderUri) -> bool {
        let Some(handle) = self.registry.remove(uri).await else {
            return false;
        };
        if let Err(e) = handle.retire().await {
            warn!(folder = %uri, error = %e, "Failed to stop client");
        }
        true
    }

    /// React to a settings change.
    ///
    /// Extension-wide changes restart every client; ownership changes only
    /// drop clients of folders that are no longer ours.
    pub async fn did_change_configuration(&self, change: &ConfigChange) {
        if change.affects_extension() {
            info!("Extension settings changed, restarting all clients");
            self.stop_all().await;
            self.route_open_documents().await;
            return;
        }

        if !change.affects_folder_ownership() {
            return;
        }

        let folders = self.host().workspace_folders();
        for uri in self.registry.folders().await {
            let folder = folders
                .iter()
                .find(|folder| folder.uri == uri)
                .cloned()
                .unwrap_or_else(|| WorkspaceFolder::new(uri.clone()));
            if self.host().ownership_mode(&folder).permits_client() {
                continue;
            }
            if self.retire(&uri).await {
                info!(folder = %uri, "Folder no longer owned, stopped client");
            }
        }

        self.route_open_documents().await;
    }

    /// Route every open document
    pub async fn route_open_documents(&self) {
        for doc in self.host().open_documents() {
            self.did_open(&doc).await;
        }
    }

    /// Stop and unregister every client
    pub async fn stop_all(&self) {
        for (folder, handle) in self.registry.drain().await {
            if let Err(e) = handle.retire().await {
                warn!(folder = %folder, error = %e, "Failed to stop client");
            }
        }
    }
}
