//! In-memory editor host and launcher for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::ExtensionSettings;
use crate::error::{ClientError, Result};
use crate::host::EditorHost;
use crate::launcher::{LaunchParams, ServerConnection, ServerLauncher};
use crate::types::{DocumentInfo, FolderUri, OwnershipMode, WorkspaceFolder};

#[derive(Default)]
pub struct MockHost {
    folders: Mutex<Vec<WorkspaceFolder>>,
    documents: Mutex<Vec<DocumentInfo>>,
    ownership: Mutex<HashMap<FolderUri, OwnershipMode>>,
    extensions: Mutex<Vec<String>>,
    settings: Mutex<Option<ExtensionSettings>>,
    errors: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_folders(&self, uris: &[&str]) {
        *self.folders.lock() = uris.iter().map(|uri| WorkspaceFolder::new(*uri)).collect();
    }

    pub fn open(&self, uri: &str, language: &str) {
        self.documents.lock().push(DocumentInfo::new(uri, language));
    }

    pub fn set_ownership(&self, folder: &str, mode: OwnershipMode) {
        self.ownership.lock().insert(FolderUri::new(folder), mode);
    }

    pub fn install_extension(&self, id: &str) {
        self.extensions.lock().push(id.to_string());
    }

    pub fn set_settings(&self, settings: ExtensionSettings) {
        *self.settings.lock() = Some(settings);
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }
}

#[async_trait]
impl EditorHost for MockHost {
    fn workspace_folders(&self) -> Vec<WorkspaceFolder> {
        self.folders.lock().clone()
    }

    fn open_documents(&self) -> Vec<DocumentInfo> {
        self.documents.lock().clone()
    }

    fn ownership_mode(&self, folder: &WorkspaceFolder) -> OwnershipMode {
        self.ownership
            .lock()
            .get(&folder.uri)
            .cloned()
            .unwrap_or_default()
    }

    fn extension_settings(&self) -> Option<ExtensionSettings> {
        self.settings.lock().clone()
    }

    fn installed_extensions(&self) -> Vec<String> {
        self.extensions.lock().clone()
    }

    async fn show_error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }

    async fn show_warning(&self, message: &str, _actions: &[&str]) -> Option<String> {
        self.warnings.lock().push(message.to_string());
        None
    }
}

/// Scripted replies and counters shared by a launcher and its connections
#[derive(Default)]
struct ServerScript {
    replies: Mutex<HashMap<String, std::result::Result<Value, String>>>,
    launches: Mutex<Vec<LaunchParams>>,
    shutdowns: AtomicUsize,
    fail_launches: AtomicBool,
    failing_folders: Mutex<Vec<FolderUri>>,
    launch_delay: Mutex<Duration>,
}

#[derive(Default)]
pub struct MockLauncher {
    script: Arc<ServerScript>,
}

impl MockLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_launches(&self, fail: bool) {
        self.script.fail_launches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_folder(&self, folder: &str) {
        self.script.failing_folders.lock().push(FolderUri::new(folder));
    }

    /// Make every later launch take `delay` before it completes
    pub fn delay_launches(&self, delay: Duration) {
        *self.script.launch_delay.lock() = delay;
    }

    pub fn reply_with(&self, method: &str, value: Value) {
        self.script.replies.lock().insert(method.to_string(), Ok(value));
    }

    pub fn reply_with_error(&self, method: &str, message: &str) {
        self.script
            .replies
            .lock()
            .insert(method.to_string(), Err(message.to_string()));
    }

    pub fn launch_count(&self) -> usize {
        self.script.launches.lock().len()
    }

    pub fn launches(&self) -> Vec<LaunchParams> {
        self.script.launches.lock().clone()
    }

    pub fn launched_folders(&self) -> Vec<FolderUri> {
        self.script
            .launches
            .lock()
            .iter()
            .map(|params| params.folder.uri.clone())
            .collect()
    }

    pub fn shutdown_count(&self) -> usize {
        self.script.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerLauncher for MockLauncher {
    async fn launch(&self, params: &LaunchParams) -> Result<Arc<dyn ServerConnection>> {
        let delay = *self.script.launch_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failing = self.script.failing_folders.lock().contains(&params.folder.uri);
        if failing || self.script.fail_launches.load(Ordering::SeqCst) {
            return Err(ClientError::ConnectionClosed);
        }
        self.script.launches.lock().push(params.clone());
        Ok(Arc::new(MockConnection {
            script: self.script.clone(),
            alive: AtomicBool::new(true),
        }))
    }
}

struct MockConnection {
    script: Arc<ServerScript>,
    alive: AtomicBool,
}

#[async_trait]
impl ServerConnection for MockConnection {
    async fn request(&self, method: &str, _params: Option<Value>) -> Result<Value> {
        match self.script.replies.lock().get(method) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(message)) => Err(ClientError::ResponseError {
                code: -32603,
                message: message.clone(),
            }),
            None => Ok(Value::Null),
        }
    }

    async fn notify(&self, _method: &str, _params: Option<Value>) -> Result<()> {
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> Result<()> {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.script.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
