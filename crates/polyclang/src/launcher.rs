//! Turning launch parameters into a live server connection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use polyclang_process::{ServerChild, ServerCommand, ServerDiscovery};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{initialize_params, FeatureRegistry, LspConnection};
use crate::error::Result;
use crate::types::{RoutingRule, WorkspaceFolder};

/// Everything needed to bring up one server-client
#[derive(Debug, Clone)]
pub struct LaunchParams {
    /// Folder the client is scoped to
    pub folder: WorkspaceFolder,
    /// Server process to spawn
    pub command: ServerCommand,
    /// Documents this client accepts
    pub document_selector: Vec<RoutingRule>,
    /// `initializationOptions` sent with `initialize`
    pub initialization_options: Value,
    /// Capabilities advertised to the server
    pub features: FeatureRegistry,
    /// Per-request timeout, `initialize` included
    pub request_timeout: Duration,
}

#[cfg(test)]
impl LaunchParams {
    /// Whether a document with this URI and language falls under the selector
    pub(crate) fn selects(&self, uri: &str, language: &str) -> bool {
        self.document_selector.iter().any(|rule| {
            rule.language == language
                && uri.starts_with(&format!("{}:", rule.scheme))
                && uri_matches_glob(uri, &rule.pattern)
        })
    }
}

/// Match a `dir/**/*` style glob against a document URI or path
#[cfg(test)]
fn uri_matches_glob(uri: &str, pattern: &str) -> bool {
    let Some(dir) = pattern.strip_suffix("/**/*") else {
        return false;
    };
    let path = uri.strip_prefix("file://").unwrap_or(uri);
    let dir = dir.strip_prefix("file://").unwrap_or(dir);
    path.strip_prefix(dir)
        .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
}

/// A live, initialized connection to one server
#[async_trait]
pub trait ServerConnection: Send + Sync {
    /// Send a request and wait for its result
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value>;

    /// Send a notification
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    /// Whether the server side is still there
    fn is_alive(&self) -> bool;

    /// `shutdown` + `exit`, then make sure the process is gone.
    ///
    /// Calling this more than once is allowed and does nothing after the
    /// first call.
    async fn shutdown(&self) -> Result<()>;
}

/// Produces connections; swapped out in tests
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    async fn launch(&self, params: &LaunchParams) -> Result<Arc<dyn ServerConnection>>;
}

/// Launches the server as a child process speaking LSP over stdio
#[derive(Debug, Default, Clone)]
pub struct StdioLauncher;

impl StdioLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ServerLauncher for StdioLauncher {
    async fn launch(&self, params: &LaunchParams) -> Result<Arc<dyn ServerConnection>> {
        let program = ServerDiscovery::resolve(&params.command.program)?;
        let mut command = params.command.clone();
        command.program = program.to_string_lossy().into_owned();
        if command.working_dir.is_none() {
            let root = params.folder.uri.to_file_path();
            if root.is_dir() {
                command.working_dir = Some(root);
            }
        }

        let mut child = ServerChild::spawn(command)?;
        let stdin = child.take_stdin()?;
        let stdout = child.take_stdout()?;
        if let Ok(stderr) = child.take_stderr() {
            let folder = params.folder.uri.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(folder = %folder, "server: {}", line);
                }
            });
        }

        let connection = LspConnection::start(stdout, stdin, params.request_timeout);
        let stdio = StdioConnection {
            connection,
            child: Mutex::new(child),
            shut_down: AtomicBool::new(false),
        };

        let init = initialize_params(
            Some(std::process::id()),
            &params.folder,
            &params.features,
            params.initialization_options.clone(),
        );
        if let Err(e) = stdio.connection.request("initialize", Some(init)).await {
            warn!(folder = %params.folder.uri, error = %e, "Server failed to initialize");
            let _ = stdio.shutdown().await;
            return Err(e);
        }
        stdio.connection.notify("initialized", Some(json!({}))).await?;

        info!(folder = %params.folder.uri, "Language server initialized");
        Ok(Arc::new(stdio))
    }
}

/// [`ServerConnection`] backed by a child process
struct StdioConnection {
    connection: LspConnection,
    child: Mutex<ServerChild>,
    shut_down: AtomicBool,
}

#[async_trait]
impl ServerConnection for StdioConnection {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.connection.request(method, params).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.connection.notify(method, params).await
    }

    fn is_alive(&self) -> bool {
        !self.shut_down.load(Ordering::SeqCst) && !self.connection.is_closed()
    }

    async fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if !self.connection.is_closed() {
            if let Err(e) = self.connection.request("shutdown", None).await {
                debug!(error = %e, "shutdown request failed");
            }
            let _ = self.connection.notify("exit", None).await;
        }
        self.connection.close().await;

        let mut child = self.child.lock().await;
        child.shutdown().await?;
        Ok(())
    }
}
