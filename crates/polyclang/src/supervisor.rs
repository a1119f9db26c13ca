//! Lifecycle of one server-client

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lsp_types::{CompletionParams, CompletionResponse};
use parking_lot::{Mutex, RwLock};
use polyclang_process::ServerCommand;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::client::{FeatureRegistry, EDITS_NEAR_CURSOR, SEMANTIC_TOKENS};
use crate::config::ExtensionSettings;
use crate::error::{ClientError, Result};
use crate::host::EditorHost;
use crate::launcher::{LaunchParams, ServerConnection, ServerLauncher};
use crate::middleware::{failure_disposition, rerank_completion, FailureDisposition};
use crate::roots::{root_glob, RootSet};
use crate::types::{ClientState, RoutingRule, WorkspaceFolder, FILE_SCHEME, SUPPORTED_LANGUAGES};

/// Environment variable clangd reads its trace file path from
pub const TRACE_ENV: &str = "CLANGD_TRACE";

/// Shared collaborators every supervisor needs
pub struct ClientEnvironment {
    pub launcher: Arc<dyn ServerLauncher>,
    pub host: Arc<dyn EditorHost>,
    pub roots: Arc<RootSet>,
    pub settings: Arc<RwLock<ExtensionSettings>>,
}

/// Handle stored in the registry
pub type ClientHandle = Arc<ClientSupervisor>;

/// Owns the connection to the server serving one workspace folder
pub struct ClientSupervisor {
    folder: WorkspaceFolder,
    env: Arc<ClientEnvironment>,
    connection: Mutex<Option<Arc<dyn ServerConnection>>>,
    lifecycle: tokio::sync::Mutex<()>,
    state: watch::Sender<ClientState>,
    retired: AtomicBool,
}

impl ClientSupervisor {
    pub fn new(folder: WorkspaceFolder, env: Arc<ClientEnvironment>) -> Self {
        let (state, _) = watch::channel(ClientState::Stopped);
        Self {
            folder,
            env,
            connection: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            state,
            retired: AtomicBool::new(false),
        }
    }

    pub fn folder(&self) -> &WorkspaceFolder {
        &self.folder
    }

    /// Current state; a dropped connection reads as crashed
    pub fn state(&self) -> ClientState {
        let state = *self.state.borrow();
        if state == ClientState::Running && !self.is_running() {
            return ClientState::Crashed;
        }
        state
    }

    pub fn is_running(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .is_some_and(|connection| connection.is_alive())
    }

    /// Launch parameters built from the current settings and roots
    pub fn launch_params(&self) -> LaunchParams {
        let settings = self.env.settings.read().clone();
        let pattern = root_glob(&self.folder.uri.to_file_path().to_string_lossy());

        let mut document_selector: Vec<RoutingRule> = SUPPORTED_LANGUAGES
            .iter()
            .map(|language| RoutingRule::new(FILE_SCHEME, *language, pattern.clone()))
            .collect();
        document_selector.extend(self.env.roots.rules());

        let mut features = FeatureRegistry::new();
        features.enable_capability(EDITS_NEAR_CURSOR);
        if !settings.semantic_highlighting {
            features.disable_feature(SEMANTIC_TOKENS);
        }

        let mut command = ServerCommand::new(settings.path.clone()).args(settings.arguments.clone());
        if let Some(trace) = &settings.trace {
            command = command.env(TRACE_ENV, trace.to_string_lossy());
        }

        LaunchParams {
            folder: self.folder.clone(),
            command,
            document_selector,
            initialization_options: json!({
                "clangdFileStatus": true,
                "fallbackFlags": settings.fallback_flags,
            }),
            features,
            request_timeout: settings.request_timeout(),
        }
    }

    /// Whether the client was taken out of service for good
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Start the client; does nothing when it is already running or retired
    pub async fn start(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if self.is_retired() {
            debug!(folder = %self.folder.uri, "Client retired, not starting");
            return Ok(());
        }
        if self.is_running() {
            debug!(folder = %self.folder.uri, "Client already running");
            return Ok(());
        }

        self.state.send_replace(ClientState::Starting);
        let params = self.launch_params();
        debug!(
            folder = %self.folder.uri,
            server = %params.command.program,
            rules = params.document_selector.len(),
            "Starting client"
        );

        match self.env.launcher.launch(&params).await {
            Ok(connection) => {
                *self.connection.lock() = Some(connection);
                self.state.send_replace(ClientState::Running);
                info!(folder = %self.folder.uri, "Client started");
                Ok(())
            }
            Err(e) => {
                error!(folder = %self.folder.uri, error = %e, "Failed to start client");
                self.state.send_replace(ClientState::Stopped);
                Err(e)
            }
        }
    }

    /// Stop the client; stopping a stopped client is a no-op
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let taken = self.connection.lock().take();
        let Some(connection) = taken else {
            self.state.send_replace(ClientState::Stopped);
            return Ok(());
        };

        self.state.send_replace(ClientState::ShuttingDown);
        debug!(folder = %self.folder.uri, "Stopping client");
        let result = connection.shutdown().await;
        self.state.send_replace(ClientState::Stopped);

        match &result {
            Ok(()) => info!(folder = %self.folder.uri, "Client stopped"),
            Err(e) => warn!(folder = %self.folder.uri, error = %e, "Client did not stop cleanly"),
        }
        result
    }

    /// Stop the client and refuse every later start.
    ///
    /// Used once the client has left the registry, so a start racing with
    /// the removal cannot leave a server nobody owns.
    pub async fn retire(&self) -> Result<()> {
        self.retired.store(true, Ordering::SeqCst);
        self.stop().await
    }

    /// Stop, then start with fresh launch parameters
    pub async fn activate(&self) -> Result<()> {
        if let Err(e) = self.stop().await {
            debug!(folder = %self.folder.uri, error = %e, "Continuing restart after failed stop");
        }
        self.start().await
    }

    /// Resolve once the client is running
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        rx.wait_for(|state| *state == ClientState::Running)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::ConnectionClosed)
    }

    /// Resolve once no start or stop is in flight
    pub async fn wait_settled(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        rx.wait_for(|state| !matches!(state, ClientState::Starting | ClientState::ShuttingDown))
            .await
            .map(|_| ())
            .map_err(|_| ClientError::ConnectionClosed)
    }

    /// Forward a request, reporting failures the way the editor expects
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let connection = self.connection.lock().clone().ok_or_else(|| ClientError::NotRunning {
            folder: self.folder.uri.to_string(),
        })?;

        match connection.request(method, params).await {
            Ok(value) => Ok(value),
            Err(e) => {
                match failure_disposition(method, &e) {
                    FailureDisposition::Surface => {
                        self.env.host.show_error(&e.to_string()).await;
                    }
                    FailureDisposition::Log => {
                        warn!(folder = %self.folder.uri, method, error = %e, "Request failed");
                    }
                }
                Err(e)
            }
        }
    }

    /// Forward a notification
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let connection = self.connection.lock().clone().ok_or_else(|| ClientError::NotRunning {
            folder: self.folder.uri.to_string(),
        })?;
        connection.notify(method, params).await
    }

    /// `textDocument/completion`, re-ranked unless server ranking is off
    pub async fn completion(
        &self,
        line_text: &str,
        params: CompletionParams,
    ) -> Result<CompletionResponse> {
        let cursor = params.text_document_position.position;
        let value = self
            .request("textDocument/completion", Some(serde_json::to_value(&params)?))
            .await?;
        let response: Option<CompletionResponse> = serde_json::from_value(value)?;

        if self.env.settings.read().server_completion_ranking {
            Ok(CompletionResponse::List(rerank_completion(response, line_text, cursor)))
        } else {
            Ok(response.unwrap_or(CompletionResponse::Array(Vec::new())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockHost, MockLauncher};
    use lsp_types::{
        CompletionItem, Position, Range, TextDocumentIdentifier, TextDocumentPositionParams, TextEdit,
    };
    use std::path::PathBuf;

    fn supervisor(launcher: Arc<MockLauncher>, host: Arc<MockHost>, settings: ExtensionSettings) -> ClientSupervisor {
        let env = Arc::new(ClientEnvironment {
            launcher,
            host,
            roots: Arc::new(RootSet::new()),
            settings: Arc::new(RwLock::new(settings)),
        });
        ClientSupervisor::new(WorkspaceFolder::new("file:///ws/proj"), env)
    }

    #[test]
    fn test_launch_params_follow_settings() {
        let settings = ExtensionSettings {
            arguments: vec!["--background-index".to_string()],
            fallback_flags: vec!["-std=c++20".to_string()],
            trace: Some(PathBuf::from("/tmp/trace.json")),
            semantic_highlighting: false,
            ..Default::default()
        };
        let sup = supervisor(MockLauncher::new(), MockHost::new(), settings);

        let params = sup.launch_params();
        assert_eq!(params.command.args, vec!["--background-index"]);
        assert_eq!(params.command.env.get(TRACE_ENV).map(String::as_str), Some("/tmp/trace.json"));
        assert_eq!(params.initialization_options["clangdFileStatus"], true);
        assert_eq!(params.initialization_options["fallbackFlags"][0], "-std=c++20");
        assert!(params.features.is_capability_enabled(EDITS_NEAR_CURSOR));
        assert!(!params.features.is_feature_enabled(SEMANTIC_TOKENS));

        assert_eq!(params.document_selector.len(), SUPPORTED_LANGUAGES.len());
        assert!(params.selects("file:///ws/proj/src/kernel.cu", "cuda-cpp"));
        assert!(!params.selects("file:///ws/other/main.cpp", "cpp"));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let launcher = MockLauncher::new();
        let sup = supervisor(launcher.clone(), MockHost::new(), ExtensionSettings::default());

        sup.start().await.unwrap();
        sup.start().await.unwrap();

        assert_eq!(launcher.launch_count(), 1);
        assert_eq!(sup.state(), ClientState::Running);
        sup.wait_ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_stop_touches_nothing() {
        let launcher = MockLauncher::new();
        let sup = supervisor(launcher.clone(), MockHost::new(), ExtensionSettings::default());

        sup.stop().await.unwrap();
        assert_eq!(launcher.shutdown_count(), 0);

        sup.start().await.unwrap();
        sup.stop().await.unwrap();
        sup.stop().await.unwrap();
        assert_eq!(launcher.shutdown_count(), 1);
        assert_eq!(sup.state(), ClientState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_launch_leaves_client_stopped() {
        let launcher = MockLauncher::new();
        launcher.fail_launches(true);
        let sup = supervisor(launcher.clone(), MockHost::new(), ExtensionSettings::default());

        assert!(sup.start().await.is_err());
        assert_eq!(sup.state(), ClientState::Stopped);
        assert!(matches!(
            sup.request("textDocument/hover", None).await,
            Err(ClientError::NotRunning { .. })
        ));
    }

    #[tokio::test]
    async fn test_retired_client_never_starts_again() {
        let launcher = MockLauncher::new();
        let sup = supervisor(launcher.clone(), MockHost::new(), ExtensionSettings::default());
        sup.start().await.unwrap();

        sup.retire().await.unwrap();
        sup.start().await.unwrap();
        sup.activate().await.unwrap();

        assert!(sup.is_retired());
        assert!(!sup.is_running());
        assert_eq!(launcher.launch_count(), 1);
        assert_eq!(launcher.shutdown_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_start_counts_as_settled() {
        let launcher = MockLauncher::new();
        launcher.fail_launches(true);
        let sup = supervisor(launcher, MockHost::new(), ExtensionSettings::default());

        let _ = sup.start().await;
        sup.wait_settled().await.unwrap();
        assert_eq!(sup.state(), ClientState::Stopped);
    }

    #[tokio::test]
    async fn test_activate_relaunches() {
        let launcher = MockLauncher::new();
        let sup = supervisor(launcher.clone(), MockHost::new(), ExtensionSettings::default());

        sup.start().await.unwrap();
        sup.activate().await.unwrap();

        assert_eq!(launcher.launch_count(), 2);
        assert_eq!(launcher.shutdown_count(), 1);
        assert!(sup.is_running());
    }

    #[tokio::test]
    async fn test_execute_command_errors_reach_the_user() {
        let launcher = MockLauncher::new();
        let host = MockHost::new();
        let sup = supervisor(launcher.clone(), host.clone(), ExtensionSettings::default());
        sup.start().await.unwrap();

        launcher.reply_with_error("workspace/executeCommand", "unknown command");
        launcher.reply_with_error("textDocument/hover", "not ready");

        assert!(sup.request("workspace/executeCommand", None).await.is_err());
        assert!(sup.request("textDocument/hover", None).await.is_err());

        let errors = host.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unknown command"));
    }

    fn completion_params() -> CompletionParams {
        CompletionParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier {
                    uri: "file:///ws/proj/a.cpp".parse().unwrap(),
                },
                position: Position::new(0, 6),
            },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
            context: None,
        }
    }

    fn completion_reply() -> Value {
        let item = CompletionItem {
            label: "vector".to_string(),
            text_edit: Some(lsp_types::CompletionTextEdit::Edit(TextEdit {
                range: Range::new(Position::new(0, 5), Position::new(0, 6)),
                new_text: "vector".to_string(),
            })),
            ..Default::default()
        };
        serde_json::to_value(CompletionResponse::Array(vec![item])).unwrap()
    }

    #[tokio::test]
    async fn test_completion_is_reranked() {
        let launcher = MockLauncher::new();
        let sup = supervisor(launcher.clone(), MockHost::new(), ExtensionSettings::default());
        sup.start().await.unwrap();
        launcher.reply_with("textDocument/completion", completion_reply());

        let response = sup.completion("std::v", completion_params()).await.unwrap();
        let CompletionResponse::List(list) = response else {
            panic!("expected a list");
        };
        assert!(list.is_incomplete);
        assert_eq!(list.items[0].filter_text.as_deref(), Some("v_vector"));
    }

    #[tokio::test]
    async fn test_completion_passthrough_without_server_ranking() {
        let launcher = MockLauncher::new();
        let settings = ExtensionSettings {
            server_completion_ranking: false,
            ..Default::default()
        };
        let sup = supervisor(launcher.clone(), MockHost::new(), settings);
        sup.start().await.unwrap();
        launcher.reply_with("textDocument/completion", completion_reply());

        let response = sup.completion("std::v", completion_params()).await.unwrap();
        let CompletionResponse::Array(items) = response else {
            panic!("expected the server's array");
        };
        assert!(items[0].filter_text.is_none());
    }
}
