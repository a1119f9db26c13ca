//! Extension-wide state and the command surface

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ConfigChange, ExtensionSettings};
use crate::error::{ClientError, Result};
use crate::folders::WorkspaceFolderResolver;
use crate::host::EditorHost;
use crate::launcher::ServerLauncher;
use crate::registry::ClientRegistry;
use crate::restart::{RestartCoordinator, RestartOutcome, RestartTarget};
use crate::roots::RootSet;
use crate::router::DocumentRouter;
use crate::supervisor::{ClientEnvironment, ClientHandle};
use crate::types::{DocumentInfo, WorkspaceFolder};

/// No-op command kept so the editor can force activation
pub const ACTIVATE_COMMAND: &str = "polyclang.activate";
/// Stop every client and route open documents again
pub const RESTART_COMMAND: &str = "polyclang.restart";
/// Replace the set of roots routed to the server
pub const SET_ROOTS_COMMAND: &str = "polyclang.setRoots";

/// Extensions that also claim C/C++ documents
pub const CONFLICTING_EXTENSIONS: [&str; 2] =
    ["ms-vscode.cpptools", "llvm-vs-code-extensions.vscode-clangd"];

/// What a command did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command ran
    Done,
    /// Arguments were malformed; nothing changed
    Ignored,
    /// The roots were already as requested
    Unchanged,
    /// Roots changed and a restart was requested
    Restart(RestartOutcome),
}

/// Owns everything that lives as long as the extension: roots, clients,
/// folder resolution, restart coordination and settings.
///
/// Construct with [`ExtensionContext::new`], call [`ExtensionContext::init`]
/// once and [`ExtensionContext::dispose`] on teardown.
pub struct ExtensionContext {
    env: Arc<ClientEnvironment>,
    registry: Arc<ClientRegistry<ClientHandle>>,
    coordinator: RestartCoordinator,
    router: DocumentRouter,
}

impl ExtensionContext {
    pub fn new(
        host: Arc<dyn EditorHost>,
        launcher: Arc<dyn ServerLauncher>,
        settings: ExtensionSettings,
    ) -> Self {
        let coordinator =
            RestartCoordinator::new(settings.restart_poll_interval(), settings.ready_timeout());
        let env = Arc::new(ClientEnvironment {
            launcher,
            host: host.clone(),
            roots: Arc::new(RootSet::new()),
            settings: Arc::new(RwLock::new(settings)),
        });
        let resolver = Arc::new(WorkspaceFolderResolver::new(host));
        let registry = Arc::new(ClientRegistry::new());
        let router = DocumentRouter::new(env.clone(), resolver, registry.clone());

        Self {
            env,
            registry,
            coordinator,
            router,
        }
    }

    /// Warn about conflicting extensions, then serve already-open documents
    pub async fn init(&self) {
        self.detect_conflicts().await;
        self.router.route_open_documents().await;
        info!(clients = self.registry.len().await, "polyclang initialized");
    }

    /// Stop every client
    pub async fn dispose(&self) {
        self.router.stop_all().await;
        info!("polyclang disposed");
    }

    pub fn roots(&self) -> &RootSet {
        &self.env.roots
    }

    pub fn registry(&self) -> &ClientRegistry<ClientHandle> {
        &self.registry
    }

    pub fn router(&self) -> &DocumentRouter {
        &self.router
    }

    pub fn settings(&self) -> ExtensionSettings {
        self.env.settings.read().clone()
    }

    /// Replace the settings; running clients pick them up on next start
    pub fn update_settings(&self, settings: ExtensionSettings) {
        self.coordinator
            .set_timing(settings.restart_poll_interval(), settings.ready_timeout());
        *self.env.settings.write() = settings;
    }

    pub async fn did_open(&self, doc: &DocumentInfo) -> Option<ClientHandle> {
        self.router.did_open(doc).await
    }

    pub async fn did_change_workspace_folders(
        &self,
        added: &[WorkspaceFolder],
        removed: &[WorkspaceFolder],
    ) {
        self.router.did_change_workspace_folders(added, removed).await;
    }

    pub async fn did_change_configuration(&self, change: &ConfigChange) {
        if change.affects_extension() {
            if let Some(settings) = self.env.host.extension_settings() {
                self.update_settings(settings);
            }
        }
        self.router.did_change_configuration(change).await;
    }

    /// Run a registered command
    pub async fn execute_command(&self, name: &str, args: &Value) -> Result<CommandOutcome> {
        debug!(command = name, "Executing command");
        match name {
            ACTIVATE_COMMAND => Ok(CommandOutcome::Done),
            RESTART_COMMAND => {
                self.router.stop_all().await;
                self.router.route_open_documents().await;
                Ok(CommandOutcome::Done)
            }
            SET_ROOTS_COMMAND => Ok(self.set_roots(args).await),
            other => Err(ClientError::UnknownCommand(other.to_string())),
        }
    }

    /// Reconcile roots with `args` and restart when anything changed
    pub async fn set_roots(&self, args: &Value) -> CommandOutcome {
        let roots = match parse_roots(args) {
            Ok(roots) => roots,
            Err(e) => {
                warn!(error = %e, "Ignoring setRoots");
                return CommandOutcome::Ignored;
            }
        };

        let delta = self.env.roots.reconcile(&roots);
        if delta.is_empty() {
            info!(roots = roots.len(), "Roots unchanged, not restarting");
            return CommandOutcome::Unchanged;
        }

        self.env.roots.apply(&delta);
        info!(
            added = delta.to_add.len(),
            removed = delta.to_remove.len(),
            "Roots changed, restarting clients"
        );

        let target = LiveClients {
            registry: &self.registry,
        };
        CommandOutcome::Restart(self.coordinator.request_restart(&target).await)
    }

    async fn detect_conflicts(&self) {
        if !self.env.settings.read().detect_extension_conflicts {
            return;
        }

        let installed = self.env.host.installed_extensions();
        let Some(conflict) = CONFLICTING_EXTENSIONS
            .into_iter()
            .find(|id| installed.iter().any(|ext| ext == id))
        else {
            return;
        };

        warn!(extension = conflict, "Conflicting extension installed");
        let message = format!(
            "The extension {conflict} also provides C/C++ language features. \
             Running both may produce duplicate results."
        );
        if let Some(choice) = self.env.host.show_warning(&message, &["OK"]).await {
            debug!(choice = %choice, "Conflict warning acknowledged");
        }
    }
}

/// The `setRoots` argument: an array of directory strings
fn parse_roots(args: &Value) -> Result<Vec<String>> {
    let invalid = |reason: &str| ClientError::InvalidCommandArgs {
        command: SET_ROOTS_COMMAND.to_string(),
        reason: reason.to_string(),
    };

    let items = args.as_array().ok_or_else(|| invalid("expected an array"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid("every root must be a string"))
        })
        .collect()
}

/// The registered clients, seen as one restart target
struct LiveClients<'a> {
    registry: &'a ClientRegistry<ClientHandle>,
}

#[async_trait]
impl RestartTarget for LiveClients<'_> {
    async fn has_client(&self) -> bool {
        !self.registry.is_empty().await
    }

    async fn wait_ready(&self) -> Result<()> {
        // clients whose start failed settle as stopped and do not hold up the rest
        for handle in self.registry.handles().await {
            handle.wait_settled().await?;
        }
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        let mut first_error = None;
        for handle in self.registry.handles().await {
            let uri = &handle.folder().uri;
            let current = self.registry.get(uri).await;
            if !current.is_some_and(|current| Arc::ptr_eq(&current, &handle)) {
                debug!(folder = %uri, "Client left the registry, skipping restart");
                continue;
            }
            if let Err(e) = handle.activate().await {
                warn!(folder = %uri, error = %e, "Client failed to restart");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
