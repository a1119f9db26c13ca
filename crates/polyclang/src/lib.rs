//! # polyclang
//!
//! Client-side orchestration for clangd in multi-root workspaces.
//!
//! One server process runs per outermost workspace folder that contains an
//! open C-family document. Editor events are routed to the right client,
//! roots can be replaced at runtime, and completion results are adapted so
//! the editor keeps the server's ranking.
//!
//! ## Architecture
//!
//! - [`roots`]: root-scoped routing rules with set reconciliation
//! - [`folders`]: outermost workspace folder lookup
//! - [`registry`]: one client per folder, single-flight creation
//! - [`supervisor`]: start/stop/activate of one client plus response adaptation
//! - [`restart`]: cancellable restarts after root changes
//! - [`router`]: editor events to lifecycle actions
//! - [`context`]: extension-wide state and commands
//! - [`client`]: JSON-RPC framing, correlation and capabilities
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use polyclang::{ConfigLoader, EditorHost, ExtensionContext, StdioLauncher};
//!
//! # async fn run(host: Arc<dyn EditorHost>) -> polyclang::Result<()> {
//! let settings = ConfigLoader::load_from_str("path: clangd")?;
//! let context = ExtensionContext::new(host, Arc::new(StdioLauncher::new()), settings);
//! context.init().await;
//! context
//!     .execute_command("polyclang.setRoots", &serde_json::json!(["/src/engine"]))
//!     .await?;
//! context.dispose().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod folders;
pub mod host;
pub mod launcher;
pub mod logging;
pub mod middleware;
pub mod registry;
pub mod restart;
pub mod roots;
pub mod router;
pub mod supervisor;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::{FeatureRegistry, LspConnection, EDITS_NEAR_CURSOR, SEMANTIC_TOKENS};
pub use config::{ConfigChange, ConfigLoader, ExtensionSettings, OWNERSHIP_SETTING};
pub use context::{
    CommandOutcome, ExtensionContext, ACTIVATE_COMMAND, RESTART_COMMAND, SET_ROOTS_COMMAND,
};
pub use error::{ClientError, Result};
pub use folders::WorkspaceFolderResolver;
pub use host::EditorHost;
pub use launcher::{LaunchParams, ServerConnection, ServerLauncher, StdioLauncher};
pub use logging::init_logging;
pub use middleware::{failure_disposition, rerank_completion, FailureDisposition};
pub use registry::ClientRegistry;
pub use restart::{RestartCoordinator, RestartOutcome, RestartTarget, RestartTicket};
pub use roots::{root_glob, RootDelta, RootSet};
pub use router::DocumentRouter;
pub use supervisor::{ClientEnvironment, ClientHandle, ClientSupervisor};
pub use types::{
    ClientState, DocumentInfo, FolderUri, OwnershipMode, RoutingRule, WorkspaceFolder,
    MANAGED_LANGUAGES, SUPPORTED_LANGUAGES,
};
