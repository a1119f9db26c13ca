//! # polyclang-process
//!
//! Process plumbing for the language servers polyclang supervises.
//!
//! - **Spawning**: stdio-piped server processes with extra environment
//! - **Shutdown**: wait for a clean exit, kill after a grace period
//! - **Discovery**: resolve the server executable from config or `PATH`
//!
//! ```rust,no_run
//! use polyclang_process::{ServerChild, ServerCommand, ServerDiscovery};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let program = ServerDiscovery::resolve("clangd")?;
//! let command = ServerCommand::new(program.to_string_lossy()).args(["--background-index"]);
//! let mut child = ServerChild::spawn(command)?;
//! child.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod child;
pub mod command;
pub mod discovery;
pub mod error;

pub use child::ServerChild;
pub use command::{ServerCommand, DEFAULT_SHUTDOWN_GRACE};
pub use discovery::ServerDiscovery;
pub use error::{ProcessError, Result};
