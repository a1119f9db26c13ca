//! Running server process wrapper

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::{
    command::ServerCommand,
    error::{ProcessError, Result},
};

/// A spawned language server process.
///
/// Shutdown is idempotent: once the process has exited (or was never
/// running) further shutdown calls return immediately.
pub struct ServerChild {
    child: Child,
    command: ServerCommand,
    pid: Option<u32>,
    exited: bool,
}

impl ServerChild {
    /// Spawn `command` with all three standard streams piped.
    pub fn spawn(command: ServerCommand) -> Result<Self> {
        command.validate()?;

        debug!(
            program = %command.program,
            args = ?command.args,
            "Spawning language server"
        );

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = command.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let child = cmd.spawn()?;
        let pid = child.id();
        info!(pid = ?pid, program = %command.program, "Language server spawned");

        Ok(Self {
            child,
            command,
            pid,
            exited: false,
        })
    }

    /// Process ID, if the OS reported one
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The command this process was started from
    pub fn command(&self) -> &ServerCommand {
        &self.command
    }

    /// Check if process is still running
    pub fn is_running(&mut self) -> bool {
        if self.exited {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid = ?self.pid, %status, "Language server has exited");
                self.exited = true;
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(pid = ?self.pid, error = %e, "Failed to poll language server status");
                false
            }
        }
    }

    /// Take stdin handle
    pub fn take_stdin(&mut self) -> Result<ChildStdin> {
        self.child
            .stdin
            .take()
            .ok_or(ProcessError::StreamUnavailable { stream: "stdin" })
    }

    /// Take stdout handle
    pub fn take_stdout(&mut self) -> Result<ChildStdout> {
        self.child
            .stdout
            .take()
            .ok_or(ProcessError::StreamUnavailable { stream: "stdout" })
    }

    /// Take stderr handle
    pub fn take_stderr(&mut self) -> Result<ChildStderr> {
        self.child
            .stderr
            .take()
            .ok_or(ProcessError::StreamUnavailable { stream: "stderr" })
    }

    /// Wait up to the grace period for the server to exit by itself, then
    /// kill it.
    ///
    /// Callers are expected to have sent the protocol `exit` notification
    /// first; this only guarantees the process does not outlive the client.
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }

        let grace = self.command.shutdown_grace;
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exited = true;
                info!(pid = ?self.pid, %status, "Language server exited");
                return Ok(());
            }
            Ok(Err(e)) => {
                warn!(pid = ?self.pid, error = %e, "Error waiting for language server");
            }
            Err(_) => {
                debug!(
                    pid = ?self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "Language server ignored exit, killing"
                );
            }
        }

        self.kill(grace).await
    }

    async fn kill(&mut self, wait: Duration) -> Result<()> {
        if let Err(e) = self.child.start_kill() {
            warn!(pid = ?self.pid, error = %e, "Failed to kill language server");
            return Err(ProcessError::KillFailed(e.to_string()));
        }

        match tokio::time::timeout(wait, self.child.wait()).await {
            Ok(Ok(_)) => {
                self.exited = true;
                info!(pid = ?self.pid, "Language server killed");
                Ok(())
            }
            Ok(Err(e)) => Err(ProcessError::KillFailed(e.to_string())),
            Err(_) => Err(ProcessError::Timeout {
                millis: wait.as_millis() as u64,
            }),
        }
    }
}
