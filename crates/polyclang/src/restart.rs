//! Cancellable restarts after root changes
//!
//! Every restart request takes a ticket. Issuing a ticket cancels the one
//! before it, so when several requests wait for readiness at once only the
//! newest one goes on to restart anything.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

/// What a restart request ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Clients were restarted; per-client failures are logged
    Restarted,
    /// A newer request took over while this one was waiting
    Superseded,
    /// No client became ready in time
    Abandoned,
}

/// What the coordinator restarts
#[async_trait]
pub trait RestartTarget: Send + Sync {
    /// Whether there is any client to restart yet
    async fn has_client(&self) -> bool;

    /// Resolve once the clients are ready
    async fn wait_ready(&self) -> Result<()>;

    /// Restart every client
    async fn restart(&self) -> Result<()>;
}

/// One restart request's claim on the right to restart
#[derive(Debug, Clone)]
pub struct RestartTicket {
    pub generation: u64,
    token: CancellationToken,
}

impl RestartTicket {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct RestartCoordinator {
    generation: AtomicU64,
    current: Mutex<Option<CancellationToken>>,
    timing: RwLock<(Duration, Duration)>,
}

impl RestartCoordinator {
    pub fn new(poll_interval: Duration, ready_timeout: Duration) -> Self {
        Self {
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
            timing: RwLock::new((poll_interval, ready_timeout)),
        }
    }

    /// Change the polling cadence and readiness bound for later requests
    pub fn set_timing(&self, poll_interval: Duration, ready_timeout: Duration) {
        *self.timing.write() = (poll_interval, ready_timeout);
    }

    /// Make a new ticket current, cancelling the previous one
    pub fn issue(&self) -> RestartTicket {
        let token = CancellationToken::new();
        let previous = self.current.lock().replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RestartTicket { generation, token }
    }

    /// Generation of the newest ticket, 0 before the first request
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Wait for a ready client, then restart unless superseded
    pub async fn request_restart(&self, target: &dyn RestartTarget) -> RestartOutcome {
        let ticket = self.issue();
        let (poll_interval, ready_timeout) = *self.timing.read();

        let wait = async {
            while !target.has_client().await {
                tokio::time::sleep(poll_interval).await;
            }
            target.wait_ready().await
        };

        let waited = match tokio::time::timeout(ready_timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::NotReady {
                timeout_ms: ready_timeout.as_millis() as u64,
            }),
        };
        if let Err(e) = waited {
            debug!(generation = ticket.generation, error = %e, "Abandoning restart");
            return RestartOutcome::Abandoned;
        }

        if ticket.is_cancelled() {
            debug!(generation = ticket.generation, "Restart superseded");
            return RestartOutcome::Superseded;
        }

        match target.restart().await {
            Ok(()) => info!(generation = ticket.generation, "Restarted clients for new roots"),
            Err(e) => warn!(generation = ticket.generation, error = %e, "Restart did not complete"),
        }
        RestartOutcome::Restarted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::sync::watch;

    struct Target {
        has_client: AtomicBool,
        ready: watch::Sender<bool>,
        restarts: AtomicUsize,
    }

    impl Target {
        fn new(has_client: bool) -> Arc<Self> {
            Arc::new(Self {
                has_client: AtomicBool::new(has_client),
                ready: watch::channel(false).0,
                restarts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RestartTarget for Target {
        async fn has_client(&self) -> bool {
            self.has_client.load(Ordering::SeqCst)
        }

        async fn wait_ready(&self) -> Result<()> {
            let mut rx = self.ready.subscribe();
            rx.wait_for(|ready| *ready)
                .await
                .map(|_| ())
                .map_err(|_| ClientError::ConnectionClosed)
        }

        async fn restart(&self) -> Result<()> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn coordinator() -> RestartCoordinator {
        RestartCoordinator::new(Duration::from_millis(500), Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_client_is_restarted() {
        let coordinator = coordinator();
        let target = Target::new(true);
        target.ready.send_replace(true);

        assert_eq!(coordinator.request_restart(target.as_ref()).await, RestartOutcome::Restarted);
        assert_eq!(target.restarts.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.generation(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_supersedes_first() {
        let coordinator = coordinator();
        let target = Target::new(true);

        let first = coordinator.request_restart(target.as_ref());
        let second = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            coordinator.request_restart(target.as_ref()).await
        };
        let ready = async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            target.ready.send_replace(true);
        };

        let (first, second, ()) = tokio::join!(first, second, ready);

        assert_eq!(first, RestartOutcome::Superseded);
        assert_eq!(second, RestartOutcome::Restarted);
        assert_eq!(target.restarts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_a_client_exists() {
        let coordinator = coordinator();
        let target = Target::new(false);
        target.ready.send_replace(true);

        let request = coordinator.request_restart(target.as_ref());
        let appear = async {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            target.has_client.store(true, Ordering::SeqCst);
        };

        let (outcome, ()) = tokio::join!(request, appear);
        assert_eq!(outcome, RestartOutcome::Restarted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_client_is_abandoned_silently() {
        let coordinator = RestartCoordinator::new(Duration::from_millis(500), Duration::from_secs(3));
        let target = Target::new(false);

        assert_eq!(coordinator.request_restart(target.as_ref()).await, RestartOutcome::Abandoned);
        assert_eq!(target.restarts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_issuing_cancels_previous_ticket() {
        let coordinator = coordinator();
        let first = coordinator.issue();
        let second = coordinator.issue();

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(second.generation > first.generation);
    }
}
