use std::{
    fmt,
    sync::{Arc, OnceLock},
    time::Duration,
};

use eyre::{Result, WrapErr};
use tokio::{signal, sync::broadcast};

/// Default time in-flight work gets to finish once draining starts.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// Why the gateway is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// `trigger_shutdown` called by the embedding code
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "interrupt"),
            ShutdownReason::Terminate => write!(f, "terminate"),
            ShutdownReason::Requested => write!(f, "requested"),
        }
    }
}

/// Turns OS termination signals (or a manual trigger) into a single shutdown
/// notification, and hands out [`ShutdownToken`]s that carry it together with
/// the grace period.
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    /// Set exactly once, by whichever trigger fires first.
    reason: Arc<OnceLock<ShutdownReason>>,
    grace_period: Duration,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::with_grace_period(DEFAULT_GRACE_PERIOD)
    }

    pub fn with_grace_period(grace_period: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self {
            shutdown_tx,
            reason: Arc::new(OnceLock::new()),
            grace_period,
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.reason.get().is_some()
    }

    /// Initiate shutdown. Later triggers are ignored.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        if self.reason.set(reason).is_ok() {
            tracing::info!(%reason, "Shutdown initiated");
            // No receivers simply means nobody is serving yet; the reason is recorded.
            let _ = self.shutdown_tx.send(reason);
        } else {
            tracing::warn!(%reason, "Shutdown already initiated, ignoring");
        }
    }

    /// Wait for SIGINT or SIGTERM and trigger shutdown once.
    pub async fn run_signal_handler(&self) -> Result<()> {
        tracing::info!("Signal handler started. Listening for SIGTERM and SIGINT");

        let reason = tokio::select! {
            res = signal::ctrl_c() => {
                res.wrap_err("Failed to listen for Ctrl+C")?;
                ShutdownReason::Interrupt
            }
            res = wait_for_sigterm() => {
                res?;
                ShutdownReason::Terminate
            }
        };

        self.trigger_shutdown(reason);
        Ok(())
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.shutdown_tx.subscribe(),
            reason: Arc::clone(&self.reason),
            grace_period: self.grace_period,
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("Failed to register SIGTERM handler")?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}

/// Handle given to the server; resolves once shutdown has been initiated.
pub struct ShutdownToken {
    receiver: broadcast::Receiver<ShutdownReason>,
    reason: Arc<OnceLock<ShutdownReason>>,
    grace_period: Duration,
}

impl Clone for ShutdownToken {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.resubscribe(),
            reason: Arc::clone(&self.reason),
            grace_period: self.grace_period,
        }
    }
}

impl ShutdownToken {
    pub fn is_shutdown_initiated(&self) -> bool {
        self.reason.get().is_some()
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Resolve once shutdown is initiated, including when that happened before
    /// this token was created.
    pub async fn wait_for_shutdown(&mut self) -> ShutdownReason {
        if let Some(reason) = self.reason.get() {
            return *reason;
        }
        match self.receiver.recv().await {
            Ok(reason) => reason,
            // Coordinator dropped or lagged: the recorded reason, if any, is authoritative.
            Err(_) => self
                .reason
                .get()
                .copied()
                .unwrap_or(ShutdownReason::Requested),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_coordinator_creation() {
        let shutdown = ShutdownCoordinator::new();
        assert!(!shutdown.is_shutdown_initiated());
        assert_eq!(shutdown.grace_period(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_manual_trigger_shutdown() {
        let shutdown = ShutdownCoordinator::with_grace_period(Duration::from_secs(5));
        let mut token = shutdown.shutdown_token();

        shutdown.trigger_shutdown(ShutdownReason::Requested);
        assert!(shutdown.is_shutdown_initiated());
        assert!(token.is_shutdown_initiated());
        assert_eq!(token.wait_for_shutdown().await, ShutdownReason::Requested);
        assert_eq!(token.grace_period(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_first_trigger_wins() {
        let shutdown = ShutdownCoordinator::new();
        shutdown.trigger_shutdown(ShutdownReason::Terminate);
        shutdown.trigger_shutdown(ShutdownReason::Interrupt);

        let mut token = shutdown.shutdown_token();
        assert_eq!(token.wait_for_shutdown().await, ShutdownReason::Terminate);
    }

    #[tokio::test]
    async fn test_token_created_after_trigger_resolves() {
        let shutdown = ShutdownCoordinator::new();
        shutdown.trigger_shutdown(ShutdownReason::Requested);

        let mut late = shutdown.shutdown_token();
        let reason = tokio::time::timeout(Duration::from_millis(100), late.wait_for_shutdown())
            .await
            .expect("late token must not hang");
        assert_eq!(reason, ShutdownReason::Requested);
    }

    #[tokio::test]
    async fn test_cloned_tokens_all_resolve() {
        let shutdown = ShutdownCoordinator::new();
        let token = shutdown.shutdown_token();
        let mut a = token.clone();
        let mut b = token;

        let waiter = tokio::spawn(async move { a.wait_for_shutdown().await });
        tokio::task::yield_now().await;
        shutdown.trigger_shutdown(ShutdownReason::Interrupt);

        assert_eq!(waiter.await.unwrap(), ShutdownReason::Interrupt);
        assert_eq!(b.wait_for_shutdown().await, ShutdownReason::Interrupt);
    }
}
