//! Gateway lifecycle state machine.
//!
//! `Starting → Serving → Draining → Stopped`. Any other transition is refused and
//! logged. The current state is published through a `watch` channel so tests and
//! the binary can observe progress without polling the server.
use std::fmt;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Serving,
    Draining,
    Stopped,
}

impl LifecycleState {
    /// Whether `next` directly follows `self`.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        matches!(
            (self, next),
            (LifecycleState::Starting, LifecycleState::Serving)
                | (LifecycleState::Serving, LifecycleState::Draining)
                | (LifecycleState::Draining, LifecycleState::Stopped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Starting => write!(f, "starting"),
            LifecycleState::Serving => write!(f, "serving"),
            LifecycleState::Draining => write!(f, "draining"),
            LifecycleState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Owner of the lifecycle state.
#[derive(Debug)]
pub struct Lifecycle {
    tx: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Starting);
        Self { tx }
    }

    pub fn current(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Move to `next` if allowed. Returns whether the transition happened.
    pub fn advance(&self, next: LifecycleState) -> bool {
        let advanced = self.tx.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        });

        if advanced {
            tracing::info!(state = %next, "Gateway lifecycle transition");
        } else {
            tracing::warn!(
                from = %self.current(),
                to = %next,
                "Rejected invalid lifecycle transition"
            );
        }
        advanced
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
