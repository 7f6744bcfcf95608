//! Session lifecycle states and the shared control handle

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, watch};

use crate::{Error, Result};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing in progress
    Idle,
    /// Capturing audio, waiting for an utterance
    Listening,
    /// Utterance captured, waiting for the transcript
    Transcribing,
    /// Waiting for the model's next turn
    AwaitModel,
    /// Running a tool handler
    Dispatching,
    /// Stop requested; in-flight work is finishing
    Cancelling,
    /// Duplex session open
    Streaming,
    /// Session ended; terminal
    Closed,
}

impl SessionState {
    /// Whether `next` is a legal successor of `self`
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{
            AwaitModel, Cancelling, Closed, Dispatching, Idle, Listening, Streaming, Transcribing,
        };

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Listening | Streaming)
            | (Listening, Transcribing | Idle | Cancelling)
            | (Transcribing, AwaitModel | Idle | Cancelling)
            | (AwaitModel, Dispatching | Idle | Cancelling)
            | (Dispatching, AwaitModel | Idle | Cancelling)
            | (Streaming, Cancelling)
            | (Cancelling, Idle) => true,
            _ => false,
        }
    }

    /// Whether a turn is in progress
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle | Self::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Transcribing => "transcribing",
            Self::AwaitModel => "awaiting model",
            Self::Dispatching => "dispatching",
            Self::Cancelling => "cancelling",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Shared {
    state: watch::Sender<SessionState>,
    continuous: AtomicBool,
    cancelled: AtomicBool,
    cancel_notify: Notify,
}

/// Cloneable control surface for a session
///
/// Lets another task (a toggle command, a Ctrl-C handler) observe state and
/// request cancellation while the orchestrator or controller owns the session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Create a handle in the `Idle` state
    #[must_use]
    pub fn new(continuous: bool) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            shared: Arc::new(Shared {
                state,
                continuous: AtomicBool::new(continuous),
                cancelled: AtomicBool::new(false),
                cancel_notify: Notify::new(),
            }),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Watch state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Move to `next`, validating the transition
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTransition` if `next` is not a legal successor
    pub fn transition(&self, next: SessionState) -> Result<()> {
        let mut result = Ok(());
        self.shared.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if !current.can_transition_to(next) {
                result = Err(Error::InvalidTransition {
                    from: *current,
                    to: next,
                });
                return false;
            }
            tracing::debug!(from = %current, to = %next, "session state");
            *current = next;
            true
        });
        result
    }

    /// Request cancellation
    ///
    /// Clears the continuous flag and wakes any task waiting in
    /// [`SessionHandle::cancelled`]. In-flight model calls and tool handlers
    /// are not interrupted.
    pub fn cancel(&self) {
        self.shared.continuous.store(false, Ordering::SeqCst);
        if self.shared.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(state = %self.state(), "session cancel requested");
        if self.state().is_active() && self.state() != SessionState::Cancelling {
            if let Err(e) = self.transition(SessionState::Cancelling) {
                tracing::debug!(error = %e, "cancel raced a state change");
            }
        }
        self.shared.cancel_notify.notify_waiters();
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.shared.cancel_notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Clear a previous cancellation so the session can be restarted
    pub fn reset_cancel(&self) {
        self.shared.cancelled.store(false, Ordering::SeqCst);
    }

    /// Whether Idle should re-enter Listening automatically
    #[must_use]
    pub fn is_continuous(&self) -> bool {
        self.shared.continuous.load(Ordering::SeqCst)
    }

    /// Set the hands-free flag; clearing it cancels the running turn
    pub fn set_continuous(&self, continuous: bool) {
        if continuous {
            self.reset_cancel();
            self.shared.continuous.store(true, Ordering::SeqCst);
        } else {
            self.cancel();
        }
    }

    /// Flip the hands-free flag, returning the new value
    #[must_use]
    pub fn toggle(&self) -> bool {
        let next = !self.is_continuous();
        self.set_continuous(next);
        next
    }

    /// Return to Idle after a turn, passing through `Cancelling` as needed
    pub(crate) fn settle_idle(&self) {
        let state = self.state();
        if state == SessionState::Idle || state == SessionState::Closed {
            return;
        }
        if let Err(e) = self.transition(SessionState::Idle) {
            tracing::warn!(error = %e, "forcing session back to idle");
            self.shared.state.send_replace(SessionState::Idle);
        }
    }

    /// End the session
    pub fn close(&self) {
        if let Err(e) = self.transition(SessionState::Closed) {
            tracing::debug!(error = %e, "session close rejected");
        }
    }
}
