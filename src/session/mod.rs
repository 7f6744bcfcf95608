//! Session ownership and lifecycle
//!
//! A [`Session`] is created by whoever starts an activation (a CLI command or
//! a connection-open) and is passed explicitly to the orchestrator or the
//! realtime controller. It owns the conversation history and the output
//! accumulators for its lifetime.

mod state;

use std::collections::VecDeque;

pub use state::{SessionHandle, SessionState};

use crate::llm::{ConversationMessage, ToolCall};

/// Operating mode of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One utterance, then a tool-calling loop
    TurnBased,
    /// Long-lived duplex session
    Streaming,
}

/// One activation of the engine
#[derive(Debug)]
pub struct Session {
    id: uuid::Uuid,
    mode: Mode,
    handle: SessionHandle,
    /// Conversation so far, append-only
    pub history: Vec<ConversationMessage>,
    /// Tool calls requested by the model and not yet dispatched
    pub pending_tool_calls: VecDeque<ToolCall>,
    /// Model audio received since the last `audio.done`
    pub output_audio: Vec<u8>,
    /// Model text received since the last flush
    pub output_text: String,
    /// Spoken-response transcript received since the last flush
    pub output_transcript: String,
}

impl Session {
    /// Create a session in the `Idle` state
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self::with_handle(mode, SessionHandle::new(false))
    }

    /// Create a session around an existing control handle
    #[must_use]
    pub fn with_handle(mode: Mode, handle: SessionHandle) -> Self {
        let id = uuid::Uuid::new_v4();
        tracing::debug!(session_id = %id, ?mode, "session created");
        Self {
            id,
            mode,
            handle,
            history: Vec::new(),
            pending_tool_calls: VecDeque::new(),
            output_audio: Vec::new(),
            output_text: String::new(),
            output_transcript: String::new(),
        }
    }

    /// Session identifier
    #[must_use]
    pub const fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Operating mode
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Control handle shared with other tasks
    #[must_use]
    pub const fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// Append a message to the history
    pub fn push_message(&mut self, message: ConversationMessage) {
        self.history.push(message);
    }

    /// Keep only the newest `max` history messages
    pub fn retain_recent(&mut self, max: usize) {
        let excess = self.history.len().saturating_sub(max);
        if excess > 0 {
            self.history.drain(..excess);
            tracing::trace!(dropped = excess, "history trimmed");
        }
    }

    /// Drop per-turn data, keeping the session open
    pub fn clear_turn(&mut self) {
        self.history.clear();
        self.pending_tool_calls.clear();
    }

    /// Take the accumulated output audio
    pub fn take_output_audio(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output_audio)
    }

    /// Take the accumulated output text
    pub fn take_output_text(&mut self) -> String {
        std::mem::take(&mut self.output_text)
    }

    /// Take the accumulated transcript
    pub fn take_output_transcript(&mut self) -> String {
        std::mem::take(&mut self.output_transcript)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.handle.close();
        tracing::debug!(session_id = %self.id, "session closed");
    }
}
