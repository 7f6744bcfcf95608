//! Error types for Fairy

use thiserror::Error;

use crate::session::SessionState;

/// Result type alias for Fairy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Fairy
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Capture device unavailable or failed
    #[error("capture error: {0}")]
    Capture(String),

    /// Audio encoding, decoding or playback error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text service failure
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Language model request failure
    #[error("llm error: {0}")]
    Llm(String),

    /// Model requested a tool that is not registered
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments could not be parsed
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Tool handler failed
    #[error("tool execution error: {0}")]
    ToolExecution(String),

    /// Host document surface rejected an operation
    #[error("host error: {0}")]
    Host(String),

    /// Malformed or unexpected realtime event
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Tool loop reached its iteration cap
    #[error("tool loop stopped after {0} iterations")]
    IterationCapExceeded(usize),

    /// Illegal session state change
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition {
        /// State the session was in
        from: SessionState,
        /// State that was requested
        to: SessionState,
    },

    /// WebSocket transport error
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
