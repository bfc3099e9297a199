//! DAP error types.

use thiserror::Error;

/// Raw failure text a backend uses for a command it does not handle.
pub const UNKNOWN_COMMAND_TEXT: &str = "Error: unknowncommand";

/// Errors from the client-facing transport and session.
#[derive(Debug, Error)]
pub enum DapError {
    /// Reading or writing the client stream failed.
    #[error("client stream error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing of an inbound message was broken.
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound message was not a valid DAP message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The outbound channel to the client is gone.
    #[error("client channel closed")]
    ChannelClosed,
}

/// A failed backend adapter call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The adapter has no handler for the command.
    #[error("Error: unknowncommand")]
    UnknownCommand(String),

    /// The adapter handled the command and it failed.
    #[error("{0}")]
    Failed(String),
}

impl AdapterError {
    pub fn failed(message: impl Into<String>) -> Self {
        AdapterError::Failed(message.into())
    }

    /// Whether this is the "no such command" signal, either typed or as
    /// the backend's raw text.
    pub fn is_unknown_command(&self) -> bool {
        match self {
            AdapterError::UnknownCommand(_) => true,
            AdapterError::Failed(text) => text == UNKNOWN_COMMAND_TEXT,
        }
    }
}

/// A pipeline stage rejected a request before it reached the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage}: {message}")]
pub struct TransformError {
    pub stage: &'static str,
    pub message: String,
}

impl TransformError {
    pub fn new(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}
