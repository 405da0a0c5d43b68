//! Error types for Chatline
//!
//! This module defines the error taxonomy used throughout the client,
//! using `thiserror` for ergonomic error handling. Every failure the core
//! can surface falls into one of four classes (see [`ErrorKind`]); none of
//! them is fatal to the process.

use thiserror::Error;

/// Main error type for Chatline operations
#[derive(Error, Debug)]
pub enum ChatlineError {
    /// Network, timeout or protocol failure from a collaborator call
    #[error("Transport error: {0}")]
    Transport(String),

    /// Input rejected locally before dispatch (empty title, empty content)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Identity missing, still loading, or rejected by a collaborator
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Requested conversation does not exist or is not visible
    #[error("Not found: {0}")]
    NotFound(String),

    /// The user message was persisted but the reply was never triggered
    #[error("Message {message_id} was saved but the reply failed: {reason}")]
    PartialSuccess {
        /// Identifier of the orphaned user message
        message_id: String,
        /// Diagnostic reported by the triggered action, or the call failure
        reason: String,
    },

    /// Delete was requested but the caller did not confirm it
    #[error("Deletion of conversation {0} was not confirmed")]
    DeleteNotConfirmed(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket errors from the live channel
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Failure classes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network/timeout failure; local state is unchanged
    Transport,
    /// Rejected before reaching the network
    Validation,
    /// Identity missing or rejected
    Authorization,
    /// User message persisted without a reply
    PartialSuccess,
    /// Anything else (configuration, local IO)
    Other,
}

impl ChatlineError {
    /// Classify this error into the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Http(_) | Self::WebSocket(_) | Self::NotFound(_) => {
                ErrorKind::Transport
            }
            Self::Validation(_) | Self::DeleteNotConfirmed(_) => ErrorKind::Validation,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::PartialSuccess { .. } => ErrorKind::PartialSuccess,
            Self::Config(_) | Self::Io(_) | Self::Serialization(_) | Self::Yaml(_) => {
                ErrorKind::Other
            }
        }
    }
}

/// Classify an `anyhow::Error` produced anywhere in the crate
///
/// Errors that did not originate as a [`ChatlineError`] are reported as
/// [`ErrorKind::Other`].
///
/// # Examples
///
/// ```
/// use chatline::error::{kind_of, ChatlineError, ErrorKind};
///
/// let err: anyhow::Error = ChatlineError::Validation("empty".into()).into();
/// assert_eq!(kind_of(&err), ErrorKind::Validation);
/// ```
pub fn kind_of(err: &anyhow::Error) -> ErrorKind {
    err.downcast_ref::<ChatlineError>()
        .map(ChatlineError::kind)
        .unwrap_or(ErrorKind::Other)
}

/// Result type alias for Chatline operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
