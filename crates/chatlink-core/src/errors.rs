//! Error types for the chatlink realtime layer
//!
//! Connection failures surface as a `{status, last_error}` pair on the
//! connection state rather than as errors crossing the async boundary;
//! `ChatlinkError` covers everything else (transport plumbing, payload
//! decoding, collaborator calls).

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Wire-Visible Error Kinds
// ----------------------------------------------------------------------------

/// Failure taxonomy exposed to the UI alongside the connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Transient transport failure, retried per backoff
    ConnectionError,
    /// Retries exhausted; terminal until a new mount or URL change
    ReconnectLimit,
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ErrorKind::ConnectionError => write!(f, "connection_error"),
            ErrorKind::ReconnectLimit => write!(f, "reconnect_limit"),
        }
    }
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Errors produced by the chatlink runtime and its collaborators
#[derive(Debug, thiserror::Error)]
pub enum ChatlinkError {
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("Guest session handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("Conversation list fetch failed: {reason}")]
    Fetch { reason: String },

    #[error("Channel closed: {context}")]
    ChannelClosed { context: &'static str },

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

impl ChatlinkError {
    /// Create a transport error from any displayable reason
    pub fn transport(reason: impl core::fmt::Display) -> Self {
        Self::Transport {
            reason: reason.to_string(),
        }
    }

    /// Create a handshake error from any displayable reason
    pub fn handshake(reason: impl core::fmt::Display) -> Self {
        Self::Handshake {
            reason: reason.to_string(),
        }
    }

    /// Create a fetch error from any displayable reason
    pub fn fetch(reason: impl core::fmt::Display) -> Self {
        Self::Fetch {
            reason: reason.to_string(),
        }
    }
}

/// Result type alias used throughout chatlink
pub type ChatlinkResult<T> = Result<T, ChatlinkError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
