//! Error types for the Kubo client.

use http::StatusCode;
use serde::Deserialize;

/// Error body sent by the daemon on a failed command.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ApiErrorBody {
    pub message: String,
    #[serde(default)]
    pub code: i64,
}

/// Top-level error type for Kubo client operations.
#[derive(Debug, thiserror::Error)]
pub enum KuboError {
    /// The daemon rejected the command.
    #[error("{message}")]
    Api {
        /// HTTP status code.
        status: StatusCode,
        /// Message as sent by the daemon.
        message: String,
        /// Daemon error code.
        code: i64,
    },

    /// The request never completed: connection refused, reset, body aborted.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The daemon answered with JSON we could not understand.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl KuboError {
    /// The daemon's message, if the daemon answered with an error.
    #[must_use]
    pub fn api_message(&self) -> Option<&str> {
        match self {
            Self::Api { message, .. } => Some(message),
            Self::Http(_) | Self::Decode(_) => None,
        }
    }
}
