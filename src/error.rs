// SPDX-FileCopyrightText: 2025 Chase Colman
// SPDX-License-Identifier: MPL-2.0

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// Error types for the AppSync Events realtime client
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or contradictory endpoint, region or channel inputs
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credential resolution or SigV4 signing failure
    #[error("Signing error: {0}")]
    Signing(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_websockets::Error),

    /// The remote side closed the connection
    #[error("Connection closed ({code:?}): {reason}")]
    ConnectionClosed { code: Option<u16>, reason: String },

    /// No `connection_ack` arrived in time
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// No keep-alive arrived within the negotiated connection timeout
    #[error("Keep-alive timeout")]
    KeepAliveTimeout,

    /// The server rejected `connection_init`
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// The session is no longer running
    #[error("Session closed")]
    SessionClosed,

    /// A subscription was rejected by the server
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An inbound frame could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// JSON serialization or deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URI parsing error
    #[error("URI error: {0}")]
    Uri(#[from] http::uri::InvalidUri),

    /// Header value could not be used in the handshake
    #[error("Invalid header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    /// HTTP publish transport error
    #[error("Publish error: {0}")]
    Publish(#[from] reqwest::Error),

    /// The publish endpoint answered with a non-success status
    #[error("Publish rejected with status {status}: {body}")]
    PublishRejected { status: u16, body: String },
}

impl Error {
    /// Whether this error ends the whole session rather than a single subscription.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::WebSocket(_)
                | Error::ConnectionClosed { .. }
                | Error::ConnectionTimeout
                | Error::KeepAliveTimeout
                | Error::Handshake(_)
                | Error::SessionClosed
        )
    }

    /// Whether this error was raised before any network I/O took place.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

/// Error entry as sent by AppSync in `errors` arrays
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "errorType", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.error_type, &self.message) {
            (Some(t), Some(m)) => write!(f, "{t}: {m}"),
            (Some(t), None) => f.write_str(t),
            (None, Some(m)) => f.write_str(m),
            (None, None) => f.write_str("unknown"),
        }
    }
}

/// A `subscribe_error` received for one subscription
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Subscription {id} rejected: {}", describe(.errors))]
pub struct ProtocolError {
    pub id: Uuid,
    pub errors: Vec<ErrorDetail>,
}

pub(crate) fn describe(errors: &[ErrorDetail]) -> String {
    if errors.is_empty() {
        return "unknown".to_string();
    }
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
