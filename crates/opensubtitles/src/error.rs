//! Error types surfaced by the client and its transports

/// Errors returned by a transport's `send`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors returned by client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The API key (or a token) cannot be used as credential material
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// A client setting cannot be used to build requests
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The API rejected or failed the call
    #[error("HTTP {code}{}", reason_suffix(.reason))]
    Api { code: u16, reason: Option<String> },

    /// The send did not complete within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// An operation was invoked after `close()`
    #[error("Client is closed")]
    ClientClosed,

    /// A successful response did not have the shape the API contract promises
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// No operation with this name exists in the client's catalog
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => Self::Timeout,
            other => Self::Transport(other),
        }
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(" - {r}"))
        .unwrap_or_default()
}

impl ClientError {
    /// Returns the API status code for `Api` errors
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns the API's reason text for `Api` errors, if it sent one
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Api { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}
