use thiserror::Error;

/// Failures of the REST history/room calls.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page size must be greater than zero")]
    InvalidPageSize,
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("server responded with status {status}")]
    Server { status: reqwest::StatusCode },
    #[error("failed to decode response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl FetchError {
    /// Transport failures and 5xx responses are worth another attempt; the rest are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Server { status } => status.is_server_error(),
            Self::InvalidPageSize | Self::InvalidUrl(_) | Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err)
        } else if let Some(status) = err.status() {
            Self::Server { status }
        } else {
            Self::Network(err)
        }
    }
}

/// Failures of the live channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid channel url: {0}")]
    InvalidUrl(String),
    #[error("failed to connect: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("handshake timed out")]
    Timeout,
    #[error("channel has been closed")]
    Closed,
    #[error("cannot send while {0}")]
    SendRejected(String),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("username must not be empty")]
    MissingUsername,
}
