use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Gave up on {url} after {attempts} attempts: {source}")]
    RetryExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<ExchangeError>,
    },

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("API error on {method}: {message}")]
    ApiError { method: String, message: String },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("Other error: {0}")]
    Other(String),
}

impl ExchangeError {
    /// Transport-level failures that a caller may reasonably try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            Self::NetworkError(_) | Self::UnexpectedStatus { .. } | Self::WebSocketError(_) => {
                true
            }
            Self::RetryExhausted { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// HTTP status carried by the error, looking through exhausted retries.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::HttpError(e) => e.status().map(|s| s.as_u16()),
            Self::RetryExhausted { source, .. } => source.status(),
            _ => None,
        }
    }
}
