// crates/quarry-server/src/error.rs
// Standardized error types for Quarry

use thiserror::Error;

/// Failure reported by a provider call (LLM or search).
///
/// Split into transient kinds, which the retry layer may repeat, and
/// terminal kinds, which are surfaced immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("rate limited (HTTP 429): {0}")]
    RateLimited(String),

    #[error("server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    #[error("request rejected (HTTP {status}): {body}")]
    Request { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("stream failed mid-response: {0}")]
    Stream(String),
}

impl ProviderError {
    /// Timeouts, connection failures, 429 and 5xx
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection(_) | Self::RateLimited(_) | Self::Server { .. }
        )
    }

    /// Failures that happen before any response byte was received
    pub fn is_pre_first_byte(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Server { .. })
    }

    /// Description without any text the provider sent back
    pub fn summary(&self) -> String {
        match self {
            Self::Timeout => "request timed out".into(),
            Self::Connection(_) => "connection failed".into(),
            Self::RateLimited(_) => "rate limited (HTTP 429)".into(),
            Self::Server { status, .. } => format!("server error (HTTP {})", status),
            Self::Request { status, .. } => format!("request rejected (HTTP {})", status),
            Self::Malformed(_) => "malformed provider response".into(),
            Self::Stream(_) => "stream failed mid-response".into(),
        }
    }

    /// Classify an HTTP status that is not a success
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited(body),
            500..=599 => Self::Server { status, body },
            _ => Self::Request { status, body },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status.as_u16(), e.to_string())
        } else if e.is_decode() || e.is_body() {
            Self::Malformed(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

/// Main error type for the Quarry library
#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{provider}: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("{provider} unavailable after {attempts} attempts: {source}")]
    ProviderUnavailable {
        provider: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("circuit breaker '{0}' is open - service temporarily unavailable")]
    CircuitOpen(String),

    #[error("could not parse structured response: {reason}")]
    SchemaParse { reason: String, raw: String },

    #[error("invalid plan: {0}")]
    PlanValidation(String),

    #[error("event consumer disconnected")]
    Cancelled,

    #[error("event emitted after stream-end")]
    StreamClosed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown error: {0}")]
    Other(String),
}

/// Convenience type alias for Result using QuarryError
pub type Result<T> = std::result::Result<T, QuarryError>;

impl QuarryError {
    pub fn provider(provider: impl Into<String>, source: ProviderError) -> Self {
        Self::Provider {
            provider: provider.into(),
            source,
        }
    }

    /// The underlying provider error, if this is a raw provider failure
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Errors the orchestrator answers with a single-shot fallback
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::StreamClosed)
    }

    /// Convert to the detail string carried by an error event.
    /// Provider failures are reduced to their kind and status; response
    /// bodies stay in the logs.
    pub fn to_user_string(&self) -> String {
        match self {
            Self::Provider { provider, source } => format!("{}: {}", provider, source.summary()),
            Self::ProviderUnavailable {
                provider,
                attempts,
                source,
            } => format!(
                "{} unavailable after {} attempts: {}",
                provider,
                attempts,
                source.summary()
            ),
            other => other.to_string(),
        }
    }
}

impl From<String> for QuarryError {
    fn from(s: String) -> Self {
        QuarryError::Other(s)
    }
}

impl From<tokio::task::JoinError> for QuarryError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            QuarryError::Cancelled
        } else {
            QuarryError::Other(err.to_string())
        }
    }
}
