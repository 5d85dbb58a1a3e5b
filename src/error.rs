use std::time::Duration;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum IdmError {
    /// A required argument was missing, empty, or malformed. Raised before
    /// any request is sent.
    #[error("invalid argument: {0}")]
    Argument(String),
    /// A mandatory path placeholder had no value.
    #[error("missing required parameter '{name}'")]
    MissingParameter { name: String },
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status returned by the remote API.
    #[error("api error {status}: {message}")]
    Api {
        status: u16,
        /// Error name from the response body (e.g. `"Not Found"`).
        error: Option<String>,
        /// Machine-readable error code from the response body.
        error_code: Option<String>,
        message: String,
        /// Wait hint taken from `Retry-After` or `x-ratelimit-reset`.
        retry_after: Option<Duration>,
    },
    /// A retryable error persisted past the retry budget.
    #[error("giving up after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<IdmError>,
    },
    /// Response decoding or shape validation error.
    #[error("decode error: {0}")]
    Decode(String),
}

impl IdmError {
    /// HTTP status of the underlying remote error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            Self::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Whether the error is transient: rate limiting, a gateway/server
    /// failure, or a network-level problem.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Transport(err) => is_transient_transport(err),
            _ => false,
        }
    }

    /// Whether the error was raised locally while validating arguments.
    pub fn is_argument(&self) -> bool {
        matches!(self, Self::Argument(_) | Self::MissingParameter { .. })
    }

    /// Server-provided wait hint for rate-limited responses.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

fn is_transient_transport(err: &reqwest::Error) -> bool {
    err.is_timeout()
        || err.is_request()
        || err.is_body()
        // is_connect() is not available on wasm32 targets (no TCP)
        || {
            #[cfg(not(target_arch = "wasm32"))]
            { err.is_connect() }
            #[cfg(target_arch = "wasm32")]
            { false }
        }
}
