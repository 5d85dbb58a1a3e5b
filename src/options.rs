use crate::RetryPolicy;

/// Configures HTTP timeout, extra headers and retry behavior.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Headers attached to every request, after the built-in ones.
    pub headers: Vec<(String, String)>,
    /// Retry policy applied by every resource handed out by the client.
    /// `None` sends every request exactly once.
    pub retry: Option<RetryPolicy>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            headers: Vec::new(),
            retry: Some(RetryPolicy::default()),
        }
    }
}

impl ClientOptions {
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sends every request exactly once; errors surface unwrapped.
    pub fn without_retry(mut self) -> Self {
        self.retry = None;
        self
    }
}
