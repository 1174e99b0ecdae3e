//! Classified provider failures.
//!
//! Adapters never surface transport-specific exceptions to the orchestrator.
//! Every failure is folded into a [`ProviderError`] carrying the origin
//! provider, a closed [`ErrorKind`], and a retryable flag derived from the
//! kind. The orchestrator and the retry loop branch on the flag, never on
//! the underlying cause.

use std::time::Duration;
use thiserror::Error;

/// Closed taxonomy of adapter failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The absolute deadline elapsed before a usable response arrived.
    Timeout,
    /// The vendor returned HTTP 429.
    RateLimited,
    /// The vendor rejected the credentials (HTTP 401/403).
    Authentication,
    /// The vendor response envelope did not match its documented schema.
    Validation,
    /// The model text did not contain a well-formed signal payload.
    Parse,
    /// Connection, DNS, or other transport-level failure.
    Transport,
    /// Any other non-2xx or unexpected condition.
    Generic,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Validation => "validation",
            ErrorKind::Parse => "parse",
            ErrorKind::Transport => "transport",
            ErrorKind::Generic => "generic",
        }
    }

    /// Default retry eligibility for this kind. `Generic` is refined at
    /// construction time (5xx retries, other statuses do not).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::Transport
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure from one provider call.
#[derive(Debug, Clone, Error)]
#[error("provider {provider}: {kind}: {message}")]
pub struct ProviderError {
    /// Name of the adapter that produced the failure.
    pub provider: String,
    pub kind: ErrorKind,
    pub message: String,
    /// Whether the retry loop may attempt the call again.
    pub retryable: bool,
    /// Vendor-requested backoff, taken from a `Retry-After` header.
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    fn new(provider: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
            retry_after: None,
        }
    }

    pub fn timeout(provider: &str) -> Self {
        Self::new(provider, ErrorKind::Timeout, "deadline exceeded")
    }

    pub fn rate_limited(provider: &str, retry_after: Option<Duration>) -> Self {
        let mut err = Self::new(provider, ErrorKind::RateLimited, "rate limit exceeded");
        err.retry_after = retry_after;
        err
    }

    pub fn authentication(provider: &str, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Authentication, message)
    }

    pub fn validation(provider: &str, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Validation, message)
    }

    pub fn parse(provider: &str, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Parse, message)
    }

    pub fn transport(provider: &str, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Transport, message)
    }

    /// Classify an unexpected HTTP status. Server-side failures stay
    /// retryable; client-side statuses do not.
    pub fn generic(provider: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        let mut err = Self::new(provider, ErrorKind::Generic, message);
        err.retryable = status.map(|s| s >= 500).unwrap_or(false);
        err
    }

    /// Fold a transport-layer error into the taxonomy.
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(provider)
        } else if err.is_decode() {
            Self::validation(provider, format!("malformed vendor response: {err}"))
        } else {
            Self::transport(provider, err.to_string())
        }
    }
}
