//! External API error taxonomy (§4.3, §7).

/// Errors surfaced by the external match-history API client after its own
/// retry policy has run its course.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Upstream 404. Expected for some accounts; never retried.
    #[error("resource not found")]
    NotFound,

    /// Upstream 429 persisted past the retry budget.
    #[error("rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    /// Any other non-2xx response, or a malformed 2xx body.
    #[error("transport error: {status:?} {message}")]
    TransportError { status: Option<u16>, message: String },

    /// The request never reached the server (timeout, DNS, connect
    /// failure).
    #[error("request failed: {0}")]
    Request(String),
}

impl ApiError {
    /// `true` for errors that are expected often enough that they shouldn't
    /// be logged above debug severity unless they recur (§7).
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Internal signal used by the retry loop in [`super::retry`] to decide
/// whether to sleep-and-retry or surface immediately.
#[derive(Debug)]
pub(super) enum RetryableOutcome<T> {
    Success(T),
    RateLimited { retry_after: Option<std::time::Duration> },
    Terminal(ApiError),
}
