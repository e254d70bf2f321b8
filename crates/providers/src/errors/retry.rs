//! Retry classification for provider errors.

/// How a caller should react to a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Transient failure (timeout, 5xx, dropped connection).
    /// The call may succeed on a later attempt with exponential backoff.
    WithBackoff,

    /// The provider refused the call because its quota is spent.
    /// Wait for the rate window to roll over before calling again.
    AfterWindowReset,

    /// Retrying cannot help: the symbol is unknown, the request was rejected
    /// or the response could not be understood.
    Never,
}

impl RetryClass {
    /// Returns true when a later attempt at the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RetryClass::Never)
    }
}
