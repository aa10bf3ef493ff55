//! Bounded retry policy for the gated operation call.
//!
//! The default reproduces the dominant single-attempt behavior; anything
//! beyond that is an explicit, per-controller decision. Retries apply to the
//! operation call only, never to the balance fetch.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total operation attempts per submission, including the first.
    pub max_attempts: u32,
    /// Also retry when the operation returns a 200 with an empty body.
    pub retry_on_empty: bool,
}

impl RetryPolicy {
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            retry_on_empty: false,
        }
    }

    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_on_empty: false,
        }
    }

    pub fn with_retry_on_empty(mut self) -> Self {
        self.retry_on_empty = true;
        self
    }

    /// Whether another attempt may follow the given (1-based) attempt.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single_attempt()
    }
}
