//! Bounded retry policy for status requests.
//!
//! When a status request fails at the transport level the session is
//! assumed to have expired: the client logs in again and repeats the same
//! request. [`RetryPolicy`] bounds how many times that happens so a
//! struggling upstream never sees a request storm.

/// Upper bound on attempts for one logical request, with no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    /// One initial attempt plus a single retry after re-login.
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1 }
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
