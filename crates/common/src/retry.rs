//! # Bounded Immediate Retry
//!
//! Retry driver for network calls against the local storage daemon and
//! the public mirrors.
//!
//! ## Design
//!
//! - A fixed attempt ceiling, no backoff curve: the primary target is a
//!   daemon on localhost where transient faults clear within milliseconds,
//!   so attempts are issued back-to-back until the ceiling is reached.
//! - The operation receives the current attempt index (1-based) so a
//!   caller can vary behavior per attempt, e.g. alternate between two
//!   mirror endpoints by parity.
//! - The operation classifies its own failures: [`AttemptError::Transient`]
//!   is retried while attempts remain, [`AttemptError::Fatal`] aborts the
//!   loop immediately and surfaces the error as-is.
//!
//! ## Invariants
//!
//! 1. The operation is invoked at most `max_attempts` times.
//! 2. Attempt indices passed to the operation are exactly `1..=n` where
//!    `n` is the number of invocations made.
//! 3. The error returned is always the one from the final invocation.

use std::future::Future;

/// Attempt ceiling for a retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of invocations, including the first. 0 is treated as 1.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Policy allowing up to `max_attempts` invocations.
    pub fn attempts(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

/// Failure classification reported by a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError<E> {
    /// Worth retrying while attempts remain.
    Transient(E),
    /// Do not retry; surface immediately.
    Fatal(E),
}

impl<E> AttemptError<E> {
    fn into_inner(self) -> E {
        match self {
            AttemptError::Transient(e) | AttemptError::Fatal(e) => e,
        }
    }
}

/// Invoke `operation` until it succeeds or the policy is exhausted.
///
/// The closure receives the 1-based attempt index. On exhaustion the error
/// from the last attempt propagates to the caller; a [`AttemptError::Fatal`]
/// propagates without consuming the remaining attempts.
pub async fn retry_immediate<T, E, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError<E>>>,
{
    let ceiling = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(err @ AttemptError::Transient(_)) => {
                if attempt >= ceiling {
                    return Err(err.into_inner());
                }
                tracing::trace!(attempt, ceiling, "retrying after transient failure");
            }
        }
    }
}
