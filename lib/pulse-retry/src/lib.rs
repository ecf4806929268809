/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Retry-until-success executor shared by the agent transport and the
//! collector storage. The caller supplies the classification rules; the
//! executor only decides between another attempt, a permanent failure and
//! cancellation.

use std::error::Error;
use std::future::Future;
use std::time::Duration;

use thiserror::Error as ThisError;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClassification {
    Retriable,
    NonRetriable,
}

pub trait ErrorClassifier<E> {
    fn classify(&self, err: &E) -> ErrorClassification;
}

/// Attempt budget and inter-attempt delay schedule. When attempts outrun
/// the schedule, the last entry repeats.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(
            3,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(5),
            ],
        )
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delays: Vec<Duration>) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delays,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    fn delay_after(&self, attempt: usize) -> Duration {
        match self.delays.last() {
            Some(last) => *self.delays.get(attempt).unwrap_or(last),
            None => Duration::ZERO,
        }
    }
}

#[derive(Debug, ThisError)]
pub enum RetryError<E: Error + 'static> {
    #[error("operation cancelled")]
    Cancelled,
    #[error("non-retriable error: {0}")]
    Permanent(#[source] E),
    #[error("all {attempts} attempts failed, last error: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: E,
    },
}

impl<E: Error + 'static> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }

    /// The underlying error, when one exists.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Cancelled => None,
            RetryError::Permanent(e) => Some(e),
            RetryError::Exhausted { last, .. } => Some(last),
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, exhausts the
/// policy, or the token is cancelled. The inter-attempt wait races against
/// the token, so a cancelled token aborts the wait at once; an attempt
/// already in flight is not interrupted.
pub async fn retry<T, E, C, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    classifier: &C,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: Error + 'static,
    C: ErrorClassifier<E> + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if classifier.classify(&err) == ErrorClassification::NonRetriable {
            return Err(RetryError::Permanent(err));
        }

        attempt += 1;
        if attempt >= policy.max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(policy.delay_after(attempt - 1)) => {}
        }
    }
}
