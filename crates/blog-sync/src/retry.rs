use std::future::Future;
use std::time::Duration;

use backoff::future::retry_notify;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SyncResult;

/// How remote calls are retried.
///
/// Only transient errors (network and timeout) are retried. The local merge
/// is never retried, only the remote call in front of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Every failure is terminal for the invocation
    #[default]
    None,
    /// Retry transient failures with exponential backoff
    Bounded {
        /// Total attempts including the first one
        max_attempts: u32,
        /// Delay before the first retry
        initial_interval_ms: u64,
        /// Upper bound for a single delay
        max_interval_ms: u64,
    },
}

impl RetryPolicy {
    pub fn bounded(max_attempts: u32) -> Self {
        RetryPolicy::Bounded {
            max_attempts,
            initial_interval_ms: 200,
            max_interval_ms: 5_000,
        }
    }

    /// Maximum number of times a call is issued
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryPolicy::None => 1,
            RetryPolicy::Bounded { max_attempts, .. } => (*max_attempts).max(1),
        }
    }

    /// Run `operation` under this policy
    pub async fn run<T, F, Fut>(&self, name: &str, mut operation: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let (initial, max) = match self {
            RetryPolicy::None => return operation().await,
            RetryPolicy::Bounded {
                initial_interval_ms,
                max_interval_ms,
                ..
            } => (*initial_interval_ms, *max_interval_ms),
        };

        let max_attempts = self.max_attempts();
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(initial))
            .with_max_interval(Duration::from_millis(max.max(initial)))
            .with_max_elapsed_time(None)
            .build();

        let mut attempt = 0u32;
        let attempt_once = || {
            attempt += 1;
            let this_attempt = attempt;
            let call = operation();
            async move {
                match call.await {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_transient() && this_attempt < max_attempts => {
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        };

        retry_notify(backoff, attempt_once, |err, delay| {
            warn!("Retrying {} after {:?} due to error: {}", name, delay, err);
        })
        .await
    }
}
