//! Linear retry for notification delivery.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{Error, Result};

/// Default number of delivery attempts (one try plus two retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default wait between attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least 1.
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` is reached, sleeping
/// `policy.interval` between attempts.
///
/// Returns [`Error::DeliveryExhausted`] carrying the last error once every
/// attempt has failed.
pub async fn retry_linear<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => {
                return Err(Error::DeliveryExhausted {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }
            Err(err) => {
                debug!(
                    "Attempt {}/{} failed: {}, retrying in {:?}",
                    attempt, max_attempts, err, policy.interval
                );
                sleeper.sleep(policy.interval).await;
                attempt += 1;
            }
        }
    }
}
