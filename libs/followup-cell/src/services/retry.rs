use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::debug;

/// Exponential backoff policy: the wait before retry `n` (1-based) is
/// `base_delay * 2^(n-1)`. No jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay * 2u32.saturating_pow(exponent)
    }
}

/// Progress hooks invoked by the executor. `on_retry` fires before each
/// backoff wait with the 1-based retry number; `on_exhausted` fires exactly
/// once when all attempts have failed.
pub trait RetryObserver: Send + Sync {
    fn on_retry(&self, _retry: u32) {}
    fn on_exhausted(&self) {}
}

struct NoopObserver;

impl RetryObserver for NoopObserver {}

/// Successful outcome together with the number of attempts it took.
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("Operation failed after {attempts} attempts: {last}")]
    Exhausted { last: E, attempts: u32 },

    #[error("Operation cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Cancelled { attempts } => *attempts,
        }
    }
}

/// Runs an asynchronous operation with exponential backoff. Each `execute`
/// call owns its own attempt state; concurrent calls on the same executor are
/// not coordinated. `cancel` interrupts any pending backoff wait and prevents
/// further invocations of the wrapped operation.
pub struct RetryExecutor {
    policy: RetryPolicy,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            policy,
            cancel_tx,
            cancel_rx,
        }
    }

    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<Retried<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute_observed(op, &NoopObserver).await
    }

    pub async fn execute_observed<T, E, F, Fut>(
        &self,
        mut op: F,
        observer: &dyn RetryObserver,
    ) -> Result<Retried<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut cancel_rx = self.cancel_rx.clone();
        let mut attempts = 0u32;

        loop {
            if *cancel_rx.borrow() {
                return Err(RetryError::Cancelled { attempts });
            }

            attempts += 1;
            match op().await {
                Ok(value) => return Ok(Retried { value, attempts }),
                Err(e) => {
                    // Total budget is one initial attempt plus max_retries.
                    if attempts > self.policy.max_retries {
                        observer.on_exhausted();
                        return Err(RetryError::Exhausted { last: e, attempts });
                    }

                    let delay = self.policy.backoff_delay(attempts);
                    debug!(
                        "Attempt {} failed ({}), retrying in {:?}",
                        attempts, e, delay
                    );
                    observer.on_retry(attempts);

                    tokio::select! {
                        _ = sleep(delay) => {}
                        changed = cancel_rx.changed() => {
                            if changed.is_err() || *cancel_rx.borrow() {
                                return Err(RetryError::Cancelled { attempts });
                            }
                        }
                    }
                }
            }
        }
    }
}
