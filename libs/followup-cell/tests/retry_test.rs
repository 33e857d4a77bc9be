use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;

use followup_cell::{RetryError, RetryExecutor, RetryObserver, RetryPolicy};

#[derive(Default)]
struct CountingObserver {
    retries: AtomicU32,
    exhausted: AtomicU32,
}

impl RetryObserver for CountingObserver {
    fn on_retry(&self, _retry: u32) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn backoff_doubles_per_retry() {
    let policy = RetryPolicy::new(3, Duration::from_millis(100));

    assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
    assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
    assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
}

#[tokio::test]
async fn succeeds_on_third_attempt() {
    let executor = RetryExecutor::new(RetryPolicy::new(3, Duration::from_millis(5)));
    let observer = CountingObserver::default();
    let calls = AtomicU32::new(0);

    let result = executor
        .execute_observed(
            || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 3 {
                        Err(format!("boom {}", attempt))
                    } else {
                        Ok(attempt)
                    }
                }
            },
            &observer,
        )
        .await;

    let retried = result.expect("third attempt should succeed");
    assert_eq!(retried.value, 3);
    assert_eq!(retried.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(observer.retries.load(Ordering::SeqCst), 2);
    assert_eq!(observer.exhausted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn surfaces_last_error_when_exhausted() {
    let executor = RetryExecutor::new(RetryPolicy::new(2, Duration::from_millis(5)));
    let observer = CountingObserver::default();
    let calls = AtomicU32::new(0);

    let result: Result<_, RetryError<String>> = executor
        .execute_observed(
            || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err::<(), _>(format!("boom {}", attempt)) }
            },
            &observer,
        )
        .await;

    // 1 initial + 2 retries
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(observer.retries.load(Ordering::SeqCst), 2);
    assert_eq!(observer.exhausted.load(Ordering::SeqCst), 1);
    assert_matches!(
        result,
        Err(RetryError::Exhausted { ref last, attempts: 3 }) if *last == "boom 3"
    );
}

#[tokio::test]
async fn zero_retries_means_single_attempt() {
    let executor = RetryExecutor::new(RetryPolicy::new(0, Duration::from_millis(5)));
    let calls = AtomicU32::new(0);

    let result: Result<_, RetryError<String>> = executor
        .execute(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("boom".to_string()) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_matches!(result, Err(RetryError::Exhausted { attempts: 1, .. }));
}

#[tokio::test]
async fn cancel_interrupts_backoff_wait() {
    let executor = Arc::new(RetryExecutor::new(RetryPolicy::new(
        3,
        Duration::from_secs(5),
    )));
    let calls = Arc::new(AtomicU32::new(0));

    let task_executor = Arc::clone(&executor);
    let task_calls = Arc::clone(&calls);
    let handle = tokio::spawn(async move {
        task_executor
            .execute(move || {
                let calls = Arc::clone(&task_calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), String>("transient failure".to_string())
                }
            })
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    executor.cancel();

    let result = handle.await.expect("retry task should not panic");
    assert_matches!(result, Err(RetryError::Cancelled { attempts: 1 }));
    // The wrapped operation must not run again after cancellation.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(executor.is_cancelled());
}

#[tokio::test]
async fn cancelled_executor_does_not_invoke_operation() {
    let executor = RetryExecutor::new(RetryPolicy::default());
    executor.cancel();

    let calls = AtomicU32::new(0);
    let result: Result<_, RetryError<String>> = executor
        .execute(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(()) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_matches!(result, Err(RetryError::Cancelled { attempts: 0 }));
}
