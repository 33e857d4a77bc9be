use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::FollowupError;
use crate::models::{
    BulkDispatchOutcome, CreateFollowupRequest, DispatchConfig, DispatchCounts, DispatchReport,
    FollowupTask, TaskKind,
};
use crate::services::recurrence::plan_next;
use crate::services::retry::{RetryExecutor, RetryPolicy};
use crate::services::sender::MessageSender;
use crate::services::store::TaskStore;

/// Clears the overlap guard when a cycle ends, however it ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Processes due follow-up tasks. The `running` flag is the overlapping-run
/// guard: a trigger that lands while a cycle is in flight is dropped, not
/// queued. One instance is shared by the HTTP trigger and the background
/// scheduler so the guard covers both paths.
pub struct DispatchPoller {
    store: Arc<dyn TaskStore>,
    sender: Arc<dyn MessageSender>,
    retry_policy: RetryPolicy,
    running: AtomicBool,
}

impl DispatchPoller {
    pub fn new(
        store: Arc<dyn TaskStore>,
        sender: Arc<dyn MessageSender>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            store,
            sender,
            retry_policy: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.base_retry_delay_ms),
            ),
            running: AtomicBool::new(false),
        }
    }

    /// Run one dispatch cycle: one-shot pass, then recurring pass, each task
    /// handled sequentially in store order. Safe to call concurrently.
    #[instrument(skip(self))]
    pub async fn process_due_tasks(&self) -> DispatchReport {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Dispatch cycle already in progress, dropping trigger");
            return DispatchReport::skipped();
        }
        let _guard = CycleGuard(&self.running);

        let now = Utc::now();
        let one_shot = self.run_pass(TaskKind::OneShot, now).await;
        let recurring = self.run_pass(TaskKind::Recurring, now).await;

        DispatchReport {
            one_shot,
            recurring,
            skipped: false,
        }
    }

    async fn run_pass(&self, kind: TaskKind, now: DateTime<Utc>) -> DispatchCounts {
        let tasks = match self.store.query_due(now, kind).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("Failed to query due {} follow-ups: {}", kind.label(), e);
                return DispatchCounts::default();
            }
        };

        let mut counts = DispatchCounts::default();

        for task in &tasks {
            match self.dispatch_task(task, now).await {
                Ok(true) => counts.sent += 1,
                // Row was no longer pending at claim time; nothing to record.
                Ok(false) => {}
                Err(e) => {
                    warn!("Follow-up {} failed: {}", task.id, e);
                    counts.failed += 1;
                }
            }
        }

        if counts.failed > 0 {
            warn!(
                "{} {} follow-ups failed to send this cycle",
                counts.failed,
                kind.label()
            );
        }
        if counts.sent > 0 {
            info!("Sent {} {} follow-ups", counts.sent, kind.label());
        }

        counts
    }

    /// Deliver one task with retries. `Ok(true)` means delivered and recorded;
    /// `Ok(false)` means the row was claimed elsewhere before we could record
    /// the send. On exhausted delivery the task is marked failed and the error
    /// is returned for the caller's counters.
    async fn dispatch_task(
        &self,
        task: &FollowupTask,
        now: DateTime<Utc>,
    ) -> Result<bool, FollowupError> {
        let executor = RetryExecutor::new(self.retry_policy.clone());
        let outcome = executor.execute(|| self.sender.send(&task.payload)).await;

        match outcome {
            Ok(retried) => {
                let attempts = task.attempt_count + retried.attempts;
                let claimed = self.store.mark_sent(task.id, attempts, now).await?;
                if !claimed {
                    debug!(
                        "Follow-up {} no longer pending, send not recorded",
                        task.id
                    );
                    return Ok(false);
                }

                if let Some(recurrence) = &task.recurrence {
                    match plan_next(recurrence, task.due_at, now) {
                        Some(next_due) => {
                            let next_spec = CreateFollowupRequest {
                                recipient: task.payload.recipient.clone(),
                                body: task.payload.body.clone(),
                                due_at: Some(next_due),
                                recurrence: Some(recurrence.clone()),
                            };
                            // The send already landed; a failed insert must not
                            // flip this task into the failed counters.
                            match self.store.create_task(&next_spec).await {
                                Ok(next) => debug!(
                                    "Scheduled next occurrence {} of follow-up {} at {}",
                                    next.id, task.id, next_due
                                ),
                                Err(e) => error!(
                                    "Failed to schedule next occurrence of follow-up {}: {}",
                                    task.id, e
                                ),
                            }
                        }
                        None => {
                            debug!("Recurring follow-up {} reached its end date", task.id);
                        }
                    }
                }

                Ok(true)
            }
            Err(retry_err) => {
                let attempts = task.attempt_count + retry_err.attempts();
                let reason = retry_err.to_string();
                if let Err(store_err) = self
                    .store
                    .mark_failed(task.id, &reason, attempts, now)
                    .await
                {
                    error!(
                        "Failed to record failure for follow-up {}: {}",
                        task.id, store_err
                    );
                }
                Err(FollowupError::DeliveryError(reason))
            }
        }
    }

    /// Dispatch an explicit list of tasks regardless of due time; per-id
    /// isolation, ids reported back in success/failure buckets.
    pub async fn dispatch_many(&self, task_ids: &[Uuid]) -> BulkDispatchOutcome {
        let now = Utc::now();
        let mut outcome = BulkDispatchOutcome::default();

        for &id in task_ids {
            match self.dispatch_by_id(id, now).await {
                Ok(()) => outcome.succeeded_ids.push(id),
                Err(e) => {
                    warn!("Bulk dispatch of follow-up {} failed: {}", id, e);
                    outcome.failed_ids.push(id);
                }
            }
        }

        outcome
    }

    async fn dispatch_by_id(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), FollowupError> {
        let task = self
            .store
            .get_task(id)
            .await?
            .ok_or(FollowupError::TaskNotFound(id))?;

        if task.status.is_terminal() {
            return Err(FollowupError::TerminalTask {
                id,
                status: task.status.as_str().to_string(),
            });
        }

        match self.dispatch_task(&task, now).await? {
            true => Ok(()),
            false => Err(FollowupError::TerminalTask {
                id,
                status: "claimed".to_string(),
            }),
        }
    }
}

/// Process-level polling loop around the poller: fires once immediately on
/// start, then on a fixed wall-clock period, independent of any request
/// lifetime. Shutdown drains the in-flight cycle before the handle resolves.
pub struct FollowupScheduler {
    poller: Arc<DispatchPoller>,
    poll_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl FollowupScheduler {
    pub fn new(poller: Arc<DispatchPoller>, poll_interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            poller,
            poll_interval,
            shutdown_tx,
        }
    }

    pub fn start(&self) -> JoinHandle<()> {
        let poller = Arc::clone(&self.poller);
        let poll_interval = self.poll_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(
                "Starting follow-up dispatch scheduler (interval: {:?})",
                poll_interval
            );

            loop {
                let report = poller.process_due_tasks().await;
                if report.skipped {
                    debug!("Scheduler tick skipped, a cycle was already running");
                }

                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Follow-up dispatch scheduler stopped");
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
