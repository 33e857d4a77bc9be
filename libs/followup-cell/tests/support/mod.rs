#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use followup_cell::{
    CreateFollowupRequest, DispatchConfig, DispatchPoller, FollowupError, FollowupTask,
    MessagePayload, MessageSender, Recurrence, TaskKind, TaskStatus, TaskStore,
};

pub fn fast_config(max_retries: u32) -> DispatchConfig {
    DispatchConfig {
        max_retries,
        base_retry_delay_ms: 5,
        poll_interval_seconds: 60,
    }
}

pub fn make_poller(
    store: &Arc<InMemoryTaskStore>,
    sender: &Arc<ScriptedSender>,
    max_retries: u32,
) -> DispatchPoller {
    DispatchPoller::new(
        Arc::clone(store) as Arc<dyn TaskStore>,
        Arc::clone(sender) as Arc<dyn MessageSender>,
        &fast_config(max_retries),
    )
}

pub fn one_shot_task(recipient: &str, due_at: DateTime<Utc>) -> FollowupTask {
    let now = Utc::now();
    FollowupTask {
        id: Uuid::new_v4(),
        due_at,
        status: TaskStatus::Pending,
        recurrence: None,
        payload: MessagePayload {
            recipient: recipient.to_string(),
            body: "Hi, just checking in about your consultation.".to_string(),
        },
        last_attempt_at: None,
        attempt_count: 0,
        failure_reason: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn recurring_task(
    recipient: &str,
    due_at: DateTime<Utc>,
    every_minutes: i64,
    end_at: Option<DateTime<Utc>>,
) -> FollowupTask {
    let mut task = one_shot_task(recipient, due_at);
    task.recurrence = Some(Recurrence::FixedInterval {
        every_minutes,
        end_at,
    });
    task
}

/// Simple in-memory task store with the same conditional-claim semantics as
/// the Supabase-backed one.
pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<Uuid, FollowupTask>>,
    fail_mark_sent_for: Mutex<HashSet<Uuid>>,
    fail_create: AtomicBool,
}

impl InMemoryTaskStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(HashMap::new()),
            fail_mark_sent_for: Mutex::new(HashSet::new()),
            fail_create: AtomicBool::new(false),
        })
    }

    pub fn insert(&self, task: FollowupTask) -> Uuid {
        let id = task.id;
        self.tasks.lock().unwrap().insert(id, task);
        id
    }

    pub fn snapshot(&self, id: Uuid) -> Option<FollowupTask> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<FollowupTask> {
        self.tasks.lock().unwrap().values().cloned().collect()
    }

    pub fn pending(&self) -> Vec<FollowupTask> {
        self.all()
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect()
    }

    /// Make mark_sent fail for the given id, to exercise store-error isolation.
    pub fn break_mark_sent(&self, id: Uuid) {
        self.fail_mark_sent_for.lock().unwrap().insert(id);
    }

    /// Make create_task fail, to exercise next-occurrence scheduling errors.
    pub fn break_create_task(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn query_due(
        &self,
        now: DateTime<Utc>,
        kind: TaskKind,
    ) -> Result<Vec<FollowupTask>, FollowupError> {
        let mut due: Vec<FollowupTask> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.is_due(now))
            .filter(|t| match kind {
                TaskKind::OneShot => t.recurrence.is_none(),
                TaskKind::Recurring => t.recurrence.is_some(),
            })
            .cloned()
            .collect();
        due.sort_by_key(|t| t.due_at);
        Ok(due)
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<FollowupTask>, FollowupError> {
        Ok(self.snapshot(id))
    }

    async fn create_task(
        &self,
        spec: &CreateFollowupRequest,
    ) -> Result<FollowupTask, FollowupError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(FollowupError::StoreError(
                "simulated store outage".to_string(),
            ));
        }

        let now = Utc::now();
        spec.validate(now)?;

        let task = FollowupTask {
            id: Uuid::new_v4(),
            due_at: spec.due_at.unwrap_or(now),
            status: TaskStatus::Pending,
            recurrence: spec.recurrence.clone(),
            payload: MessagePayload {
                recipient: spec.recipient.clone(),
                body: spec.body.clone(),
            },
            last_attempt_at: None,
            attempt_count: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.insert(task.clone());
        Ok(task)
    }

    async fn mark_sent(
        &self,
        id: Uuid,
        attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, FollowupError> {
        if self.fail_mark_sent_for.lock().unwrap().contains(&id) {
            return Err(FollowupError::StoreError("simulated store outage".to_string()));
        }
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(&id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Sent;
                task.attempt_count = attempts;
                task.last_attempt_at = Some(at);
                task.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, FollowupError> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(&id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Failed;
                task.failure_reason = Some(reason.to_string());
                task.attempt_count = attempts;
                task.last_attempt_at = Some(at);
                task.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_task(&self, id: Uuid) -> Result<bool, FollowupError> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(&id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Cancelled;
                task.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Sender with scriptable failures and latency.
pub struct ScriptedSender {
    failing_recipients: Mutex<HashSet<String>>,
    fail_first: AtomicI64,
    delay: Mutex<Option<Duration>>,
    calls: AtomicU32,
}

impl ScriptedSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failing_recipients: Mutex::new(HashSet::new()),
            fail_first: AtomicI64::new(0),
            delay: Mutex::new(None),
            calls: AtomicU32::new(0),
        })
    }

    pub fn fail_for(&self, recipient: &str) {
        self.failing_recipients
            .lock()
            .unwrap()
            .insert(recipient.to_string());
    }

    pub fn fail_first(&self, n: i64) {
        self.fail_first.store(n, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSender for ScriptedSender {
    async fn send(&self, payload: &MessagePayload) -> Result<(), FollowupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_first.fetch_sub(1, Ordering::SeqCst) > 0 {
            return Err(FollowupError::DeliveryError(
                "transient provider error".to_string(),
            ));
        }

        if self
            .failing_recipients
            .lock()
            .unwrap()
            .contains(&payload.recipient)
        {
            return Err(FollowupError::DeliveryError(
                "provider rejected message".to_string(),
            ));
        }

        Ok(())
    }
}
