use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FollowupError;

/// Message content plus destination; opaque to the dispatch machinery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePayload {
    pub recipient: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Sent => "sent",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Recurrence specification stored with the task. `FixedInterval` repeats a
/// fixed number of minutes after the previous occurrence; `DailyAt` repeats at
/// a fixed wall-clock time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recurrence {
    FixedInterval {
        every_minutes: i64,
        end_at: Option<DateTime<Utc>>,
    },
    DailyAt {
        time: NaiveTime,
        end_at: Option<DateTime<Utc>>,
    },
}

impl Recurrence {
    pub fn end_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Recurrence::FixedInterval { end_at, .. } => *end_at,
            Recurrence::DailyAt { end_at, .. } => *end_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowupTask {
    pub id: Uuid,
    pub due_at: DateTime<Utc>,
    pub status: TaskStatus,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    #[serde(flatten)]
    pub payload: MessagePayload,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FollowupTask {
    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.due_at <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFollowupRequest {
    pub recipient: String,
    pub body: String,
    /// Omitted means "due immediately".
    pub due_at: Option<DateTime<Utc>>,
    pub recurrence: Option<Recurrence>,
}

impl CreateFollowupRequest {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), FollowupError> {
        if self.recipient.trim().is_empty() {
            return Err(FollowupError::ValidationError(
                "Recipient must not be empty".to_string(),
            ));
        }
        if self.body.trim().is_empty() {
            return Err(FollowupError::ValidationError(
                "Message body must not be empty".to_string(),
            ));
        }
        if let Some(recurrence) = &self.recurrence {
            if let Recurrence::FixedInterval { every_minutes, .. } = recurrence {
                if *every_minutes <= 0 {
                    return Err(FollowupError::ValidationError(
                        "Recurrence interval must be positive".to_string(),
                    ));
                }
            }
            if let Some(end_at) = recurrence.end_at() {
                if end_at <= now {
                    return Err(FollowupError::ValidationError(
                        "Recurrence end date must be in the future".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// The two independently reported due-task passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    OneShot,
    Recurring,
}

impl TaskKind {
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::OneShot => "one-shot",
            TaskKind::Recurring => "recurring",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCounts {
    pub sent: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchReport {
    pub one_shot: DispatchCounts,
    pub recurring: DispatchCounts,
    /// True when the trigger found a cycle already in progress and did nothing.
    pub skipped: bool,
}

impl DispatchReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn total_sent(&self) -> u32 {
        self.one_shot.sent + self.recurring.sent
    }

    pub fn total_failed(&self) -> u32 {
        self.one_shot.failed + self.recurring.failed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDispatchRequest {
    pub task_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkDispatchOutcome {
    pub succeeded_ids: Vec<Uuid>,
    pub failed_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub max_retries: u32,
    pub base_retry_delay_ms: u64,
    pub poll_interval_seconds: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_ms: 1000,
            poll_interval_seconds: 60,
        }
    }
}
