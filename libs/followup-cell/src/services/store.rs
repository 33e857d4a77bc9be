use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::FollowupError;
use crate::models::{CreateFollowupRequest, FollowupTask, TaskKind};

/// Persistence boundary for follow-up tasks. Mark operations are conditional
/// single-row claims: they succeed only while the row is still `pending`, so a
/// row already taken terminal by another writer is reported back as `false`
/// rather than overwritten.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn query_due(
        &self,
        now: DateTime<Utc>,
        kind: TaskKind,
    ) -> Result<Vec<FollowupTask>, FollowupError>;

    async fn get_task(&self, id: Uuid) -> Result<Option<FollowupTask>, FollowupError>;

    async fn create_task(
        &self,
        spec: &CreateFollowupRequest,
    ) -> Result<FollowupTask, FollowupError>;

    async fn mark_sent(
        &self,
        id: Uuid,
        attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, FollowupError>;

    async fn mark_failed(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, FollowupError>;

    async fn cancel_task(&self, id: Uuid) -> Result<bool, FollowupError>;
}

pub struct SupabaseTaskStore {
    supabase: SupabaseClient,
    service_role_key: String,
}

impl SupabaseTaskStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            service_role_key: config.supabase_service_role_key.clone(),
        }
    }

    fn auth_token(&self) -> Option<&str> {
        if self.service_role_key.is_empty() {
            None
        } else {
            Some(&self.service_role_key)
        }
    }

    fn representation_headers() -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        headers
    }

    fn parse_task(row: Value) -> Result<FollowupTask, FollowupError> {
        serde_json::from_value(row).map_err(FollowupError::SerializationError)
    }

    /// Conditional single-row update: PATCH matching `id` and `status=pending`.
    /// An empty representation means the row was no longer pending.
    async fn claim_pending(&self, id: Uuid, update: Value) -> Result<bool, FollowupError> {
        let path = format!(
            "/rest/v1/followup_tasks?id=eq.{}&status=eq.pending",
            id
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                self.auth_token(),
                Some(update),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| FollowupError::StoreError(e.to_string()))?;

        Ok(!result.is_empty())
    }
}

#[async_trait]
impl TaskStore for SupabaseTaskStore {
    async fn query_due(
        &self,
        now: DateTime<Utc>,
        kind: TaskKind,
    ) -> Result<Vec<FollowupTask>, FollowupError> {
        let recurrence_filter = match kind {
            TaskKind::OneShot => "recurrence=is.null",
            TaskKind::Recurring => "recurrence=not.is.null",
        };
        // Z-suffixed timestamp: an rfc3339 +00:00 offset would reach PostgREST
        // with a raw `+` in the query string and be decoded as a space.
        let now_str = now.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string();
        let path = format!(
            "/rest/v1/followup_tasks?status=eq.pending&due_at=lte.{}&{}&order=due_at.asc",
            now_str, recurrence_filter
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, self.auth_token(), None)
            .await
            .map_err(|e| FollowupError::StoreError(e.to_string()))?;

        debug!("Found {} due {} follow-ups", result.len(), kind.label());

        result.into_iter().map(Self::parse_task).collect()
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<FollowupTask>, FollowupError> {
        let path = format!("/rest/v1/followup_tasks?id=eq.{}", id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, self.auth_token(), None)
            .await
            .map_err(|e| FollowupError::StoreError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => Ok(Some(Self::parse_task(row)?)),
            None => Ok(None),
        }
    }

    async fn create_task(
        &self,
        spec: &CreateFollowupRequest,
    ) -> Result<FollowupTask, FollowupError> {
        let now = Utc::now();
        spec.validate(now)?;

        let task_data = json!({
            "due_at": spec.due_at.unwrap_or(now).to_rfc3339(),
            "status": "pending",
            "recurrence": spec.recurrence,
            "recipient": spec.recipient,
            "body": spec.body,
            "attempt_count": 0,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/followup_tasks",
                self.auth_token(),
                Some(task_data),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| FollowupError::StoreError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| FollowupError::StoreError("Failed to create follow-up task".to_string()))?;

        let task = Self::parse_task(row)?;
        debug!("Follow-up task created with ID: {}", task.id);

        Ok(task)
    }

    async fn mark_sent(
        &self,
        id: Uuid,
        attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, FollowupError> {
        self.claim_pending(
            id,
            json!({
                "status": "sent",
                "attempt_count": attempts,
                "last_attempt_at": at.to_rfc3339(),
                "updated_at": at.to_rfc3339()
            }),
        )
        .await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        reason: &str,
        attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, FollowupError> {
        self.claim_pending(
            id,
            json!({
                "status": "failed",
                "failure_reason": reason,
                "attempt_count": attempts,
                "last_attempt_at": at.to_rfc3339(),
                "updated_at": at.to_rfc3339()
            }),
        )
        .await
    }

    async fn cancel_task(&self, id: Uuid) -> Result<bool, FollowupError> {
        self.claim_pending(
            id,
            json!({
                "status": "cancelled",
                "updated_at": Utc::now().to_rfc3339()
            }),
        )
        .await
    }
}
