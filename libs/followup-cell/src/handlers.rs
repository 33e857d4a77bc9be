use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use shared_models::{auth::User, error::AppError};
use shared_utils::extractor::require_operator;

use crate::error::FollowupError;
use crate::models::{BulkDispatchRequest, CreateFollowupRequest};
use crate::FollowupState;

fn to_app_error(err: FollowupError) -> AppError {
    match err {
        FollowupError::ValidationError(msg) => AppError::ValidationError(msg),
        FollowupError::TaskNotFound(id) => AppError::NotFound(format!("Follow-up {} not found", id)),
        FollowupError::TerminalTask { id, status } => {
            AppError::BadRequest(format!("Follow-up {} is already {}", id, status))
        }
        FollowupError::StoreError(msg) => AppError::Database(msg),
        FollowupError::DeliveryError(msg) => AppError::ExternalService(msg),
        FollowupError::SerializationError(e) => AppError::Internal(e.to_string()),
        FollowupError::NotConfigured => {
            AppError::Internal("Messaging provider is not configured".to_string())
        }
    }
}

/// Create a follow-up task. Validation problems are surfaced to the caller
/// here, at creation time.
pub async fn create_followup(
    State(state): State<Arc<FollowupState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateFollowupRequest>,
) -> Result<Json<Value>, AppError> {
    require_operator(&user)?;
    info!("Follow-up creation request from user: {}", user.id);

    request.validate(Utc::now()).map_err(to_app_error)?;

    let task = state.store.create_task(&request).await.map_err(|e| {
        error!("Failed to create follow-up task: {}", e);
        to_app_error(e)
    })?;

    Ok(Json(json!({
        "success": true,
        "task": task
    })))
}

/// Fetch a single follow-up task.
pub async fn get_followup(
    State(state): State<Arc<FollowupState>>,
    Extension(user): Extension<User>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_operator(&user)?;

    let task = state
        .store
        .get_task(task_id)
        .await
        .map_err(to_app_error)?
        .ok_or_else(|| AppError::NotFound(format!("Follow-up {} not found", task_id)))?;

    Ok(Json(json!({ "task": task })))
}

/// Cancel a pending follow-up. Best-effort: a task already read into an
/// in-flight dispatch cycle may still be sent.
pub async fn cancel_followup(
    State(state): State<Arc<FollowupState>>,
    Extension(user): Extension<User>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_operator(&user)?;
    info!("Cancel request for follow-up {} from user: {}", task_id, user.id);

    let task = state
        .store
        .get_task(task_id)
        .await
        .map_err(to_app_error)?
        .ok_or_else(|| AppError::NotFound(format!("Follow-up {} not found", task_id)))?;

    let cancelled = state
        .store
        .cancel_task(task_id)
        .await
        .map_err(to_app_error)?;

    if !cancelled {
        return Err(AppError::BadRequest(format!(
            "Follow-up {} is already {}",
            task_id,
            task.status.as_str()
        )));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Follow-up cancelled successfully"
    })))
}

/// Dispatch an explicit list of follow-ups now. Reports counts and id
/// buckets, not error bodies.
pub async fn dispatch_followups(
    State(state): State<Arc<FollowupState>>,
    Extension(user): Extension<User>,
    Json(request): Json<BulkDispatchRequest>,
) -> Result<Json<Value>, AppError> {
    require_operator(&user)?;
    info!(
        "Bulk dispatch of {} follow-ups requested by user: {}",
        request.task_ids.len(),
        user.id
    );

    let outcome = state.poller.dispatch_many(&request.task_ids).await;

    Ok(Json(json!({
        "succeeded": outcome.succeeded_ids.len(),
        "failed": outcome.failed_ids.len(),
        "succeeded_ids": outcome.succeeded_ids,
        "failed_ids": outcome.failed_ids
    })))
}

/// Trigger "process due tasks now". Safe to call while a cycle is already
/// running: the trigger is dropped and reported as skipped.
pub async fn process_due_followups(
    State(state): State<Arc<FollowupState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_operator(&user)?;
    info!("Manual dispatch trigger from user: {}", user.id);

    let report = state.poller.process_due_tasks().await;

    Ok(Json(json!({
        "one_shot": report.one_shot,
        "recurring": report.recurring,
        "skipped": report.skipped
    })))
}
