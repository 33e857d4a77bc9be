use std::sync::Arc;

use axum::{routing::get, Router};

use followup_cell::{create_followup_router, FollowupState};

pub fn create_router(state: Arc<FollowupState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic CRM follow-up API is running!" }))
        .nest("/followups", create_followup_router(state))
}
