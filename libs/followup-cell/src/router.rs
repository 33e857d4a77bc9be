use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{
    cancel_followup, create_followup, dispatch_followups, get_followup, process_due_followups,
};
use crate::FollowupState;

pub fn create_followup_router(state: Arc<FollowupState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(create_followup))
        .route("/{task_id}", get(get_followup))
        .route("/{task_id}/cancel", post(cancel_followup))
        .route("/dispatch", post(dispatch_followups))
        .route("/process", post(process_due_followups))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new().merge(protected_routes).with_state(state)
}
