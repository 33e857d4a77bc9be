use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use followup_cell::{DispatchConfig, FollowupScheduler, FollowupState};
use shared_config::AppConfig;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Clinic CRM follow-up API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());
    if !config.is_messaging_configured() {
        warn!("Messaging provider not configured - follow-up delivery will fail");
    }

    // Wire the follow-up cell: one poller instance shared by the HTTP trigger
    // and the background scheduler
    let dispatch_config = DispatchConfig {
        poll_interval_seconds: config.followup_poll_interval_seconds,
        ..DispatchConfig::default()
    };
    let state = Arc::new(FollowupState::from_config(
        config.clone(),
        dispatch_config,
    ));

    // Start the background dispatch scheduler
    let scheduler = FollowupScheduler::new(
        Arc::clone(&state.poller),
        Duration::from_secs(config.followup_poll_interval_seconds),
    );
    let scheduler_handle = scheduler.start();

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // Drain the in-flight dispatch cycle before exiting
    info!("HTTP server stopped, draining follow-up scheduler");
    scheduler.shutdown();
    let _ = scheduler_handle.await;
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("Failed to install Ctrl+C handler");
    }
}
