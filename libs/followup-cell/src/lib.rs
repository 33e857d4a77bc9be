pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::*;
pub use models::*;
pub use router::create_followup_router;
pub use services::*;

use std::sync::Arc;

use shared_config::AppConfig;

/// Shared state for the follow-up cell: one poller instance per process so the
/// overlapping-run guard actually covers every trigger path.
pub struct FollowupState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn TaskStore>,
    pub poller: Arc<DispatchPoller>,
}

impl FollowupState {
    pub fn from_config(config: Arc<AppConfig>, dispatch_config: DispatchConfig) -> Self {
        let store: Arc<dyn TaskStore> = Arc::new(SupabaseTaskStore::new(&config));
        let sender: Arc<dyn MessageSender> = Arc::new(WhatsAppSender::new(&config));
        Self::new(config, store, sender, dispatch_config)
    }

    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn TaskStore>,
        sender: Arc<dyn MessageSender>,
        dispatch_config: DispatchConfig,
    ) -> Self {
        let poller = Arc::new(DispatchPoller::new(
            Arc::clone(&store),
            sender,
            &dispatch_config,
        ));
        Self {
            config,
            store,
            poller,
        }
    }
}
