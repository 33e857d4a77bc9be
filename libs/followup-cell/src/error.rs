use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum FollowupError {
    #[error("Task store error: {0}")]
    StoreError(String),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Task {id} is already {status}")]
    TerminalTask { id: Uuid, status: String },

    #[error("Message delivery failed: {0}")]
    DeliveryError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Messaging provider is not configured")]
    NotConfigured,
}
