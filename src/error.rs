//! Error types for the leader-gated workers.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Entity store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store is disconnected")]
    Disconnected,

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Field {field} not defined for entity type {entity_type}")]
    FieldNotFound { entity_type: String, field: String },

    #[error("Unknown notification token: {0}")]
    UnknownToken(String),

    #[error("Store rejected request: {0}")]
    Rejected(String),
}

/// A delivered notification did not carry the context it was subscribed with.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Missing context value at index {index}")]
    MissingContext { index: usize },

    #[error("Context value at index {index} is not a {expected}")]
    WrongType { index: usize, expected: &'static str },

    #[error("Invalid notification: {0}")]
    Invalid(String),
}

/// Outbound transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Send task failed: {0}")]
    TaskFailed(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
