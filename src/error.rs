//! Error types for the outreach pipeline.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outbound channel (SMS / email provider) errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Rate limited on channel {name}")]
    RateLimited { name: String },

    #[error("Invalid address on channel {name}: {reason}")]
    InvalidAddress { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Performance-scoring API errors.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("Scoring request failed: {0}")]
    RequestFailed(String),

    #[error("Scoring request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Scoring API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid scoring response: {0}")]
    InvalidResponse(String),
}

/// Pipeline orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Lead {0} not found")]
    LeadNotFound(Uuid),

    #[error("Message {0} not found")]
    MessageNotFound(Uuid),

    #[error("Lead {id} cannot be paused into status {target}")]
    InvalidPauseTarget { id: Uuid, target: String },

    #[error("No provider configured for channel {0}")]
    ProviderMissing(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
