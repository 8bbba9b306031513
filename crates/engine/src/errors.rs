//! Error types for the automation engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad experiment definition, rejected before any state mutation
    #[error("Invalid experiment definition: {0}")]
    Validation(String),

    /// Statistics called with a degenerate sample
    #[error("Invalid sample size: {0}")]
    InvalidSampleSize(String),

    /// Statistics called with out-of-range parameters
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("Variant not found: {0}")]
    VariantNotFound(String),

    /// Lifecycle transition not allowed from the current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A single check's execution failed; isolated, never fatal
    #[error("Scheduling failure: {0}")]
    Scheduling(String),

    /// Best-effort delivery exhausted its retries
    #[error("Notification delivery failure: {0}")]
    NotificationDelivery(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
