//! Error types for the conversational analysis orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Plan construction error: {0}")]
    PlanConstruction(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Data provider error: {0}")]
    Provider(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Context storage error: {0}")]
    ContextStorage(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Transient failures are eligible for bounded retry; everything else
    /// (validation rejections, plan errors, storage errors) is terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            OrchestrationError::Transient(_) => true,
            OrchestrationError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
