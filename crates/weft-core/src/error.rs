//! Core error type for the Weft engine.
//!
//! `EngineError` is used throughout the core domain (stores, resolver,
//! state machine). When the `axum` feature is enabled, it also implements
//! `IntoResponse` so it can be used directly as an axum handler error type.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed template or request payload. Rejected before any engine
    /// operation runs.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An operation was attempted from a state that forbids it.
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// A prompt template referenced an undefined or not-yet-available
    /// context variable.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// The external agent call failed or was abandoned.
    #[error("Agent invocation failed: {0}")]
    AgentInvocation(String),

    /// A second operation raced an in-flight step. Retryable by the caller
    /// once the in-flight call resolves.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for EngineError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, message) = match &self {
            EngineError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            EngineError::InvalidStateTransition(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            EngineError::Resolution(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            EngineError::AgentInvocation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            EngineError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            EngineError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            EngineError::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            EngineError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
