//! Error types for the chat front end and agent container

use axum::http::StatusCode;
use std::fmt;
use thiserror::Error;

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Severity of an event-store failure that is not a missing actor/session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Timeouts, throttling, 5xx: a retry may succeed
    Transient,
    /// Anything the caller cannot fix by retrying
    Fatal,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErrorKind::Transient => write!(f, "transient"),
            StoreErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ChatError {
    // =============================
    // Request & Domain Errors
    // =============================

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not yet created: {0}")]
    NotYetExists(String),

    #[error("Agent runtime error: {0}")]
    Upstream(String),

    #[error("Event store error ({kind}): {message}")]
    Store {
        kind: StoreErrorKind,
        message: String,
    },

    #[error("Language model error: {0}")]
    Model(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Template error: {0}")]
    TemplateError(#[from] minijinja::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ChatError {
    /// Short machine-readable name, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "validation",
            ChatError::NotYetExists(_) => "not_yet_exists",
            ChatError::Upstream(_) => "upstream_invocation",
            ChatError::Store {
                kind: StoreErrorKind::Transient,
                ..
            } => "store_transient",
            ChatError::Store {
                kind: StoreErrorKind::Fatal,
                ..
            } => "store_fatal",
            ChatError::Model(_) => "model",
            ChatError::Config(_) => "config",
            ChatError::TemplateError(_) => "template",
            ChatError::SerializationError(_) => "serialization",
            ChatError::HttpError(_) => "http_client",
            ChatError::IoError(_) => "io",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::NotYetExists(_) => StatusCode::NOT_FOUND,
            ChatError::Store {
                kind: StoreErrorKind::Transient,
                ..
            } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to a caller. Only validation errors carry detail.
    pub fn public_message(&self) -> String {
        match self {
            ChatError::Validation(message) => message.clone(),
            ChatError::NotYetExists(_) => "conversation not found".to_string(),
            ChatError::Upstream(_) | ChatError::Model(_) => {
                "failed to get an answer from the agent".to_string()
            }
            ChatError::Store { .. } => "failed to retrieve conversation history".to_string(),
            _ => "internal server error".to_string(),
        }
    }
}

/// Failure reported by an event store implementation.
///
/// `NotFound` is how a store says the actor or session has not been created yet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal failure: {0}")]
    Fatal(String),
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ChatError::NotYetExists(what),
            StoreError::Transient(message) => ChatError::Store {
                kind: StoreErrorKind::Transient,
                message,
            },
            StoreError::Fatal(message) => ChatError::Store {
                kind: StoreErrorKind::Fatal,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_conversion() {
        let err: ChatError = StoreError::Transient("throttled".into()).into();
        assert_eq!(err.kind(), "store_transient");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err: ChatError = StoreError::NotFound("actor user-1".into()).into();
        assert!(matches!(err, ChatError::NotYetExists(_)));
    }

    #[test]
    fn test_public_message_hides_internal_detail() {
        let err = ChatError::Upstream("http 503 from arn:aws:secret".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("arn"));

        let err = ChatError::Validation("missing field: question".into());
        assert_eq!(err.public_message(), "missing field: question");
    }
}
