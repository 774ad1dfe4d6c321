//! # Application Error Types
//!
//! This module defines the error taxonomy used throughout the storefront bot.
//! Every failure a state handler can hit is represented here so the dispatch
//! boundary can log it uniformly and decide whether the session may advance.

use std::fmt;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum BotError {
    /// Commerce API call failed (non-success HTTP status or network fault)
    ExternalService {
        status: Option<u16>,
        detail: String,
    },
    /// Chat gateway operation failed (send/delete)
    Gateway(String),
    /// Session store read/write failed
    SessionStore(String),
    /// Session holds a state name not in the handler table (data corruption)
    UnknownState { chat_id: i64, state: String },
    /// Session read before `/start` ever ran for this chat
    MissingSession { chat_id: i64 },
    /// Event carried neither text nor a callback payload
    MalformedEvent,
    /// Configuration validation errors
    Config(String),
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotError::ExternalService { status, detail } => match status {
                Some(code) => write!(f, "[COMMERCE] HTTP {}: {}", code, detail),
                None => write!(f, "[COMMERCE] {}", detail),
            },
            BotError::Gateway(msg) => write!(f, "[GATEWAY] {}", msg),
            BotError::SessionStore(msg) => write!(f, "[SESSION] {}", msg),
            BotError::UnknownState { chat_id, state } => {
                write!(f, "[STATE] chat {} holds unknown state {:?}", chat_id, state)
            }
            BotError::MissingSession { chat_id } => {
                write!(f, "[STATE] no session stored for chat {}", chat_id)
            }
            BotError::MalformedEvent => write!(f, "[EVENT] neither text nor callback payload"),
            BotError::Config(msg) => write!(f, "[CONFIG] {}", msg),
        }
    }
}

impl std::error::Error for BotError {}

impl From<sqlx::Error> for BotError {
    fn from(err: sqlx::Error) -> Self {
        BotError::SessionStore(err.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::SessionStore(format!("scratch (de)serialization failed: {}", err))
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::ExternalService {
            status: err.status().map(|s| s.as_u16()),
            detail: err.to_string(),
        }
    }
}

impl From<teloxide::RequestError> for BotError {
    fn from(err: teloxide::RequestError) -> Self {
        BotError::Gateway(err.to_string())
    }
}

/// Result type alias for convenience
pub type BotResult<T> = Result<T, BotError>;

/// Standardized error logging utilities for consistent error reporting across the application
pub mod error_logging {
    use tracing::error;

    /// Log a handler failure caught at the dispatch boundary
    pub fn log_dispatch_error(error: &impl std::fmt::Display, chat_id: i64, state: Option<&str>) {
        error!(
            error = %error,
            chat_id = %chat_id,
            state = ?state,
            "Event dispatch failed; session state left unchanged"
        );
    }

    /// Log commerce API call failures with operation context
    pub fn log_commerce_error(
        error: &impl std::fmt::Display,
        operation: &str,
        status: Option<u16>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            status = ?status,
            "Commerce API operation failed"
        );
    }

    /// Log chat gateway failures with the outbound operation name
    pub fn log_gateway_error(error: &impl std::fmt::Display, operation: &str, chat_id: i64) {
        error!(
            error = %error,
            operation = %operation,
            chat_id = %chat_id,
            "Chat gateway operation failed"
        );
    }
}
