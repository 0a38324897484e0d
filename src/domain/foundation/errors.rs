//! Error types for the domain layer.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// Error codes organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Validation errors
    ValidationFailed,

    // Not found errors
    EventLogEntryNotFound,
    FailedMessageChainNotFound,
    FailedMessageNotFound,

    // State errors
    InvalidStateTransition,

    // Event shape errors
    UnknownEventKind,
    SerializationFailed,
    DeserializationFailed,

    // Broker errors
    BrokerUnavailable,
    PublishFailed,
    PublishTimeout,
    HandlerFailed,

    // Infrastructure errors
    TransientStoreFault,
    DatabaseError,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::EventLogEntryNotFound => "EVENT_LOG_ENTRY_NOT_FOUND",
            ErrorCode::FailedMessageChainNotFound => "FAILED_MESSAGE_CHAIN_NOT_FOUND",
            ErrorCode::FailedMessageNotFound => "FAILED_MESSAGE_NOT_FOUND",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::UnknownEventKind => "UNKNOWN_EVENT_KIND",
            ErrorCode::SerializationFailed => "SERIALIZATION_FAILED",
            ErrorCode::DeserializationFailed => "DESERIALIZATION_FAILED",
            ErrorCode::BrokerUnavailable => "BROKER_UNAVAILABLE",
            ErrorCode::PublishFailed => "PUBLISH_FAILED",
            ErrorCode::PublishTimeout => "PUBLISH_TIMEOUT",
            ErrorCode::HandlerFailed => "HANDLER_FAILED",
            ErrorCode::TransientStoreFault => "TRANSIENT_STORE_FAULT",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Standard domain error with code, message, and optional details.
#[derive(Debug, Clone)]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
    pub details: HashMap<String, String>,
}

impl DomainError {
    /// Creates a new domain error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// Creates a validation error for a specific field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message).with_detail("field", field.into())
    }

    /// Creates an error for an event kind that no registry entry resolves.
    pub fn unknown_kind(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self::new(
            ErrorCode::UnknownEventKind,
            format!("Event kind '{}' is not registered", kind),
        )
        .with_detail("kind", kind)
    }

    /// Creates a store fault that the unit of work may retry.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransientStoreFault, message)
    }

    /// Adds a detail to the error.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Returns true if retrying the same store work may succeed.
    pub fn is_transient(&self) -> bool {
        self.code == ErrorCode::TransientStoreFault
    }

    /// Returns true for failures raised by the broker side of a publish.
    pub fn is_broker_fault(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::BrokerUnavailable | ErrorCode::PublishFailed | ErrorCode::PublishTimeout
        )
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for DomainError {}
