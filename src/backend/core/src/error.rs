//! Error handling for Cadence Core.
//!
//! This module provides:
//! - A single error type with machine-readable codes and chaining
//! - HTTP-style status mapping for hosts that surface errors over a transport
//! - User-facing messages kept apart from internal diagnostics
//! - Severity-aware logging and an error counter per code
//!
//! Handler failures during dispatch are a different concern and use
//! [`HandlerError`](crate::events::HandlerError); they are isolated by the
//! dispatcher and never travel back to the publisher.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cadence_core::error::{CadenceError, Result};
//!
//! fn check(end_after_start: bool) -> Result<()> {
//!     if !end_after_start {
//!         return Err(CadenceError::validation("endTime must be after startTime"));
//!     }
//!     Ok(())
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Cadence operations.
pub type Result<T> = std::result::Result<T, CadenceError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Aggregate validation (1000-1099)
    ValidationError,
    InvalidStateTransition,

    // Domain lookups (1100-1199)
    GoalNotFound,
    KeyResultNotFound,
    TaskTemplateNotFound,
    TaskInstanceNotFound,
    ReminderTemplateNotFound,
    ScheduleTaskNotFound,

    // Persistence (2000-2099)
    RepositoryWriteFailed,
    RecordNotFound,
    DuplicateRecord,

    // Serialization / registry (2200-2299)
    SerializationError,
    DeserializationError,
    UnknownEventType,

    // Dispatch (3000-3099)
    DispatcherUnavailable,

    // Configuration (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::ValidationError => 1000,
            Self::InvalidStateTransition => 1003,

            Self::GoalNotFound => 1100,
            Self::KeyResultNotFound => 1101,
            Self::TaskTemplateNotFound => 1102,
            Self::TaskInstanceNotFound => 1103,
            Self::ReminderTemplateNotFound => 1104,
            Self::ScheduleTaskNotFound => 1105,

            Self::RepositoryWriteFailed => 2000,
            Self::RecordNotFound => 2001,
            Self::DuplicateRecord => 2002,

            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,
            Self::UnknownEventType => 2202,

            Self::DispatcherUnavailable => 3001,

            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,

            Self::InternalError => 9000,
        }
    }

    /// HTTP-style status code for hosts that map errors onto a transport.
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::ValidationError | Self::UnknownEventType => 400,

            Self::GoalNotFound
            | Self::KeyResultNotFound
            | Self::TaskTemplateNotFound
            | Self::TaskInstanceNotFound
            | Self::ReminderTemplateNotFound
            | Self::ScheduleTaskNotFound
            | Self::RecordNotFound => 404,

            Self::InvalidStateTransition | Self::DuplicateRecord => 409,

            Self::DispatcherUnavailable => 503,

            Self::RepositoryWriteFailed
            | Self::SerializationError
            | Self::DeserializationError
            | Self::ConfigurationError
            | Self::MissingConfiguration
            | Self::InvalidConfiguration
            | Self::InternalError => 500,
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RepositoryWriteFailed | Self::DispatcherUnavailable)
    }

    /// Whether the error is a synchronous aggregate validation failure.
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError | Self::InvalidStateTransition)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "validation",
            1100..=1199 => "domain",
            2000..=2099 => "persistence",
            2200..=2299 => "serialization",
            3000..=3099 => "dispatch",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad input, rejected transitions, unknown ids)
    Low,
    /// Operational issues (failed writes, lost dispatcher)
    Medium,
    /// System errors (serialization, configuration)
    High,
    /// Bugs
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ValidationError
            | ErrorCode::InvalidStateTransition
            | ErrorCode::GoalNotFound
            | ErrorCode::KeyResultNotFound
            | ErrorCode::TaskTemplateNotFound
            | ErrorCode::TaskInstanceNotFound
            | ErrorCode::ReminderTemplateNotFound
            | ErrorCode::ScheduleTaskNotFound
            | ErrorCode::RecordNotFound
            | ErrorCode::DuplicateRecord
            | ErrorCode::UnknownEventType => Self::Low,

            ErrorCode::RepositoryWriteFailed | ErrorCode::DispatcherUnavailable => Self::Medium,

            ErrorCode::SerializationError
            | ErrorCode::DeserializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (goal, template, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Name of the field that failed validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Cadence Core.
#[derive(Error, Debug)]
pub struct CadenceError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for CadenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl CadenceError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    /// Create a not found error for an arbitrary record.
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("{} not found: {}", entity_type, entity_id),
        )
        .with_details(ErrorDetails::new().with_entity(&entity_type, &entity_id))
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create a validation error bound to a field.
    pub fn invalid_field(field: &str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
            .with_details(ErrorDetails::new().with_field(field))
    }

    /// Create an invalid state transition error.
    pub fn invalid_transition(entity_type: &str, from: impl fmt::Debug, action: &str) -> Self {
        Self::new(
            ErrorCode::InvalidStateTransition,
            format!("Cannot {} a {} in state {:?}", action, entity_type, from),
        )
        .with_context("from_state", format!("{:?}", from))
        .with_context("action", action)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Get the HTTP-style status code.
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Check if this error is an aggregate validation failure.
    pub fn is_validation(&self) -> bool {
        self.code.is_validation()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "cadence_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| CadenceError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| CadenceError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| CadenceError::new(ErrorCode::RecordNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| CadenceError::new(code, "Resource not found"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for CadenceError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string())
            .with_source(error)
    }
}

impl From<std::io::Error> for CadenceError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, user_msg) = match error.kind() {
            ErrorKind::NotFound => (ErrorCode::RecordNotFound, "File or resource not found"),
            ErrorKind::InvalidData => (ErrorCode::DeserializationError, "Invalid data"),
            _ => (ErrorCode::InternalError, "An I/O error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<anyhow::Error> for CadenceError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<CadenceError>() {
            Ok(cadence_error) => cadence_error,
            Err(error) => Self::with_internal(
                ErrorCode::InternalError,
                "An internal error occurred",
                error.to_string(),
            ),
        }
    }
}

impl From<config::ConfigError> for CadenceError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (
                ErrorCode::ConfigurationError,
                "Configuration error occurred",
            ),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Convenience Constructors for Domain Errors
// ═══════════════════════════════════════════════════════════════════════════════

impl CadenceError {
    /// Create a goal not found error.
    pub fn goal_not_found(goal_uuid: Uuid) -> Self {
        Self::new(ErrorCode::GoalNotFound, format!("Goal not found: {}", goal_uuid))
            .with_details(ErrorDetails::new().with_entity("goal", goal_uuid.to_string()))
    }

    /// Create a key result not found error.
    pub fn key_result_not_found(goal_uuid: Uuid, key_result_uuid: Uuid) -> Self {
        Self::new(
            ErrorCode::KeyResultNotFound,
            format!("Key result {} not found on goal {}", key_result_uuid, goal_uuid),
        )
        .with_details(
            ErrorDetails::new()
                .with_entity("key_result", key_result_uuid.to_string())
                .with_context("goal_uuid", goal_uuid),
        )
    }

    /// Create a task template not found error.
    pub fn task_template_not_found(template_uuid: Uuid) -> Self {
        Self::new(
            ErrorCode::TaskTemplateNotFound,
            format!("Task template not found: {}", template_uuid),
        )
        .with_details(ErrorDetails::new().with_entity("task_template", template_uuid.to_string()))
    }

    /// Create a task instance not found error.
    pub fn task_instance_not_found(instance_uuid: Uuid) -> Self {
        Self::new(
            ErrorCode::TaskInstanceNotFound,
            format!("Task instance not found: {}", instance_uuid),
        )
        .with_details(ErrorDetails::new().with_entity("task_instance", instance_uuid.to_string()))
    }

    /// Create a reminder template not found error.
    pub fn reminder_template_not_found(template_uuid: Uuid) -> Self {
        Self::new(
            ErrorCode::ReminderTemplateNotFound,
            format!("Reminder template not found: {}", template_uuid),
        )
        .with_details(
            ErrorDetails::new().with_entity("reminder_template", template_uuid.to_string()),
        )
    }

    /// Create a schedule task not found error.
    pub fn schedule_task_not_found(task_uuid: Uuid) -> Self {
        Self::new(
            ErrorCode::ScheduleTaskNotFound,
            format!("Schedule task not found: {}", task_uuid),
        )
        .with_details(ErrorDetails::new().with_entity("schedule_task", task_uuid.to_string()))
    }

    /// Create a repository write failure (the commit signal was negative).
    pub fn write_failed(entity_type: &str, entity_id: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::RepositoryWriteFailed,
            format!("Failed to persist {}", entity_type),
            reason,
        )
        .with_details(ErrorDetails::new().with_entity(entity_type, entity_id.to_string()))
    }

    /// Create an unknown event type error.
    pub fn unknown_event_type(name: &str) -> Self {
        Self::new(
            ErrorCode::UnknownEventType,
            format!("Unknown event type: {}", name),
        )
        .with_context("event_type", name)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::ValidationError.http_status(), 400);
        assert_eq!(ErrorCode::GoalNotFound.http_status(), 404);
        assert_eq!(ErrorCode::InvalidStateTransition.http_status(), 409);
        assert_eq!(ErrorCode::RepositoryWriteFailed.http_status(), 500);
    }

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::RepositoryWriteFailed.is_retryable());
        assert!(!ErrorCode::ValidationError.is_retryable());
        assert!(!ErrorCode::KeyResultNotFound.is_retryable());
    }

    #[test]
    fn test_validation_classification() {
        assert!(CadenceError::validation("bad").is_validation());
        assert!(CadenceError::invalid_transition("goal", "Completed", "complete").is_validation());
        assert!(!CadenceError::goal_not_found(Uuid::new_v4()).is_validation());
    }

    #[test]
    fn test_error_creation() {
        let error = CadenceError::goal_not_found(Uuid::new_v4());
        assert_eq!(error.code(), ErrorCode::GoalNotFound);
        assert_eq!(error.details().entity_type.as_deref(), Some("goal"));
        assert_eq!(error.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn test_error_context() {
        let error = CadenceError::invalid_field("endTime", "endTime must be after startTime")
            .with_context("reason", "range");

        assert_eq!(error.details().field.as_deref(), Some("endTime"));
        assert!(error.details().context.contains_key("reason"));
    }

    #[test]
    fn test_option_context() {
        let missing: Option<u32> = None;
        let err = missing.with_error_code(ErrorCode::GoalNotFound).unwrap_err();
        assert_eq!(err.code(), ErrorCode::GoalNotFound);
    }

    #[test]
    fn test_error_display() {
        let error = CadenceError::write_failed("goal", "g-1", "disk full");

        let display = format!("{}", error);
        assert!(display.contains("RepositoryWriteFailed"));
        assert!(display.contains("Failed to persist goal"));
        assert!(display.contains("disk full"));
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(ErrorCode::ValidationError.category(), "validation");
        assert_eq!(ErrorCode::KeyResultNotFound.category(), "domain");
        assert_eq!(ErrorCode::UnknownEventType.category(), "serialization");
        assert_eq!(ErrorCode::DispatcherUnavailable.category(), "dispatch");
    }

    #[test]
    fn test_config_errors_map_to_codes() {
        let missing = CadenceError::from(config::ConfigError::NotFound("service.name".to_string()));
        assert_eq!(missing.code(), ErrorCode::MissingConfiguration);
        assert_eq!(missing.severity(), ErrorSeverity::High);

        let other = CadenceError::from(config::ConfigError::Message("bad value".to_string()));
        assert_eq!(other.code(), ErrorCode::ConfigurationError);
        assert_eq!(other.code().category(), "configuration");
    }
}
