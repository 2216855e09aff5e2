//! Error types for blogcore
//!
//! Every failure in the request pipeline is an [`AppError`] tagged with one
//! kind from a closed set. The HTTP boundary turns it into the JSON envelope
//! built by [`AppError::to_response`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthorized,
    Forbidden,
    Internal,
    Database,
    RateLimited,
    Timeout,
    Cancelled,
}

impl ErrorKind {
    /// HTTP status the boundary should answer with
    pub fn status_hint(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Timeout => 408,
            ErrorKind::RateLimited => 429,
            ErrorKind::Cancelled => 499,
            ErrorKind::Database | ErrorKind::Internal => 500,
        }
    }

    /// Wire code used in the error envelope
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::Database => "DATABASE",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }

    /// Whether a caller may retry the failed operation.
    /// Cancellation is never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::RateLimited)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One violated field rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offending_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            offending_value: None,
            request_id: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.offending_value = Some(value.into());
        self
    }

    pub fn with_request_id(mut self, request_id: Option<&str>) -> Self {
        self.request_id = request_id.map(str::to_string);
        self
    }
}

/// Taxonomy-tagged error carried unchanged through every layer.
///
/// `Display` renders only the public message; the wrapped cause stays
/// reachable through [`std::error::Error::source`] for logging.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
    details: BTreeMap<String, String>,
    field_errors: Vec<FieldError>,
    request_id: Option<String>,
    timestamp: DateTime<Utc>,
    #[source]
    source: Option<BoxError>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: BTreeMap::new(),
            field_errors: Vec::new(),
            request_id: None,
            timestamp: Utc::now(),
            source: None,
        }
    }

    /// Wrap a lower-level failure. The cause is kept as `source` and never
    /// leaks into the public message.
    pub fn wrap<E>(cause: E, kind: ErrorKind, message: impl Into<String>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut err = Self::new(kind, message);
        // Re-wrapping keeps the original correlation id
        if let Some(inner) = (&cause as &(dyn std::error::Error + 'static)).downcast_ref::<AppError>() {
            err.request_id = inner.request_id.clone();
        }
        err.source = Some(Box::new(cause));
        err
    }

    /// A validation failure with exactly one detail entry
    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::from_field_errors(vec![FieldError::new(field, message)])
    }

    /// Collapse an ordered list of field errors into one validation error.
    /// The detail map keeps the last message per field.
    pub fn from_field_errors(field_errors: Vec<FieldError>) -> Self {
        let mut err = Self::new(ErrorKind::Validation, "validation failed");
        for field_error in &field_errors {
            err.details
                .insert(field_error.field.clone(), field_error.message.clone());
        }
        err.request_id = field_errors.iter().find_map(|fe| fe.request_id.clone());
        err.field_errors = field_errors;
        err
    }

    pub fn timeout_error(operation: &str) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("{} timed out", operation),
        )
    }

    pub fn cancellation_error(operation: &str) -> Self {
        Self::new(
            ErrorKind::Cancelled,
            format!("{} was cancelled", operation),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Classify a driver error raised while performing `operation`
    pub fn from_db(err: sqlx::Error, operation: &str) -> Self {
        let (kind, message) = match &err {
            sqlx::Error::RowNotFound => (ErrorKind::NotFound, format!("{}: record not found", operation)),
            sqlx::Error::PoolTimedOut => (ErrorKind::Timeout, format!("{} timed out", operation)),
            _ => (ErrorKind::Database, format!("{} failed", operation)),
        };
        Self::wrap(err, kind, message)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.details.insert(key.into(), message.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }

    /// Violations in the order they were recorded
    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn status_hint(&self) -> u16 {
        self.kind.status_hint()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            error: ErrorBody {
                code: self.kind,
                message: self.message.clone(),
                details: self.details.clone(),
                request_id: self.request_id.clone(),
                timestamp: self.timestamp,
            },
        }
    }
}

/// Error envelope written by the HTTP boundary
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}
