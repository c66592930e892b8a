//! Classified service errors.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::codes;
use crate::observability::metrics;

/// What part of the system a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    RateLimiting,
    Database,
    Api,
    Validation,
    System,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::RateLimiting => "rate_limiting",
            ErrorCategory::Database => "database",
            ErrorCategory::Api => "api",
            ErrorCategory::Validation => "validation",
            ErrorCategory::System => "system",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a failure is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a failure happened and on whose behalf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Logical operation name (e.g. `personalize_page`).
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Free-form details. Keys are snake_case.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A failure classified by category and severity.
///
/// Construct at the failure site, propagate with `?`, and let the retry
/// policy and circuit breaker act on the classification rather than on the
/// message text.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ServiceError {
    code: String,
    message: String,
    category: ErrorCategory,
    severity: Severity,
    context: ErrorContext,
    timestamp: DateTime<Utc>,
}

impl ServiceError {
    /// Create an error with medium severity in the system category.
    pub fn new(message: impl Into<String>, code: impl Into<String>, context: ErrorContext) -> Self {
        Self::classified(message, code, context, Severity::Medium, ErrorCategory::System)
    }

    /// Create an error with an explicit classification.
    pub fn classified(
        message: impl Into<String>,
        code: impl Into<String>,
        context: ErrorContext,
        severity: Severity,
        category: ErrorCategory,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            category,
            severity,
            context,
            timestamp: Utc::now(),
        }
    }

    /// A caller exhausted its request budget.
    ///
    /// Carries the data the caller needs to back off or serve from cache.
    pub fn rate_limit_exceeded(
        context: ErrorContext,
        limit: u32,
        reset_time: DateTime<Utc>,
        retry_after_secs: u64,
    ) -> Self {
        let context = context
            .with_metadata("limit", limit)
            .with_metadata("reset_time", reset_time.to_rfc3339())
            .with_metadata("retry_after", retry_after_secs);
        Self::classified(
            format!("Rate limit exceeded, retry after {retry_after_secs}s"),
            codes::RATE_LIMIT_EXCEEDED,
            context,
            Severity::Medium,
            ErrorCategory::RateLimiting,
        )
    }

    pub fn auth_failed(reason: impl Into<String>, context: ErrorContext) -> Self {
        Self::classified(
            format!("Authentication failed: {}", reason.into()),
            codes::AUTH_FAILED,
            context,
            Severity::High,
            ErrorCategory::Authentication,
        )
    }

    /// Wrap a failure reported by the database driver.
    pub fn database(cause: &dyn std::error::Error, context: ErrorContext) -> Self {
        let message = format!("Database operation '{}' failed: {}", context.operation, cause);
        let context = context.with_metadata("cause", cause.to_string());
        Self::classified(
            message,
            codes::DATABASE_ERROR,
            context,
            Severity::High,
            ErrorCategory::Database,
        )
    }

    /// An upstream API answered with a failure status.
    pub fn api(
        endpoint: impl Into<String>,
        status: u16,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        let endpoint = endpoint.into();
        let severity = if status >= 500 { Severity::High } else { Severity::Medium };
        let message = format!("API call to {} failed with status {}: {}", endpoint, status, message.into());
        let context = context.with_endpoint(endpoint).with_metadata("status", status);
        Self::classified(message, codes::API_ERROR, context, severity, ErrorCategory::Api)
    }

    pub fn validation(
        field: impl Into<String>,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        let field = field.into();
        let message = format!("Validation failed for '{}': {}", field, message.into());
        let context = context.with_metadata("field", field);
        Self::classified(
            message,
            codes::VALIDATION_ERROR,
            context,
            Severity::Low,
            ErrorCategory::Validation,
        )
    }

    pub fn internal(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::classified(
            message,
            codes::INTERNAL_ERROR,
            context,
            Severity::High,
            ErrorCategory::System,
        )
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Add a metadata entry. Existing context is kept.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.context.component = Some(component.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.context.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.context.session_id = Some(session_id.into());
        self
    }

    /// Back-off hint attached by [`ServiceError::rate_limit_exceeded`].
    pub fn retry_after(&self) -> Option<Duration> {
        self.context
            .metadata
            .get("retry_after")
            .and_then(Value::as_u64)
            .map(Duration::from_secs)
    }

    pub fn reset_time(&self) -> Option<DateTime<Utc>> {
        self.context
            .metadata
            .get("reset_time")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Plain record form for monitoring sinks.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({ "code": self.code, "message": self.message })
        })
    }

    /// Emit the error as a structured event and count it.
    pub fn report(&self) {
        let record = self.to_json();
        match self.severity {
            Severity::Low => tracing::debug!(code = %self.code, category = %self.category, error = %record, "Service error"),
            Severity::Medium => tracing::info!(code = %self.code, category = %self.category, error = %record, "Service error"),
            Severity::High => tracing::warn!(code = %self.code, category = %self.category, error = %record, "Service error"),
            Severity::Critical => tracing::error!(code = %self.code, category = %self.category, error = %record, "Service error"),
        }
        metrics::record_error(self.category, self.severity);
    }
}
