//! Structured error reports.
//!
//! Every externally observable failure becomes an [`ErrorInfo`]: a numeric
//! code, a taxonomy bucket, a severity, a short message for operators, the
//! technical detail, and the operation it happened in. Reports go to an
//! [`ErrorSink`] and to the client's error observers; they never influence
//! control flow.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use serde::Serialize;

use crate::error::ClientError;

/// Numeric error codes, grouped by thousands per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "u16")]
pub enum ErrorCode {
    TransportDisconnected,
    TransportReadFailed,
    TransportWriteFailed,
    ProtocolCrcFailed,
    ProtocolFrameInvalid,
    ProtocolPayloadInvalid,
    CommandTimeout,
    AliveTimeout,
    DeviceRejected,
    ConfigurationInvalid,
    InternalError,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::TransportDisconnected => 1001,
            Self::TransportReadFailed => 1002,
            Self::TransportWriteFailed => 1003,
            Self::ProtocolCrcFailed => 2001,
            Self::ProtocolFrameInvalid => 2002,
            Self::ProtocolPayloadInvalid => 2003,
            Self::CommandTimeout => 3001,
            Self::AliveTimeout => 3002,
            Self::DeviceRejected => 4001,
            Self::ConfigurationInvalid => 5001,
            Self::InternalError => 9001,
        }
    }

    pub fn category(self) -> ErrorCategory {
        match self.as_u16() / 1000 {
            1 => ErrorCategory::Transport,
            2 => ErrorCategory::Protocol,
            3 => ErrorCategory::Timeout,
            4 => ErrorCategory::Device,
            5 => ErrorCategory::Configuration,
            9 => ErrorCategory::Internal,
            _ => ErrorCategory::Unknown,
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.as_u16()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Unknown,
    Transport,
    Protocol,
    Timeout,
    Device,
    Configuration,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Where an error happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationContext {
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub at: SystemTime,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            detail: None,
            component: None,
            at: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

/// A structured error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub user_message: String,
    pub technical_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_error_code: Option<u16>,
    pub context: OperationContext,
}

impl ErrorInfo {
    /// Build a report from a client error.
    ///
    /// Device and timeout errors are warnings; everything else is an error.
    pub fn from_error(
        err: &ClientError,
        context: OperationContext,
        user_message: impl Into<String>,
    ) -> Self {
        let code = err.code();
        let category = code.category();
        let severity = match category {
            ErrorCategory::Device | ErrorCategory::Timeout => Severity::Warning,
            _ => Severity::Error,
        };
        Self {
            code,
            category,
            severity,
            user_message: user_message.into(),
            technical_message: err.to_string(),
            device_error_code: err.device_error_code(),
            context,
        }
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code, self.context.operation, self.user_message, self.technical_message
        )
    }
}

/// Receives structured error reports.
pub trait ErrorSink: Send + Sync {
    fn publish(&self, error: &ErrorInfo);
}

/// Forwards reports to `tracing` at a level derived from their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn publish(&self, error: &ErrorInfo) {
        let code = error.code.as_u16();
        let operation = error.context.operation.as_str();
        match error.severity {
            Severity::Info => tracing::info!(
                code,
                operation,
                detail = %error.technical_message,
                "{}",
                error.user_message
            ),
            Severity::Warning => tracing::warn!(
                code,
                operation,
                detail = %error.technical_message,
                "{}",
                error.user_message
            ),
            Severity::Error | Severity::Critical => tracing::error!(
                code,
                operation,
                detail = %error.technical_message,
                "{}",
                error.user_message
            ),
        }
    }
}

/// Keeps every report in memory, in publication order.
#[derive(Debug, Default)]
pub struct MemoryErrorSink {
    errors: Mutex<Vec<ErrorInfo>>,
}

impl MemoryErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the reports collected so far.
    pub fn errors(&self) -> Vec<ErrorInfo> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of collected reports with the given code.
    pub fn count(&self, code: ErrorCode) -> usize {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.code == code)
            .count()
    }
}

impl ErrorSink for MemoryErrorSink {
    fn publish(&self, error: &ErrorInfo) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.clone());
    }
}
