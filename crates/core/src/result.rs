//! Execution outcome types and the stable error taxonomy.

use crate::types::{ExecutionRequest, NormalizedResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Stable error codes carried inside failed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AdapterNotFound,
    InvalidToolConfiguration,
    Timeout,
    Cancelled,
    ExecutionError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AdapterNotFound => "adapter_not_found",
            ErrorCode::InvalidToolConfiguration => "invalid_tool_configuration",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::ExecutionError => "execution_error",
        }
    }

    /// Whether an attempt failing with this code may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::Timeout | ErrorCode::ExecutionError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ExecutionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            stack: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSuccess {
    pub request: ExecutionRequest,
    pub response: NormalizedResponse,
    pub request_summary: String,
    pub response_summary: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFailure {
    /// `None` when the call failed before a request was built.
    pub request: Option<ExecutionRequest>,
    pub error: ExecutionError,
    pub duration_ms: u64,
}

/// Settled outcome of one execution call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionResult {
    Success(ExecutionSuccess),
    Failure(ExecutionFailure),
}

impl ExecutionResult {
    pub fn failure(
        request: Option<ExecutionRequest>,
        error: ExecutionError,
        duration_ms: u64,
    ) -> Self {
        ExecutionResult::Failure(ExecutionFailure {
            request,
            error,
            duration_ms,
        })
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            ExecutionResult::Success(_) => None,
            ExecutionResult::Failure(failure) => Some(&failure.error),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error().map(|e| e.code)
    }

    pub fn request(&self) -> Option<&ExecutionRequest> {
        match self {
            ExecutionResult::Success(success) => Some(&success.request),
            ExecutionResult::Failure(failure) => failure.request.as_ref(),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            ExecutionResult::Success(success) => success.duration_ms,
            ExecutionResult::Failure(failure) => failure.duration_ms,
        }
    }
}
