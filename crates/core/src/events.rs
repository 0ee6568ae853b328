//! Progress events emitted while a call is in flight.

use crate::result::ExecutionResult;
use crate::types::RawResponse;
use serde::{Deserialize, Serialize};

/// Pipeline phase, announced before the phase's work begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    ValidatingConfig,
    BuildingRequest,
    Running,
    Executing,
    NormalizingResponse,
    Completed,
    Cancelled,
    Failed,
}

/// Events produced by a streaming adapter for one attempt.
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterStreamEvent {
    Progress { message: String },
    Chunk { data: String },
    Completed { response: RawResponse },
    Failed { message: String },
}

impl AdapterStreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AdapterStreamEvent::Completed { .. } | AdapterStreamEvent::Failed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    Status {
        status: ExecutionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Intermediate adapter output, forwarded as it arrives.
    Adapter { event: AdapterStreamEvent },
    /// Always the last event of a stream.
    Result { result: ExecutionResult },
}

impl ExecutionEvent {
    pub fn status(status: ExecutionStatus) -> Self {
        ExecutionEvent::Status {
            status,
            message: None,
        }
    }

    pub fn status_with(status: ExecutionStatus, message: impl Into<String>) -> Self {
        ExecutionEvent::Status {
            status,
            message: Some(message.into()),
        }
    }
}
