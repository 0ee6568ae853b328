//! Toolrelay Core
//!
//! Shared data model for the tool execution pipeline: tool records, execution
//! requests and results, the stable error taxonomy, retry policies, events and
//! the collaborator contracts (credentials, clock) the pipeline relies on.

pub mod clock;
pub mod credentials;
pub mod error;
pub mod events;
pub mod result;
pub mod retry;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use credentials::{CredentialError, CredentialResolver, StaticCredentials};
pub use error::AdapterError;
pub use events::{AdapterStreamEvent, ExecutionEvent, ExecutionStatus};
pub use result::{ErrorCode, ExecutionError, ExecutionFailure, ExecutionResult, ExecutionSuccess};
pub use retry::{compute_backoff_ms, RetryPolicy, RetryPolicyOverride};
pub use tokio_util::sync::CancellationToken;
pub use types::*;
