//! Toolrelay Executor
//!
//! Runs tool calls through adapter resolution, validation, request building,
//! admission control, timeouts and retries, and reports progress as a stream
//! of events.

pub mod admission;
pub mod orchestrator;
pub mod policy;
pub mod queue;
pub mod runtime;
pub mod settings;

pub use admission::{AdmissionController, AdmissionError, AdmissionPermit};
pub use orchestrator::{ExecuteRequest, Executor};
pub use policy::{resolve_retry_policy, resolve_timeout_ms, MIN_ATTEMPT_TIMEOUT_MS};
pub use queue::{QueueCounters, QueueState, QueueSubscription, QueueTracker};
pub use runtime::ExecutionRuntime;
pub use settings::{ExecutorSettings, SettingsError, SettingsUpdate};
