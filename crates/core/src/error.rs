use thiserror::Error;

/// Failures raised by adapters and collaborators inside one attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to build request: {0}")]
    Build(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out")]
    Timeout,
}
