//! Per-call resolution of retry and timeout policy.

use toolrelay_core::{ExecutionError, RawResponse, RetryPolicy, RetryPolicyOverride, Tool};

/// Attempts shorter than this are never scheduled.
pub const MIN_ATTEMPT_TIMEOUT_MS: u64 = 250;

/// Merge retry layers with precedence tool > call > default. Unset fields
/// fall through to the next layer; the result is normalized against
/// `defaults`.
pub fn resolve_retry_policy(
    defaults: &RetryPolicy,
    tool: &Tool,
    call: Option<&RetryPolicyOverride>,
) -> RetryPolicy {
    let mut merged = RetryPolicyOverride::from(defaults);
    if let Some(call) = call {
        merged = merged.overlay(call);
    }
    if let Some(tool_retry) = tool.execution_policy.as_ref().and_then(|p| p.retry.as_ref()) {
        merged = merged.overlay(tool_retry);
    }
    merged.normalize(defaults)
}

/// Per-attempt timeout with precedence tool > call > default.
pub fn resolve_timeout_ms(default_ms: u64, tool: &Tool, call: Option<u64>) -> u64 {
    tool.timeout_override_ms()
        .or(call)
        .unwrap_or(default_ms)
        .max(MIN_ATTEMPT_TIMEOUT_MS)
}

/// What a single attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Response(RawResponse),
    /// Classified failure; retried when its code is retryable.
    Failed(ExecutionError),
    /// Failure reported by the adapter itself through its stream. Final.
    Rejected(ExecutionError),
}

/// `attempt` is zero-based.
pub fn should_retry(policy: &RetryPolicy, attempt: u32, outcome: &AttemptOutcome) -> bool {
    if attempt >= policy.max_retries {
        return false;
    }
    match outcome {
        AttemptOutcome::Response(raw) => policy.is_retryable_status(raw.status),
        AttemptOutcome::Failed(error) => error.code.is_retryable(),
        AttemptOutcome::Rejected(_) => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use toolrelay_core::{ErrorCode, ToolExecutionPolicy};

    fn override_retries(n: f64) -> RetryPolicyOverride {
        RetryPolicyOverride {
            max_retries: Some(n),
            ..Default::default()
        }
    }

    #[test]
    fn test_tool_beats_call_beats_default() {
        let defaults = RetryPolicy::default();
        let call = RetryPolicyOverride {
            max_retries: Some(2.0),
            backoff_ms: Some(10.0),
            ..Default::default()
        };
        let tool = Tool::new("t", "rest").with_policy(ToolExecutionPolicy {
            retry: Some(override_retries(5.0)),
            ..Default::default()
        });

        let policy = resolve_retry_policy(&defaults, &tool, Some(&call));
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.backoff_ms, 10);
        assert_eq!(policy.retry_on_status, defaults.retry_on_status);
    }

    #[test]
    fn test_defaults_apply_without_overrides() {
        let defaults = RetryPolicy {
            max_retries: 3,
            ..Default::default()
        };
        let policy = resolve_retry_policy(&defaults, &Tool::new("t", "rest"), None);
        assert_eq!(policy, defaults);
    }

    #[test]
    fn test_timeout_precedence_and_floor() {
        let tool = Tool::new("t", "rest");
        assert_eq!(resolve_timeout_ms(30_000, &tool, None), 30_000);
        assert_eq!(resolve_timeout_ms(30_000, &tool, Some(1_000)), 1_000);
        assert_eq!(resolve_timeout_ms(30_000, &tool, Some(10)), MIN_ATTEMPT_TIMEOUT_MS);

        let tool = tool.with_policy(ToolExecutionPolicy {
            timeout_ms: Some(2_000),
            ..Default::default()
        });
        assert_eq!(resolve_timeout_ms(30_000, &tool, Some(1_000)), 2_000);
    }

    #[test]
    fn test_retry_decisions() {
        let policy = RetryPolicy {
            max_retries: 1,
            ..Default::default()
        };
        let timeout = AttemptOutcome::Failed(ExecutionError::new(ErrorCode::Timeout, "slow"));
        let cancelled = AttemptOutcome::Failed(ExecutionError::new(ErrorCode::Cancelled, "stop"));
        let rejected = AttemptOutcome::Rejected(ExecutionError::new(ErrorCode::ExecutionError, "no"));

        assert!(should_retry(&policy, 0, &timeout));
        assert!(!should_retry(&policy, 1, &timeout));
        assert!(!should_retry(&policy, 0, &cancelled));
        assert!(!should_retry(&policy, 0, &rejected));
        assert!(should_retry(&policy, 0, &AttemptOutcome::Response(RawResponse::new(503, ""))));
        assert!(!should_retry(&policy, 0, &AttemptOutcome::Response(RawResponse::new(404, ""))));
    }
}
