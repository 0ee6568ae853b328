//! Retry policy types and backoff math.

use serde::{Deserialize, Serialize};

/// Effective, normalized retry policy. Missing fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub backoff_multiplier: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: None,
            retry_on_status: vec![429, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }
}

/// Partial retry policy as stored on a tool or passed by a caller.
///
/// Numbers are kept as `f64` so persisted values like `2.7` or `-1` are
/// accepted and normalized rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicyOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_on_status: Option<Vec<u16>>,
}

impl RetryPolicyOverride {
    /// Fields set in `other` win. Status lists are replaced, never merged.
    pub fn overlay(mut self, other: &RetryPolicyOverride) -> Self {
        if other.max_retries.is_some() {
            self.max_retries = other.max_retries;
        }
        if other.backoff_ms.is_some() {
            self.backoff_ms = other.backoff_ms;
        }
        if other.backoff_multiplier.is_some() {
            self.backoff_multiplier = other.backoff_multiplier;
        }
        if other.max_backoff_ms.is_some() {
            self.max_backoff_ms = other.max_backoff_ms;
        }
        if let Some(statuses) = &other.retry_on_status {
            self.retry_on_status = Some(statuses.clone());
        }
        self
    }

    /// Clamp into an effective policy, using `fallback` for unset fields.
    pub fn normalize(&self, fallback: &RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_retries: self
                .max_retries
                .map(|v| clamp_non_negative(v) as u32)
                .unwrap_or(fallback.max_retries),
            backoff_ms: self
                .backoff_ms
                .map(|v| clamp_non_negative(v) as u64)
                .unwrap_or(fallback.backoff_ms),
            backoff_multiplier: self
                .backoff_multiplier
                .filter(|v| v.is_finite())
                .map(|v| v.max(1.0))
                .unwrap_or_else(|| fallback.backoff_multiplier.max(1.0)),
            max_backoff_ms: match self.max_backoff_ms {
                Some(v) if v.is_finite() => Some(clamp_non_negative(v) as u64),
                Some(_) => None,
                None => fallback.max_backoff_ms,
            },
            retry_on_status: self
                .retry_on_status
                .clone()
                .unwrap_or_else(|| fallback.retry_on_status.clone()),
        }
    }
}

impl From<&RetryPolicy> for RetryPolicyOverride {
    fn from(policy: &RetryPolicy) -> Self {
        Self {
            max_retries: Some(policy.max_retries as f64),
            backoff_ms: Some(policy.backoff_ms as f64),
            backoff_multiplier: Some(policy.backoff_multiplier),
            max_backoff_ms: policy.max_backoff_ms.map(|v| v as f64),
            retry_on_status: Some(policy.retry_on_status.clone()),
        }
    }
}

fn clamp_non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.trunc().max(0.0)
    } else {
        0.0
    }
}

/// Delay before retry number `attempt` (0-indexed).
///
/// `min(round(backoff_ms * multiplier^attempt), max_backoff_ms)`.
pub fn compute_backoff_ms(policy: &RetryPolicy, attempt: u32) -> u64 {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = policy.backoff_ms as f64 * policy.backoff_multiplier.max(1.0).powi(exponent);
    // f64 -> u64 casts saturate, so an overflowing product lands on u64::MAX.
    let delay = raw.round().max(0.0) as u64;
    match policy.max_backoff_ms {
        Some(cap) => delay.min(cap),
        None => delay,
    }
}
