//! Process-wide executor defaults.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toolrelay_core::{RetryPolicy, RetryPolicyOverride};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_GLOBAL_CONCURRENCY: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Default timeout must be positive")]
    InvalidTimeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorSettings {
    pub default_timeout_ms: u64,
    pub global_concurrency: usize,
    pub default_retry: RetryPolicy,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            global_concurrency: DEFAULT_GLOBAL_CONCURRENCY,
            default_retry: RetryPolicy::default(),
        }
    }
}

/// Partial change to [`ExecutorSettings`]. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
    #[serde(default)]
    pub global_concurrency: Option<usize>,
    #[serde(default)]
    pub default_retry: Option<RetryPolicyOverride>,
}

impl ExecutorSettings {
    /// Clamp out-of-range values and reject the ones that cannot be repaired.
    pub fn validated(mut self) -> Result<Self, SettingsError> {
        if self.default_timeout_ms == 0 {
            return Err(SettingsError::InvalidTimeout);
        }
        self.global_concurrency = self.global_concurrency.max(1);
        self.default_retry = RetryPolicyOverride::from(&self.default_retry).normalize(&RetryPolicy::default());
        Ok(self)
    }

    /// New settings with `update` applied on top of `self`.
    pub fn apply(&self, update: &SettingsUpdate) -> Result<Self, SettingsError> {
        let mut next = self.clone();
        if let Some(timeout) = update.default_timeout_ms {
            next.default_timeout_ms = timeout;
        }
        if let Some(concurrency) = update.global_concurrency {
            next.global_concurrency = concurrency;
        }
        if let Some(retry) = &update.default_retry {
            next.default_retry = RetryPolicyOverride::from(&self.default_retry)
                .overlay(retry)
                .normalize(&self.default_retry);
        }
        next.validated()
    }
}
