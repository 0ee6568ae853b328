//! Credential resolver contract.
//!
//! Secrets live outside this crate; tools only carry an opaque credential id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Credential store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve the secret value for a credential id.
    async fn resolve(&self, credential_id: &str) -> Result<String, CredentialError>;

    /// Record that the credential was used at `at`.
    async fn mark_used(&self, _credential_id: &str, _at: DateTime<Utc>) -> Result<(), CredentialError> {
        Ok(())
    }
}

/// In-memory resolver backed by a fixed map of secrets.
#[derive(Default)]
pub struct StaticCredentials {
    secrets: HashMap<String, String>,
    last_used: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets.insert(id.into(), secret.into());
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, secret: impl Into<String>) {
        self.secrets.insert(id.into(), secret.into());
    }

    pub fn last_used(&self, id: &str) -> Option<DateTime<Utc>> {
        self.last_used.lock().get(id).copied()
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn resolve(&self, credential_id: &str) -> Result<String, CredentialError> {
        self.secrets
            .get(credential_id)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(credential_id.to_string()))
    }

    async fn mark_used(&self, credential_id: &str, at: DateTime<Utc>) -> Result<(), CredentialError> {
        self.last_used.lock().insert(credential_id.to_string(), at);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_credentials_resolve() {
        let creds = StaticCredentials::new().with_secret("github", "ghp_123");
        assert_eq!(creds.resolve("github").await.unwrap(), "ghp_123");
        assert_eq!(
            creds.resolve("missing").await,
            Err(CredentialError::NotFound("missing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_mark_used_records_timestamp() {
        let creds = StaticCredentials::new().with_secret("github", "ghp_123");
        assert!(creds.last_used("github").is_none());
        let now = Utc::now();
        creds.mark_used("github", now).await.unwrap();
        assert_eq!(creds.last_used("github"), Some(now));
    }
}
