use async_trait::async_trait;
use chrono::{DateTime, Utc};
use toolrelay_core::{CredentialError, CredentialResolver};
use tracing::debug;

pub const SECRET_ENV_PREFIX: &str = "TOOLRELAY_SECRET_";

/// Environment variable holding the secret for `credential_id`.
pub fn secret_var(credential_id: &str) -> String {
    let suffix: String = credential_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", SECRET_ENV_PREFIX, suffix)
}

/// Reads secrets from `TOOLRELAY_SECRET_<ID>` variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

#[async_trait]
impl CredentialResolver for EnvCredentials {
    async fn resolve(&self, credential_id: &str) -> Result<String, CredentialError> {
        let var = secret_var(credential_id);
        std::env::var(&var)
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CredentialError::NotFound(format!("{} (set {})", credential_id, var)))
    }

    async fn mark_used(&self, credential_id: &str, at: DateTime<Utc>) -> Result<(), CredentialError> {
        debug!("Credential {} used at {}", credential_id, at.to_rfc3339());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_var_naming() {
        assert_eq!(secret_var("openai-key"), "TOOLRELAY_SECRET_OPENAI_KEY");
        assert_eq!(secret_var("svc.token"), "TOOLRELAY_SECRET_SVC_TOKEN");
    }

    #[tokio::test]
    async fn test_resolves_from_environment() {
        std::env::set_var("TOOLRELAY_SECRET_APP_TEST_TOKEN", "abc");
        let secret = EnvCredentials.resolve("app-test-token").await.unwrap();
        assert_eq!(secret, "abc");
        std::env::remove_var("TOOLRELAY_SECRET_APP_TEST_TOKEN");
    }

    #[tokio::test]
    async fn test_missing_secret_names_the_variable() {
        let err = EnvCredentials.resolve("app-test-absent").await.unwrap_err();
        assert!(err.to_string().contains("TOOLRELAY_SECRET_APP_TEST_ABSENT"));
    }
}
