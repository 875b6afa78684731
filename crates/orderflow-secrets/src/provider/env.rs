//! Environment variable secret provider.
//!
//! Maps logical secret names to environment variables using a
//! stage-prefixed uppercase convention, so one host can carry secrets for
//! several deployment stages side by side:
//! `webhook_signing_secret` at stage `prod` resolves to
//! `ORDERFLOW_PROD_WEBHOOK_SIGNING_SECRET`.

use async_trait::async_trait;

use crate::{SecretError, SecretProvider, SecretValue};

/// Secret provider that reads stage-scoped environment variables.
#[derive(Debug)]
pub struct EnvSecretProvider {
    stage: String,
}

impl EnvSecretProvider {
    /// Create a provider scoped to the given deployment stage.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
        }
    }

    fn resolve_env_var_name(&self, logical_name: &str) -> String {
        format!(
            "ORDERFLOW_{}_{}",
            self.stage.to_uppercase(),
            logical_name.to_uppercase()
        )
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<SecretValue, SecretError> {
        let env_var = self.resolve_env_var_name(name);

        match std::env::var(&env_var) {
            Ok(value) if !value.is_empty() => {
                tracing::debug!(
                    secret_name = name,
                    env_var = %env_var,
                    "Secret loaded from environment variable"
                );
                Ok(SecretValue::new(name, value.into_bytes()))
            }
            // Empty value treated as not found
            Ok(_) | Err(std::env::VarError::NotPresent) => {
                Err(SecretError::NotFound {
                    name: name.to_string(),
                })
            }
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::InvalidValue {
                name: name.to_string(),
                detail: format!("environment variable {env_var} is not valid unicode"),
            }),
        }
    }

    fn provider_name(&self) -> &'static str {
        "env"
    }
}
