//! Static in-memory secret provider, used by tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::{SecretError, SecretProvider, SecretValue};

/// Secret provider backed by a fixed map of values.
#[derive(Debug, Default)]
pub struct StaticSecretProvider {
    secrets: HashMap<String, Vec<u8>>,
}

impl StaticSecretProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret, builder-style.
    #[must_use]
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<SecretValue, SecretError> {
        self.secrets
            .get(name)
            .map(|value| SecretValue::new(name, value.clone()))
            .ok_or_else(|| SecretError::NotFound {
                name: name.to_string(),
            })
    }

    fn provider_name(&self) -> &'static str {
        "static"
    }
}
