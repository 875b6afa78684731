//! Pluggable secret provider abstraction for the orderflow pipeline.
//!
//! The pipeline needs three secrets at startup: the webhook signing secret,
//! the mail sender address, and the warehouse API credential. This crate
//! provides a `SecretProvider` trait over those lookups so the backing
//! source (environment variables in deployment, static values in tests)
//! stays swappable. Secret values are never logged; `SecretValue`'s `Debug`
//! implementation redacts.

pub mod provider;

use async_trait::async_trait;

pub use provider::env::EnvSecretProvider;
pub use provider::r#static::StaticSecretProvider;

/// Logical secret names the pipeline fetches at startup.
pub mod names {
    /// Shared secret used to verify inbound webhook signatures.
    pub const WEBHOOK_SIGNING_SECRET: &str = "webhook_signing_secret";
    /// Sender address for outbound confirmation mail.
    pub const MAIL_FROM_ADDRESS: &str = "mail_from_address";
    /// Credential presented to the warehouse collaborator.
    pub const WAREHOUSE_API_CREDENTIAL: &str = "warehouse_api_credential";
}

/// Errors returned by secret provider operations.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// Secret not found in the provider.
    #[error("Secret not found: '{name}'")]
    NotFound { name: String },

    /// Provider is unreachable or misconfigured.
    #[error("Secret provider '{provider}' unavailable: {detail}")]
    ProviderUnavailable { provider: String, detail: String },

    /// Secret value is malformed (empty, not UTF-8).
    #[error("Invalid secret value for '{name}': {detail}")]
    InvalidValue { name: String, detail: String },
}

/// A fetched secret. Holds the raw bytes; `Debug` never prints them.
#[derive(Clone)]
pub struct SecretValue {
    name: String,
    value: Vec<u8>,
}

impl SecretValue {
    /// Wrap a secret value under its logical name.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// The logical name this value was fetched under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw secret bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.value
    }

    /// The secret as UTF-8, or `InvalidValue` if it is not.
    pub fn as_str(&self) -> Result<&str, SecretError> {
        std::str::from_utf8(&self.value).map_err(|_| SecretError::InvalidValue {
            name: self.name.clone(),
            detail: "not valid UTF-8".to_string(),
        })
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretValue")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Abstraction over secret retrieval backends.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Fetch a secret by logical name.
    async fn get_secret(&self, name: &str) -> Result<SecretValue, SecretError>;

    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}
