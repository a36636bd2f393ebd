//! Client configuration.
//!
//! Configuration can be built in code or loaded with [`ClientConfig::load`],
//! which layers (later sources override earlier ones):
//!
//! 1. Built-in defaults (region `us-east-1`, no prefix, 60 s recreate delay,
//!    5 s poll interval, 30 s request timeout)
//! 2. An optional file; format follows the extension (`.yaml`, `.toml`, `.json`)
//! 3. Environment variables prefixed `SQS_QUEUE__`, e.g.
//!    `SQS_QUEUE__QUEUE_NAME_PREFIX=app-` or `SQS_QUEUE__CREDENTIALS__ACCESS_KEY_ID=...`
//!
//! When no credentials are configured the standard `AWS_ACCESS_KEY_ID`,
//! `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN` variables are used.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Environment prefix for configuration overrides
pub const ENV_PREFIX: &str = "SQS_QUEUE";

const DEFAULT_REGION: &str = "us-east-1";

/// Static AWS credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Read credentials from the standard AWS environment variables
    pub fn from_env() -> Option<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Configuration for queue client initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub region: String,
    pub credentials: Option<Credentials>,
    /// Prepended to every queue name that does not already carry it
    pub queue_name_prefix: String,
    /// Override for the queue service endpoint (e.g. LocalStack)
    pub endpoint: Option<String>,
    /// Override for the identity service endpoint
    pub sts_endpoint: Option<String>,
    pub queue_recreate_delay_secs: u64,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            credentials: None,
            queue_name_prefix: String::new(),
            endpoint: None,
            sts_endpoint: None,
            queue_recreate_delay_secs: 60,
            poll_interval_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.queue_name_prefix = prefix.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_sts_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.sts_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_secs = interval.as_secs();
        self
    }

    pub fn with_queue_recreate_delay(mut self, delay: Duration) -> Self {
        self.queue_recreate_delay_secs = delay.as_secs();
        self
    }

    /// Load configuration from an optional file plus `SQS_QUEUE__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        let mut client_config: ClientConfig =
            settings
                .try_deserialize()
                .map_err(|e| ConfigurationError::Parsing {
                    message: e.to_string(),
                })?;

        if client_config.credentials.is_none() {
            client_config.credentials = Credentials::from_env();
        }

        client_config.validate()?;
        Ok(client_config)
    }

    /// Check that the configuration can be used to build a client
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.region.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "region".to_string(),
            });
        }

        if let Some(credentials) = &self.credentials {
            if credentials.access_key_id.is_empty() || credentials.secret_access_key.is_empty() {
                return Err(ConfigurationError::Invalid {
                    message: "credentials need both an access key id and a secret access key"
                        .to_string(),
                });
            }
        }

        for (key, endpoint) in [("endpoint", &self.endpoint), ("sts_endpoint", &self.sts_endpoint)] {
            if let Some(endpoint) = endpoint {
                url::Url::parse(endpoint).map_err(|e| ConfigurationError::Invalid {
                    message: format!("{} '{}' is not a valid URL: {}", key, endpoint, e),
                })?;
            }
        }

        Ok(())
    }

    pub fn queue_recreate_delay(&self) -> Duration {
        Duration::from_secs(self.queue_recreate_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Queue service endpoint for the configured region
    pub fn sqs_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://sqs.{}.amazonaws.com", self.region))
    }

    /// Identity service endpoint for the configured region
    pub fn identity_endpoint(&self) -> String {
        self.sts_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://sts.{}.amazonaws.com", self.region))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
