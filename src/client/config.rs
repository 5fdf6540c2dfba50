//! Client configuration.

use super::retry::{RetryPolicy, MAX_RETRIES};
use crate::error::{Result, ValidationError};
use crate::protocol::constants::{DEV_ACCOUNT, DEV_ACCOUNT_KEY, DEV_ENDPOINT};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

/// Settings of a [`TableClient`](super::TableClient).
///
/// ```
/// use tablestore_http::client::{ClientConfig, RetryPolicy};
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     account_name: "myaccount".into(),
///     account_key: "c2VjcmV0".into(),
///     retry: RetryPolicy::fixed(3, Duration::from_secs(1)),
///     ..Default::default()
/// };
/// assert_eq!(config.base_url(), "https://myaccount.table.core.windows.net");
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Storage account name
    pub account_name: String,
    /// Base64 shared key of the account
    pub account_key: String,
    /// Use `https` for the derived endpoint
    pub use_ssl: bool,
    /// Explicit base URL, overriding the derived one
    pub endpoint: Option<String>,
    /// Waits between attempts of a failed call
    pub retry: RetryPolicy,
    /// Timeout of a single HTTP exchange, in milliseconds
    pub request_timeout_ms: u64,
    /// Idle connections kept per host
    pub max_total_connections: u32,
    /// Proxy URL; empty for none
    pub proxy_url: String,
    /// Emit a warning for every retry
    pub enable_logging: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            account_name: String::new(),
            account_key: String::new(),
            use_ssl: true,
            endpoint: None,
            retry: RetryPolicy::none(),
            request_timeout_ms: 30_000,
            max_total_connections: 100,
            proxy_url: String::new(),
            enable_logging: true,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("use_ssl", &self.use_ssl)
            .field("endpoint", &self.endpoint)
            .field("retry", &self.retry)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("max_total_connections", &self.max_total_connections)
            .field("proxy_url", &self.proxy_url)
            .field("enable_logging", &self.enable_logging)
            .finish()
    }
}

impl ClientConfig {
    /// Configuration for an account with the derived public endpoint.
    pub fn new(account_name: impl Into<String>, account_key: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            account_key: account_key.into(),
            ..Default::default()
        }
    }

    /// Local storage emulator with its well-known account.
    pub fn development_storage() -> Self {
        Self {
            account_name: DEV_ACCOUNT.to_string(),
            account_key: DEV_ACCOUNT_KEY.to_string(),
            use_ssl: false,
            endpoint: Some(DEV_ENDPOINT.to_string()),
            ..Default::default()
        }
    }

    /// Read the configuration from `TABLESTORE_*` environment variables.
    ///
    /// `TABLESTORE_ACCOUNT` and `TABLESTORE_KEY` are required. `TABLESTORE_RETRIES` and
    /// `TABLESTORE_RETRY_INTERVAL_MS` together select a fixed retry policy.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ValidationError::InvalidConfig(format!("{} must be set", name)))
        };
        let parsed = |name: &str| -> Result<Option<u64>> {
            match lookup(name) {
                Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
                    ValidationError::InvalidConfig(format!("{} is not a number: `{}`", name, raw))
                        .into()
                }),
                None => Ok(None),
            }
        };

        let mut config = Self::new(required("TABLESTORE_ACCOUNT")?, required("TABLESTORE_KEY")?);

        if let Some(raw) = lookup("TABLESTORE_USE_SSL") {
            config.use_ssl = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ValidationError::InvalidConfig(format!(
                        "TABLESTORE_USE_SSL must be a boolean: `{}`",
                        raw
                    ))
                    .into())
                }
            };
        }
        config.endpoint = lookup("TABLESTORE_ENDPOINT").filter(|v| !v.trim().is_empty());
        if let Some(timeout) = parsed("TABLESTORE_TIMEOUT_MS")? {
            config.request_timeout_ms = timeout;
        }
        if let Some(retries) = parsed("TABLESTORE_RETRIES")? {
            let retries = usize::try_from(retries)
                .ok()
                .filter(|r| *r <= MAX_RETRIES)
                .ok_or_else(|| {
                    ValidationError::InvalidConfig(format!(
                        "TABLESTORE_RETRIES must be at most {}: `{}`",
                        MAX_RETRIES, retries
                    ))
                })?;
            let interval = parsed("TABLESTORE_RETRY_INTERVAL_MS")?.unwrap_or(1_000);
            config.retry = RetryPolicy::fixed(retries, Duration::from_millis(interval));
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a storage connection string.
    ///
    /// Supports `UseDevelopmentStorage=true`, or `AccountName`, `AccountKey`, an optional
    /// `DefaultEndpointsProtocol` (`http` when absent) and an optional `TableEndpoint`.
    /// Keys are case-insensitive.
    ///
    /// ```
    /// use tablestore_http::client::ClientConfig;
    ///
    /// let config = ClientConfig::from_connection_string(
    ///     "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=c2VjcmV0IQ==",
    /// ).unwrap();
    /// assert_eq!(config.base_url(), "https://acct.table.core.windows.net");
    /// ```
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let mut values = HashMap::new();
        for element in connection_string.split(';').filter(|e| !e.trim().is_empty()) {
            let (key, value) = element.split_once('=').ok_or_else(|| {
                ValidationError::InvalidConfig(format!("malformed connection string element `{}`", element))
            })?;
            values.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        let dev_storage = values
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if dev_storage {
            if values.contains_key("accountname") || values.contains_key("accountkey") {
                return Err(ValidationError::InvalidConfig(
                    "development storage takes no account name or key".to_string(),
                )
                .into());
            }
            return Ok(Self::development_storage());
        }

        let use_ssl = match values.get("defaultendpointsprotocol").map(|p| p.to_ascii_lowercase()) {
            None => false,
            Some(protocol) if protocol == "http" => false,
            Some(protocol) if protocol == "https" => true,
            Some(protocol) => {
                return Err(
                    ValidationError::InvalidConfig(format!("unsupported protocol `{}`", protocol)).into(),
                )
            }
        };

        let take = |name: &str| {
            values.get(name).cloned().ok_or_else(|| {
                ValidationError::InvalidConfig(format!("connection string has no {}", name))
            })
        };

        let mut config = Self::new(take("accountname")?, take("accountkey")?);
        config.use_ssl = use_ssl;
        config.endpoint = values.get("tableendpoint").cloned();
        config.validate()?;
        Ok(config)
    }

    /// Check the account name and that the key decodes.
    pub fn validate(&self) -> Result<()> {
        if self.account_name.trim().is_empty() {
            return Err(ValidationError::InvalidConfig("account name is empty".to_string()).into());
        }
        BASE64
            .decode(self.account_key.trim())
            .map_err(|e| ValidationError::InvalidAccountKey(e.to_string()))?;
        Ok(())
    }

    /// Base URL requests are resolved against, without trailing slash.
    pub fn base_url(&self) -> String {
        if let Some(endpoint) = &self.endpoint {
            return endpoint.trim_end_matches('/').to_string();
        }
        if self.account_name == DEV_ACCOUNT {
            return DEV_ENDPOINT.to_string();
        }
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}.table.core.windows.net", scheme, self.account_name)
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
