//! HTTP transport and clock seams.
//!
//! The executor talks to the network only through [`Transport`], and reads the time only
//! through [`Clock`], so both can be replaced in tests.

use super::config::ClientConfig;
use crate::error::{Result, TableError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

/// A fully built request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method, including the non-standard `MERGE`
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Headers in send order
    pub headers: Vec<(String, String)>,
    /// Body; empty for none
    pub body: Bytes,
}

impl HttpRequest {
    /// First header with `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response as received.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Headers, keys lowercase
    pub headers: BTreeMap<String, String>,
    /// Body bytes
    pub body: Bytes,
}

/// Sends one request and returns whatever the server answered.
///
/// Implementations return `Err` only when no response was obtained; error statuses are
/// ordinary responses.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the exchange.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Source of the request date.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// [`Transport`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the underlying client from the timeout, pool and proxy settings.
    pub fn with_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.max_total_connections as usize);

        if !config.proxy_url.is_empty() {
            let proxy = reqwest::Proxy::all(&config.proxy_url)
                .map_err(|e| TableError::Transport(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Wrap an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::from_client(reqwest::Client::new())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TableError::Transport(format!("invalid method {}: {}", request.method, e)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();

        let mut headers = BTreeMap::new();
        for (k, v) in response.headers() {
            if let Ok(val) = v.to_str() {
                headers.insert(k.as_str().to_ascii_lowercase(), val.to_string());
            }
        }

        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header_lookup() {
        let request = HttpRequest {
            method: "GET".into(),
            url: "http://localhost/T".into(),
            headers: vec![("x-ms-version".into(), "2011-08-18".into())],
            body: Bytes::new(),
        };
        assert_eq!(request.header("X-MS-VERSION"), Some("2011-08-18"));
        assert_eq!(request.header("If-Match"), None);
    }

    #[test]
    fn test_with_config_builds_client() {
        let config = ClientConfig {
            request_timeout_ms: 1_000,
            ..ClientConfig::development_storage()
        };
        assert!(ReqwestTransport::with_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_method_fails_before_sending() {
        let transport = ReqwestTransport::default();
        let request = HttpRequest {
            method: "NOT A METHOD".into(),
            url: "http://127.0.0.1:9/T".into(),
            headers: Vec::new(),
            body: Bytes::new(),
        };
        let err = tokio_test::block_on(transport.send(request)).unwrap_err();
        assert!(matches!(err, TableError::Transport(_)));
    }

    #[test]
    fn test_system_clock_is_utc_now() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }
}
