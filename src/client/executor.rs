//! Signed request execution with retries.

use super::config::ClientConfig;
use super::retry::RetryPolicy;
use super::transport::{Clock, HttpRequest, HttpResponse, ReqwestTransport, SystemClock, Transport};
use crate::batch::{
    batch_content_type, encode_batch, new_batch_boundary, new_changeset_boundary, Batch,
    BatchResponse,
};
use crate::error::{Result, TableError, ValidationError};
use crate::protocol::constants::{headers, API_VERSION, ATOM_CONTENT_TYPE, DATA_SERVICE_VERSION};
use crate::protocol::{format_ms_date, RequestSigner};
use crate::response::RestResponse;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tokio::time::sleep;
use url::Url;

/// One logical request, relative to the account endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    /// HTTP method
    pub method: String,
    /// Resource path, e.g. `Orders(PartitionKey='a',RowKey='1')` or `$batch`
    pub resource: String,
    /// Encoded query string, without `?`
    pub query: Option<String>,
    /// Body content type
    pub content_type: String,
    /// Body text; empty for none
    pub body: String,
    /// `If-Match` value
    pub if_match: Option<String>,
}

impl RestRequest {
    /// Request with an ATOM content type and no body.
    pub fn new(method: &str, resource: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            resource: resource.into(),
            query: None,
            content_type: ATOM_CONTENT_TYPE.to_string(),
            body: String::new(),
            if_match: None,
        }
    }

    /// `GET resource`
    pub fn get(resource: impl Into<String>) -> Self {
        Self::new("GET", resource)
    }

    /// `DELETE resource`
    pub fn delete(resource: impl Into<String>) -> Self {
        Self::new("DELETE", resource)
    }

    /// Attach a body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Attach a query string.
    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    /// Override the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Set `If-Match`.
    pub fn with_if_match(mut self, if_match: Option<String>) -> Self {
        self.if_match = if_match;
        self
    }
}

/// Signs requests, sends them through a [`Transport`] and retries transient failures.
///
/// The executor holds no per-call state; one instance can serve any number of concurrent
/// calls.
#[derive(Clone)]
pub struct RequestExecutor {
    base_url: String,
    signer: RequestSigner,
    retry: RetryPolicy,
    enable_logging: bool,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url)
            .field("signer", &self.signer)
            .field("retry", &self.retry)
            .finish()
    }
}

impl RequestExecutor {
    /// Executor using `reqwest` and the system clock.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::with_config(config)?;
        Self::with_transport(config, Arc::new(transport), Arc::new(SystemClock))
    }

    /// Executor with explicit collaborators.
    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let signer = RequestSigner::new(config.account_name.clone(), &config.account_key)?;
        Ok(Self {
            base_url: config.base_url(),
            signer,
            retry: config.retry.clone(),
            enable_logging: config.enable_logging,
            transport,
            clock,
        })
    }

    /// Base URL resources are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Retry policy in use.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Build the signed wire request, dated now.
    pub fn build(&self, request: &RestRequest) -> Result<HttpRequest> {
        let mut raw = format!("{}/{}", self.base_url, request.resource);
        if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
            raw.push('?');
            raw.push_str(query);
        }
        let url = Url::parse(&raw)
            .map_err(|e| ValidationError::InvalidConfig(format!("invalid request url `{}`: {}", raw, e)))?;

        let ms_date = format_ms_date(self.clock.now());
        let authorization = self.signer.authorization(
            &request.method,
            url.path(),
            &ms_date,
            "",
            &request.content_type,
        );

        let mut headers = vec![
            (headers::MS_DATE.to_string(), ms_date),
            (headers::MS_VERSION.to_string(), API_VERSION.to_string()),
            (headers::DATA_SERVICE_VERSION.to_string(), DATA_SERVICE_VERSION.to_string()),
            (headers::MAX_DATA_SERVICE_VERSION.to_string(), DATA_SERVICE_VERSION.to_string()),
            (headers::CONTENT_TYPE.to_string(), request.content_type.clone()),
            (headers::AUTHORIZATION.to_string(), authorization),
        ];
        if let Some(if_match) = &request.if_match {
            headers.push((headers::IF_MATCH.to_string(), if_match.clone()));
        }

        Ok(HttpRequest {
            method: request.method.clone(),
            url: url.to_string(),
            headers,
            body: Bytes::from(request.body.clone()),
        })
    }

    /// Execute `request`, retrying per the policy.
    ///
    /// Transport failures are returned as errors once they are not retried. A response with
    /// a status of 300 or more is returned as `Ok` once it is not retried, so callers can
    /// decide between tolerating and raising it.
    pub async fn execute(&self, request: &RestRequest) -> Result<RestResponse> {
        let mut retry = 0usize;
        loop {
            let http = self.build(request)?;
            tracing::debug!(
                method = %http.method,
                url = %http.url,
                attempt = retry + 1,
                "sending request"
            );

            let (outcome, reason) = match self.transport.send(http).await {
                Ok(raw) => {
                    let response = into_rest_response(raw)?;
                    if response.succeeded() {
                        return Ok(response);
                    }
                    let error = TableError::from(response.service_error());
                    if !self.retry.should_retry(&error) {
                        return Ok(response);
                    }
                    (Ok(response), error.to_string())
                }
                Err(error) => {
                    if !self.retry.should_retry(&error) {
                        return Err(error);
                    }
                    let reason = error.to_string();
                    (Err(error), reason)
                }
            };

            let Some(delay) = self.retry.interval(retry) else {
                return outcome;
            };
            if self.enable_logging {
                tracing::warn!(
                    "Request failed (attempt {}), retrying after {:?}: {}",
                    retry + 1,
                    delay,
                    reason
                );
            }
            sleep(delay).await;
            retry += 1;
        }
    }

    /// Submit `batch` as one entity group transaction.
    pub async fn execute_batch(&self, batch: &Batch) -> Result<BatchResponse> {
        let batch_boundary = new_batch_boundary();
        let changeset_boundary = new_changeset_boundary();
        let body = encode_batch(batch, &self.base_url, &batch_boundary, &changeset_boundary)?;

        tracing::debug!(
            table = batch.table(),
            operations = batch.len(),
            boundary = %batch_boundary,
            "submitting batch"
        );

        let request = RestRequest::new("POST", "$batch")
            .with_content_type(batch_content_type(&batch_boundary))
            .with_body(body);
        let response = self.execute(&request).await?;
        BatchResponse::from_response(response)
    }
}

fn into_rest_response(raw: HttpResponse) -> Result<RestResponse> {
    let body = String::from_utf8(raw.body.to_vec())
        .map_err(|e| TableError::Decode(format!("response body is not UTF-8: {}", e)))?;
    Ok(RestResponse {
        status: raw.status,
        headers: raw.headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, VecDeque};
    use std::time::Duration;

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2012, 5, 1, 8, 30, 0).unwrap()
        }
    }

    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<HttpResponse>>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.seen.lock().push(request);
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TableError::Transport("script exhausted".into())))
        }
    }

    fn reply(status: u16, body: &str) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: BTreeMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    fn error_body(code: &str) -> String {
        format!("<error><code>{}</code><message>m</message></error>", code)
    }

    fn executor(retry: RetryPolicy, replies: Vec<Result<HttpResponse>>) -> (RequestExecutor, Arc<Scripted>) {
        let transport = Arc::new(Scripted {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        });
        let config = ClientConfig {
            retry,
            enable_logging: false,
            ..ClientConfig::development_storage()
        };
        let executor = RequestExecutor::with_transport(&config, transport.clone(), Arc::new(FixedClock)).unwrap();
        (executor, transport)
    }

    #[test]
    fn test_build_sets_protocol_headers() {
        let (executor, _) = executor(RetryPolicy::none(), vec![]);
        let request = RestRequest::get("Orders(PartitionKey='a',RowKey='1')")
            .with_if_match(Some("*".into()));
        let http = executor.build(&request).unwrap();

        assert_eq!(
            http.url,
            "http://127.0.0.1:10002/devstoreaccount1/Orders(PartitionKey='a',RowKey='1')"
        );
        assert_eq!(http.header("x-ms-date"), Some("Tue, 01 May 2012 08:30:00 GMT"));
        assert_eq!(http.header("x-ms-version"), Some("2011-08-18"));
        assert_eq!(http.header("DataServiceVersion"), Some("2.0;NetFx"));
        assert_eq!(http.header("MaxDataServiceVersion"), Some("2.0;NetFx"));
        assert_eq!(http.header("Content-Type"), Some("application/atom+xml"));
        assert_eq!(http.header("If-Match"), Some("*"));

        let signer = RequestSigner::new("devstoreaccount1", crate::protocol::constants::DEV_ACCOUNT_KEY).unwrap();
        let expected = signer.authorization(
            "GET",
            "/devstoreaccount1/Orders(PartitionKey='a',RowKey='1')",
            "Tue, 01 May 2012 08:30:00 GMT",
            "",
            "application/atom+xml",
        );
        assert_eq!(http.header("Authorization"), Some(expected.as_str()));
    }

    #[test]
    fn test_query_is_not_signed() {
        let (executor, _) = executor(RetryPolicy::none(), vec![]);
        let plain = executor.build(&RestRequest::get("Orders")).unwrap();
        let queried = executor
            .build(&RestRequest::get("Orders").with_query(Some("$top=5".into())))
            .unwrap();
        assert!(queried.url.ends_with("/Orders?$top=5"));
        assert_eq!(plain.header("Authorization"), queried.header("Authorization"));
    }

    #[tokio::test]
    async fn test_success_is_not_retried() {
        let (executor, transport) = executor(
            RetryPolicy::fixed(3, Duration::ZERO),
            vec![reply(200, "ok")],
        );
        let response = executor.execute(&RestRequest::get("T")).await.unwrap();
        assert_eq!(response.body, "ok");
        assert_eq!(transport.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_retryable_code_is_retried_until_success() {
        let (executor, transport) = executor(
            RetryPolicy::fixed(3, Duration::ZERO),
            vec![
                reply(503, &error_body("ServerBusy")),
                Err(TableError::Transport("reset".into())),
                reply(204, ""),
            ],
        );
        let response = executor.execute(&RestRequest::get("T")).await.unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(transport.seen.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_policy_returns_last_response() {
        let (executor, transport) = executor(
            RetryPolicy::fixed(2, Duration::ZERO),
            vec![
                reply(500, &error_body("InternalError")),
                reply(500, &error_body("InternalError")),
                reply(500, &error_body("InternalError")),
                reply(200, ""),
            ],
        );
        let response = executor.execute(&RestRequest::get("T")).await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(transport.seen.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_transport_failure_is_error() {
        let (executor, transport) = executor(RetryPolicy::fixed(1, Duration::ZERO), vec![]);
        let err = executor.execute(&RestRequest::get("T")).await.unwrap_err();
        assert!(matches!(err, TableError::Transport(_)));
        assert_eq!(transport.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_code_returns_immediately() {
        let (executor, transport) = executor(
            RetryPolicy::fixed(5, Duration::ZERO),
            vec![reply(404, &error_body("ResourceNotFound"))],
        );
        let response = executor.execute(&RestRequest::get("T")).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(transport.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected_before_sending() {
        let (executor, transport) = executor(RetryPolicy::none(), vec![]);
        let err = executor.execute_batch(&Batch::new("T")).await.unwrap_err();
        assert!(matches!(err, TableError::Validation(ValidationError::EmptyBatch)));
        assert!(transport.seen.lock().is_empty());
    }
}
