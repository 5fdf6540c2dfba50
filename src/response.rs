//! Parsed single responses.

use crate::codec;
use crate::error::{Result, ServiceError, TableError, PRECONDITION_FAILED};
use crate::protocol::constants::headers;
use crate::protocol::decode_etag;
use crate::types::Entity;
use std::collections::BTreeMap;

/// A response from the service, or one sub-response of a batch.
///
/// Header names are stored lowercase.
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    /// HTTP status code
    pub status: u16,
    /// Headers, keys lowercase
    pub headers: BTreeMap<String, String>,
    /// Body text
    pub body: String,
}

impl RestResponse {
    /// Create a response, lowercasing header names.
    pub fn new<I, K, V>(status: u16, headers: I, body: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            status,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
            body: body.into(),
        }
    }

    /// Status below 300.
    pub fn succeeded(&self) -> bool {
        self.status < 300
    }

    /// Status 412.
    pub fn precondition_failed(&self) -> bool {
        self.status == PRECONDITION_FAILED
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Percent-decoded `ETag` header.
    pub fn etag(&self) -> Option<String> {
        self.header(headers::ETAG).map(decode_etag)
    }

    /// Decode the body as a single entity.
    pub fn entity(&self) -> Result<Entity> {
        codec::decode_entity(&self.body)
    }

    /// Decode the body as a feed of entities.
    pub fn entities(&self) -> Result<Vec<Entity>> {
        codec::decode_feed(&self.body)
    }

    /// Service error described by this response.
    pub fn service_error(&self) -> ServiceError {
        codec::parse_service_error(self.status, &self.body)
    }

    /// `Ok(self)` on success, otherwise the parsed service error.
    pub fn error_for_status(self) -> Result<Self> {
        if self.succeeded() {
            Ok(self)
        } else {
            Err(TableError::from(self.service_error()))
        }
    }
}

impl std::fmt::Display for RestResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = http::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("");
        write!(f, "{} ({})", self.status, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_case_insensitive() {
        let response = RestResponse::new(204, [("ETag", "W/%221%22")], "");
        assert_eq!(response.header("etag"), Some("W/%221%22"));
        assert_eq!(response.header("ETAG"), Some("W/%221%22"));
        assert_eq!(response.etag().as_deref(), Some("W/\"1\""));
    }

    #[test]
    fn test_error_for_status() {
        let ok = RestResponse::new(201, Vec::<(String, String)>::new(), "");
        assert!(ok.error_for_status().is_ok());

        let failed = RestResponse::new(
            412,
            Vec::<(String, String)>::new(),
            "<error><code>UpdateConditionNotSatisfied</code><message>m</message></error>",
        );
        assert!(failed.precondition_failed());
        let err = failed.error_for_status().unwrap_err();
        assert!(err.is_precondition_failed());
        assert_eq!(err.error_code(), Some("UpdateConditionNotSatisfied"));
    }

    #[test]
    fn test_display() {
        let response = RestResponse::new(404, Vec::<(String, String)>::new(), "");
        assert_eq!(response.to_string(), "404 (Not Found)");
    }
}
