//! Aggregate result of a submitted batch.

use super::parser::{BatchParser, SubResponse};
use crate::codec::parse_service_error;
use crate::error::{Result, ServiceError, TableError};
use crate::protocol::constants::{headers, BATCH_ACCEPTED};
use crate::protocol::parse_boundary;
use crate::response::RestResponse;

/// Outcome of an entity group transaction.
///
/// The transaction commits only when the outer call was accepted and every sub-response
/// succeeded. A single precondition failure means nothing was written.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponse {
    responses: Vec<SubResponse>,
    error_body: Option<String>,
}

impl BatchResponse {
    /// Interpret the outer response of a `$batch` request.
    ///
    /// Anything but 202 Accepted is returned as a service error. The multipart boundary is
    /// taken from the response `Content-Type`.
    pub fn from_response(response: RestResponse) -> Result<Self> {
        if response.status != BATCH_ACCEPTED {
            return Err(response.service_error().into());
        }

        let content_type = response.header(headers::CONTENT_TYPE).ok_or_else(|| {
            TableError::Framing("batch response without Content-Type".to_string())
        })?;
        let boundary = parse_boundary(content_type).ok_or_else(|| {
            TableError::Framing(format!("batch response is not multipart: `{}`", content_type))
        })?;

        Self::parse(boundary, &response.body)
    }

    /// Parse a multipart body with a known outer boundary.
    pub fn parse(batch_boundary: &str, body: &str) -> Result<Self> {
        let parsed = BatchParser::parse(batch_boundary, body)?;
        tracing::debug!(
            responses = parsed.responses.len(),
            batch_error = parsed.error_body.is_some(),
            "parsed batch response"
        );
        Ok(Self {
            responses: parsed.responses,
            error_body: parsed.error_body,
        })
    }

    /// True when every sub-response succeeded and no batch-level error was reported.
    pub fn succeeded(&self) -> bool {
        self.error_body.is_none() && self.responses.iter().all(SubResponse::succeeded)
    }

    /// True when any sub-response reported 412.
    pub fn precondition_failed(&self) -> bool {
        self.responses.iter().any(SubResponse::precondition_failed)
    }

    /// Sub-response for a Content-ID.
    pub fn get(&self, content_id: &str) -> Option<&SubResponse> {
        self.responses.iter().find(|r| r.content_id == content_id)
    }

    /// Sub-response of the operation at `index`.
    pub fn get_index(&self, index: usize) -> Option<&SubResponse> {
        self.get(&index.to_string())
    }

    /// Sub-responses in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &SubResponse> {
        self.responses.iter()
    }

    /// Number of sub-responses.
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// True when the service returned no sub-response.
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// First sub-response with a status of 300 or more.
    pub fn first_failure(&self) -> Option<&SubResponse> {
        self.responses.iter().find(|r| !r.succeeded())
    }

    /// Error text found between changesets, if any.
    pub fn error_body(&self) -> Option<&str> {
        self.error_body.as_deref()
    }

    /// The error this outcome represents, tagged with the failing Content-ID.
    pub fn error(&self) -> Option<ServiceError> {
        if let Some(failed) = self.first_failure() {
            let error = failed.response.service_error();
            return Some(error.with_content_id(failed.content_id.clone()));
        }
        self.error_body
            .as_deref()
            .map(|body| parse_service_error(BATCH_ACCEPTED, body))
    }

    /// Check that each of `operations` operations got exactly one sub-response.
    ///
    /// A Content-ID that is not an operation index, a repeated one, or a missing one is a
    /// framing error.
    pub fn ensure_complete(&self, operations: usize) -> Result<()> {
        let mut answered = vec![false; operations];
        for sub in &self.responses {
            match sub.index().filter(|index| *index < operations) {
                Some(index) if !answered[index] => answered[index] = true,
                _ => {
                    return Err(TableError::Framing(format!(
                        "unexpected sub-response with Content-ID `{}` for {} operations",
                        sub.content_id, operations
                    )))
                }
            }
        }
        match answered.iter().position(|done| !done) {
            Some(missing) => Err(TableError::Framing(format!(
                "no sub-response for operation {}",
                missing
            ))),
            None => Ok(()),
        }
    }

    /// `Ok(self)` when the transaction committed, otherwise the first failure.
    pub fn error_for_status(self) -> Result<Self> {
        match self.error() {
            Some(error) => Err(error.into()),
            None => Ok(self),
        }
    }
}

impl<'a> IntoIterator for &'a BatchResponse {
    type Item = &'a SubResponse;
    type IntoIter = std::slice::Iter<'a, SubResponse>;

    fn into_iter(self) -> Self::IntoIter {
        self.responses.iter()
    }
}
