//! Error types for the table storage protocol engine.
//!
//! Errors fall into five families:
//!
//! | Variant | Raised when | Retried |
//! |---------|-------------|---------|
//! | [`TableError::Validation`] | Bad keys, field types, batch contract, configuration | Never |
//! | [`TableError::Framing`] | Multipart batch responses that violate the framing rules | Never |
//! | [`TableError::Decode`] | Entity or error documents that are not well-formed | Never |
//! | [`TableError::Service`] | The service answered with a status of 300 or more | Only for retryable codes |
//! | [`TableError::Transport`] | No response could be obtained | Per retry policy |
//!
//! Precondition failures (HTTP 412) are ordinary service errors; use
//! [`TableError::is_precondition_failed`] to tell them apart.

use std::collections::BTreeMap;
use thiserror::Error;

/// Result type for table storage operations.
pub type Result<T> = std::result::Result<T, TableError>;

/// HTTP status returned on an ETag mismatch.
pub const PRECONDITION_FAILED: u16 = 412;

/// Service error codes the engine considers transient.
pub const RETRYABLE_ERROR_CODES: [&str; 4] = [
    "InternalError",
    "OperationTimedOut",
    "ServerBusy",
    "TableBeingDeleted",
];

/// Errors produced by the protocol engine.
#[derive(Error, Debug)]
pub enum TableError {
    /// Client-side contract violation, detected before anything is sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The multipart batch response broke the framing rules.
    #[error("batch framing error: {0}")]
    Framing(String),

    /// An entity, feed or error document could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The service returned a well-formed failure response.
    #[error(transparent)]
    Service(Box<ServiceError>),

    /// The request failed before any response was obtained.
    #[error("transport error: {0}")]
    Transport(String),
}

impl TableError {
    /// True for transport failures and service errors carrying a transient code.
    pub fn is_retryable(&self) -> bool {
        match self {
            TableError::Transport(_) => true,
            TableError::Service(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// True when the service rejected the request because the ETag did not match.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, TableError::Service(err) if err.is_precondition_failed())
    }

    /// The service error code, if this is a service error that carried one.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            TableError::Service(err) => err.code.as_deref(),
            _ => None,
        }
    }

    /// Content-ID of the failing batch operation, when raised from a batch commit.
    pub fn content_id(&self) -> Option<&str> {
        match self {
            TableError::Service(err) => err.content_id.as_deref(),
            _ => None,
        }
    }
}

impl From<ServiceError> for TableError {
    fn from(err: ServiceError) -> Self {
        TableError::Service(Box::new(err))
    }
}

impl From<quick_xml::Error> for TableError {
    fn from(err: quick_xml::Error) -> Self {
        TableError::Decode(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for TableError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        TableError::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for TableError {
    fn from(err: reqwest::Error) -> Self {
        TableError::Transport(err.to_string())
    }
}

/// Failure reported by the service in a response body.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("service error (status {status}): {}: {message}", .code.as_deref().unwrap_or("<no code>"))]
pub struct ServiceError {
    /// HTTP status code
    pub status: u16,
    /// Service error code (`<code>` element)
    pub code: Option<String>,
    /// Human readable message (`<message>` element)
    pub message: String,
    /// Raw response body
    pub body: String,
    /// Any other child elements of the error document
    pub details: BTreeMap<String, String>,
    /// Content-ID of the batch operation that failed
    pub content_id: Option<String>,
}

impl ServiceError {
    /// Create an error with no body details.
    pub fn new(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            body: String::new(),
            details: BTreeMap::new(),
            content_id: None,
        }
    }

    /// Attach the Content-ID of the batch operation that produced this error.
    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    /// True for HTTP 412.
    pub fn is_precondition_failed(&self) -> bool {
        self.status == PRECONDITION_FAILED
    }

    /// True when the error code belongs to [`RETRYABLE_ERROR_CODES`].
    pub fn is_retryable(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| RETRYABLE_ERROR_CODES.contains(&code))
    }
}

/// Client-side contract violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A dynamic value has no EDM representation.
    #[error("field `{field}` has unsupported type {kind}")]
    UnsupportedFieldType {
        /// Field name
        field: String,
        /// Description of the rejected runtime type
        kind: String,
    },

    /// A partition or row key contains a forbidden character or is too long.
    #[error("invalid {key}: {reason}")]
    InvalidKeyField {
        /// `PartitionKey` or `RowKey`
        key: &'static str,
        /// What is wrong with the value
        reason: String,
    },

    /// Table names are 3 to 63 alphanumerics starting with a letter.
    #[error("invalid table name `{0}`")]
    InvalidTableName(String),

    /// A partition or row key is absent or not a string.
    #[error("{0} must be present and must be a string")]
    MissingKey(&'static str),

    /// The field name cannot be used as a property element name.
    #[error("invalid field name `{0}`")]
    InvalidFieldName(String),

    /// The field name collides with a system property.
    #[error("`{0}` is a reserved property name")]
    ReservedFieldName(String),

    /// A batch operation targets a different partition than the batch.
    #[error("batch is bound to partition `{expected}`, got `{found}`")]
    MixedPartition {
        /// Partition key of the first operation
        expected: String,
        /// Partition key of the rejected operation
        found: String,
    },

    /// A batch may touch each row only once.
    #[error("row `{0}` already has an operation in this batch")]
    DuplicateRow(String),

    /// A batch is limited to [`crate::batch::MAX_OPERATIONS`] operations.
    #[error("batch cannot hold more than {0} operations")]
    TooManyOperations(usize),

    /// A batch with no operations cannot be encoded.
    #[error("batch has no operations")]
    EmptyBatch,

    /// The account key is not valid base64.
    #[error("account key is not valid base64: {0}")]
    InvalidAccountKey(String),

    /// The client configuration is incomplete or malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_codes() {
        let busy = ServiceError::new(503, Some("ServerBusy".into()), "busy");
        assert!(TableError::from(busy).is_retryable());

        let missing = ServiceError::new(404, Some("ResourceNotFound".into()), "gone");
        assert!(!TableError::from(missing).is_retryable());

        let no_code = ServiceError::new(500, None, "");
        assert!(!TableError::from(no_code).is_retryable());
    }

    #[test]
    fn test_transport_is_retryable() {
        assert!(TableError::Transport("reset".into()).is_retryable());
        assert!(!TableError::Framing("bad".into()).is_retryable());
        assert!(!TableError::from(ValidationError::EmptyBatch).is_retryable());
    }

    #[test]
    fn test_precondition_failed() {
        let err = TableError::from(ServiceError::new(412, Some("UpdateConditionNotSatisfied".into()), ""));
        assert!(err.is_precondition_failed());
        assert_eq!(err.error_code(), Some("UpdateConditionNotSatisfied"));
        assert!(!TableError::Transport("x".into()).is_precondition_failed());
    }

    #[test]
    fn test_content_id_context() {
        let err = TableError::from(ServiceError::new(400, None, "bad").with_content_id("2"));
        assert_eq!(err.content_id(), Some("2"));
        assert!(err.to_string().contains("<no code>"));
    }
}
