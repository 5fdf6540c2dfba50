//! Wire-level constants, header helpers and request signing.
//!
//! # Module Organization
//!
//! ```text
//! protocol/
//! ├── headers  - Header line, Content-Type boundary and date helpers
//! └── signing  - Shared-key request signer
//! ```

pub mod headers;
pub mod signing;

pub use headers::{
    decode_etag, encode_key_segment, format_ms_date, format_query, format_resource,
    parse_boundary, parse_header_line,
};
pub use signing::RequestSigner;

/// Protocol constants.
pub mod constants {
    /// Service version sent as `x-ms-version`.
    pub const API_VERSION: &str = "2011-08-18";

    /// Value for `DataServiceVersion` and `MaxDataServiceVersion`.
    pub const DATA_SERVICE_VERSION: &str = "2.0;NetFx";

    /// Default request `Content-Type`.
    pub const ATOM_CONTENT_TYPE: &str = "application/atom+xml";

    /// `Content-Type` of an entity inside a changeset.
    pub const ATOM_ENTRY_CONTENT_TYPE: &str = "application/atom+xml;type=entry";

    /// `Content-Type` of a changeset part.
    pub const HTTP_CONTENT_TYPE: &str = "application/http";

    /// `Content-Type` prefix of batch bodies.
    pub const MULTIPART_MIXED: &str = "multipart/mixed";

    /// Development storage account name.
    pub const DEV_ACCOUNT: &str = "devstoreaccount1";

    /// Well-known development storage key.
    pub const DEV_ACCOUNT_KEY: &str =
        "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

    /// Development storage table endpoint.
    pub const DEV_ENDPOINT: &str = "http://127.0.0.1:10002/devstoreaccount1";

    /// Status of an accepted batch.
    pub const BATCH_ACCEPTED: u16 = 202;

    /// Status of a sub-response without body.
    pub const NO_CONTENT: u16 = 204;

    /// XML namespaces of the entity document.
    pub mod namespaces {
        /// Default Atom namespace
        pub const ATOM: &str = "http://www.w3.org/2005/Atom";
        /// Data namespace, prefix `d`
        pub const DATA: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices";
        /// Metadata namespace, prefix `m`
        pub const METADATA: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/metadata";
    }

    /// Header names. Lookups on responses use the lowercase form.
    pub mod headers {
        /// `Authorization`
        pub const AUTHORIZATION: &str = "Authorization";
        /// `x-ms-date`
        pub const MS_DATE: &str = "x-ms-date";
        /// `x-ms-version`
        pub const MS_VERSION: &str = "x-ms-version";
        /// `DataServiceVersion`
        pub const DATA_SERVICE_VERSION: &str = "DataServiceVersion";
        /// `MaxDataServiceVersion`
        pub const MAX_DATA_SERVICE_VERSION: &str = "MaxDataServiceVersion";
        /// `Content-Type`
        pub const CONTENT_TYPE: &str = "Content-Type";
        /// `Content-Length`
        pub const CONTENT_LENGTH: &str = "Content-Length";
        /// `Content-MD5`
        pub const CONTENT_MD5: &str = "Content-MD5";
        /// `Content-ID`
        pub const CONTENT_ID: &str = "Content-ID";
        /// `Content-Transfer-Encoding`
        pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
        /// `If-Match`
        pub const IF_MATCH: &str = "If-Match";
        /// `ETag`
        pub const ETAG: &str = "ETag";
        /// Continuation partition key of a paged query
        pub const NEXT_PARTITION_KEY: &str = "x-ms-continuation-NextPartitionKey";
        /// Continuation row key of a paged query
        pub const NEXT_ROW_KEY: &str = "x-ms-continuation-NextRowKey";
        /// Continuation table name of a table listing
        pub const NEXT_TABLE_NAME: &str = "x-ms-continuation-NextTableName";
    }
}
