#![warn(missing_docs)]

//! # tablestore_http: a table storage protocol engine
//!
//! Client-side engine for a REST table storage service: entities travel as ATOM/EDM XML
//! documents, requests are authenticated with a shared-key HMAC signature, and atomic
//! single-partition writes are sent as multipart entity group transactions.
//!
//! ## Overview
//!
//! The engine is layered:
//!
//! 1. **Signing** - `SharedKey` authorization over a canonical request string
//! 2. **Entity codec** - typed fields to and from `m:properties` documents
//! 3. **Batch codec** - nested `multipart/mixed` requests and a line-oriented response parser
//! 4. **Execution** - a retrying executor over a pluggable async transport
//!
//! ## Key Features
//!
//! - **Typed entities**: fields are an ordered map of [`EdmValue`]s, one variant per EDM type
//! - **Optimistic concurrency**: ETag preconditions with try (`Ok(false)`) and must (`Err`) calls
//! - **Entity group transactions**: up to 100 operations on one partition, all or nothing
//! - **Explicit paging**: continuation tokens are values, never hidden cursors
//! - **Retry policies**: fixed, exponential or explicit waits over a fixed transient code set
//! - **HTTP Status Codes**:
//!   - `202 Accepted` - Batch received; outcomes are in the multipart body
//!   - `204 No Content` - Write applied
//!   - `404 Not Found` - `get` returns `None`
//!   - `409 Conflict` - `try_insert` returns `false`
//!   - `412 Precondition Failed` - ETag mismatch; `try_*` returns `false`
//!
//! ## Batch Usage
//!
//! ```no_run
//! use tablestore_http::{ClientConfig, Entity, TableServiceClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = TableServiceClient::new(&ClientConfig::development_storage())?;
//!     let orders = service.table("Orders")?;
//!
//!     let mut batch = orders.batch();
//!     batch.insert(Entity::new("customer-1", "order-1")?)?;
//!     batch.insert_or_update(Entity::new("customer-1", "order-2")?)?;
//!     batch.delete_key("customer-1", "order-0", None)?;
//!
//!     if !orders.try_commit(&mut batch).await? {
//!         println!("a precondition failed, nothing was written");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - **[types]** - Entities, EDM values, key validation
//! - **[error]** - Error types and result handling
//! - **[protocol]** - Constants, header helpers, request signing
//! - **[codec]** - ATOM entity and error documents
//! - **[batch]** - Entity group transactions
//! - **[response]** - Parsed responses
//! - **[client]** - Configuration, retries, transport and table operations

pub mod batch;
pub mod client;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod response;
pub mod types;

pub use batch::{Batch, BatchResponse, SubResponse};
pub use client::{ClientConfig, RetryPolicy, TableClient, TableServiceClient};
pub use error::{Result, ServiceError, TableError, ValidationError};
pub use response::RestResponse;
pub use types::{EdmType, EdmValue, Entity, Precondition, TableRecord};
