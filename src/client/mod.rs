//! Table service client.
//!
//! This module turns the codec and batch layers into signed HTTP calls:
//!
//! - **Sign and send** requests through a pluggable [`Transport`]
//! - **Retry** transient failures per [`RetryPolicy`]
//! - **Read and write** single entities with try/must semantics
//! - **Page** through query results with explicit continuations
//! - **Commit** entity group transactions
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── config    - Client configuration
//! ├── executor  - Signed requests and the retry loop
//! ├── query     - Query options and continuations
//! ├── retry     - Retry policies
//! ├── service   - Account-level table management
//! ├── table     - Per-table entity operations
//! └── transport - HTTP transport and clock seams
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TableServiceClient`] | Account entry point |
//! | [`TableClient`] | Entity operations on one table |
//! | [`RequestExecutor`] | Signing, sending and retrying |
//! | [`ClientConfig`] | Client configuration options |
//! | [`RetryPolicy`] | Waits between attempts |
//!
//! # Examples
//!
//! ```no_run
//! use tablestore_http::client::{ClientConfig, QueryOptions, TableServiceClient};
//! use tablestore_http::Entity;
//!
//! # async fn run() -> tablestore_http::Result<()> {
//! let service = TableServiceClient::new(&ClientConfig::development_storage())?;
//! service.try_create_table("Orders").await?;
//! let orders = service.table("Orders")?;
//!
//! let mut order = Entity::new("customer-1", "order-1")?;
//! order.set("Total", 99.5f64)?;
//! orders.insert(&mut order).await?;
//!
//! let page = orders
//!     .query_page(&QueryOptions::new().partition("customer-1"), None)
//!     .await?;
//! println!("{} orders", page.entities.len());
//! # Ok(())
//! # }
//! ```

mod config;
mod executor;
mod query;
mod retry;
mod service;
mod table;
mod transport;

pub use config::ClientConfig;
pub use executor::{RequestExecutor, RestRequest};
pub use query::{Continuation, QueryOptions, QueryPage};
pub use retry::{exponential_backoff, RetryPolicy, MAX_RETRIES};
pub use service::{TableServiceClient, TablesPage};
pub use table::TableClient;
pub use transport::{Clock, HttpRequest, HttpResponse, ReqwestTransport, SystemClock, Transport};
