//! Entity group transactions.
//!
//! A [`Batch`] collects up to [`MAX_OPERATIONS`] writes against one partition. It is
//! encoded as a nested `multipart/mixed` body, submitted with `POST $batch`, and the
//! service answers with one embedded HTTP response per operation.
//!
//! # Module Organization
//!
//! ```text
//! batch/
//! ├── operation - Batch builder and operation kinds
//! ├── encoder   - Multipart request encoding
//! ├── parser    - Line-oriented response state machine
//! └── response  - Aggregate outcome and Content-ID correlation
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Batch`] | Validated list of operations |
//! | [`BatchParser`] | Incremental response parser |
//! | [`SubResponse`] | One operation's embedded response |
//! | [`BatchResponse`] | Commit outcome |

mod encoder;
mod operation;
mod parser;
mod response;

pub use encoder::{batch_content_type, encode_batch, new_batch_boundary, new_changeset_boundary};
pub use operation::{Batch, BatchOperation, OperationKind, MAX_OPERATIONS};
pub use parser::{BatchParser, ParseState, ParsedBatch, SubResponse};
pub use response::BatchResponse;
