//! Multipart encoding of entity group transactions.
//!
//! ```text
//! --batch_{id}
//! Content-Type: multipart/mixed; boundary=changeset_{id}
//!
//! --changeset_{id}
//! Content-Type: application/http
//! Content-Transfer-Encoding: binary
//!
//! POST https://account.table.core.windows.net/Orders HTTP/1.1
//! Content-ID: 0
//! Content-Type: application/atom+xml;type=entry
//! Content-Length: 512
//!
//! <?xml ...entry...>
//! --changeset_{id}--
//! --batch_{id}--
//! ```
//!
//! Lines end with a bare line feed. Each operation's `Content-ID` is its zero-based position.

use super::operation::Batch;
use crate::codec::encode_entity;
use crate::error::{Result, ValidationError};
use crate::protocol::constants::{headers, ATOM_ENTRY_CONTENT_TYPE, HTTP_CONTENT_TYPE, MULTIPART_MIXED};
use uuid::Uuid;

/// Fresh outer boundary, `batch_{uuid}`.
pub fn new_batch_boundary() -> String {
    format!("batch_{}", Uuid::new_v4())
}

/// Fresh changeset boundary, `changeset_{uuid}`.
pub fn new_changeset_boundary() -> String {
    format!("changeset_{}", Uuid::new_v4())
}

/// `Content-Type` header of a batch request.
pub fn batch_content_type(batch_boundary: &str) -> String {
    format!("{}; boundary={}", MULTIPART_MIXED, batch_boundary)
}

/// Line-feed terminated multipart writer.
#[derive(Debug, Default)]
struct MultipartWriter {
    buf: String,
}

impl MultipartWriter {
    fn line(&mut self, text: &str) {
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    fn blank(&mut self) {
        self.buf.push('\n');
    }

    fn boundary(&mut self, boundary: &str) {
        self.line(&format!("--{}", boundary));
    }

    fn end_boundary(&mut self, boundary: &str) {
        self.line(&format!("--{}--", boundary));
    }

    fn header(&mut self, name: &str, value: &str) {
        self.line(&format!("{}: {}", name, value));
    }
}

/// Encode `batch` as a multipart body.
///
/// `base_url` is the account endpoint the embedded request lines are resolved against.
pub fn encode_batch(
    batch: &Batch,
    base_url: &str,
    batch_boundary: &str,
    changeset_boundary: &str,
) -> Result<String> {
    if batch.is_empty() {
        return Err(ValidationError::EmptyBatch.into());
    }

    let base_url = base_url.trim_end_matches('/');
    let mut out = MultipartWriter::default();

    out.boundary(batch_boundary);
    out.header(
        headers::CONTENT_TYPE,
        &format!("{}; boundary={}", MULTIPART_MIXED, changeset_boundary),
    );
    out.blank();

    for (index, operation) in batch.operations().iter().enumerate() {
        out.boundary(changeset_boundary);
        out.header(headers::CONTENT_TYPE, HTTP_CONTENT_TYPE);
        out.header(headers::CONTENT_TRANSFER_ENCODING, "binary");
        out.blank();

        let body = match operation.entity() {
            Some(entity) => Some(encode_entity(entity)?),
            None => None,
        };

        out.line(&format!(
            "{} {}/{} HTTP/1.1",
            operation.kind().method(),
            base_url,
            operation.resource(batch.table())
        ));
        out.header(headers::CONTENT_ID, &index.to_string());
        if let Some(body) = body.as_deref().filter(|b| !b.is_empty()) {
            out.header(headers::CONTENT_TYPE, ATOM_ENTRY_CONTENT_TYPE);
            out.header(headers::CONTENT_LENGTH, &body.len().to_string());
        }
        if let Some(precondition) = operation.precondition() {
            out.header(headers::IF_MATCH, precondition.header_value());
        }
        out.blank();

        if let Some(body) = body {
            out.line(&body);
        }
    }

    out.end_boundary(changeset_boundary);
    out.end_boundary(batch_boundary);

    Ok(out.buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Entity;

    const BASE: &str = "http://127.0.0.1:10002/devstoreaccount1";

    fn three_op_batch() -> Batch {
        let mut batch = Batch::new("T");
        batch.insert(Entity::new("p", "0").unwrap()).unwrap();
        batch.update(Entity::new("p", "1").unwrap(), true).unwrap();
        batch.delete_key("p", "2", None).unwrap();
        batch
    }

    #[test]
    fn test_framing_and_order() {
        let body = encode_batch(&three_op_batch(), BASE, "batch_b", "changeset_c").unwrap();
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines[0], "--batch_b");
        assert_eq!(lines[1], "Content-Type: multipart/mixed; boundary=changeset_c");
        assert_eq!(lines[lines.len() - 2], "--changeset_c--");
        assert_eq!(lines[lines.len() - 1], "--batch_b--");
        assert_eq!(lines.iter().filter(|l| **l == "--changeset_c").count(), 3);

        let post = body.find(&format!("POST {}/T HTTP/1.1", BASE)).unwrap();
        let put = body
            .find(&format!("PUT {}/T(PartitionKey='p',RowKey='1') HTTP/1.1", BASE))
            .unwrap();
        let delete = body
            .find(&format!("DELETE {}/T(PartitionKey='p',RowKey='2') HTTP/1.1", BASE))
            .unwrap();
        assert!(post < put && put < delete);
    }

    #[test]
    fn test_content_ids_and_preconditions() {
        let body = encode_batch(&three_op_batch(), BASE, "batch_b", "changeset_c").unwrap();
        for id in 0..3 {
            assert!(body.contains(&format!("Content-ID: {}\n", id)));
        }
        assert_eq!(body.matches("If-Match: *").count(), 2);
        // delete has no entity body
        assert_eq!(body.matches("Content-Type: application/atom+xml;type=entry").count(), 2);
    }

    #[test]
    fn test_content_length_matches_body() {
        let mut batch = Batch::new("T");
        batch.insert(Entity::new("p", "é").unwrap()).unwrap();
        let body = encode_batch(&batch, BASE, "b", "c").unwrap();

        let length: usize = body
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .unwrap()
            .parse()
            .unwrap();
        let xml = body.lines().find(|l| l.starts_with("<?xml")).unwrap();
        assert_eq!(xml.len(), length);
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(encode_batch(&Batch::new("T"), BASE, "b", "c").is_err());
    }

    #[test]
    fn test_boundaries_are_unique() {
        assert_ne!(new_batch_boundary(), new_batch_boundary());
        assert!(new_changeset_boundary().starts_with("changeset_"));
        assert_eq!(batch_content_type("batch_1"), "multipart/mixed; boundary=batch_1");
    }
}
