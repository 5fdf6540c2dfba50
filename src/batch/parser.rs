//! Line-oriented parser for multipart batch responses.
//!
//! The response body is split on line feeds (a trailing carriage return is dropped) and
//! fed through a state machine:
//!
//! 1. **BeginResponse**: skip blank lines until the outer begin boundary
//! 2. **BatchHeaders**: batch part headers; `Content-Type` names the changeset boundary
//! 3. **BatchBody**: changeset begin boundary, or the outer end boundary; any other text is
//!    a batch-level error body
//! 4. **ChangesetHeaders**: headers of one changeset part
//! 5. **ResponseStatusLine**: `HTTP/1.1 204 No Content`
//! 6. **ResponseHeaders**: embedded response headers, up to the blank line
//! 7. **ResponseBody**: body lines up to the next changeset boundary or the outer end
//! 8. **EndResponse**: the only state in which input may end
//!
//! Boundaries are compared for exact equality.
//!
//! # Examples
//!
//! ```
//! use tablestore_http::batch::{BatchParser, ParseState};
//!
//! let body = "--batch_1\n\
//!     Content-Type: multipart/mixed; boundary=cs_1\n\
//!     \n\
//!     --cs_1\n\
//!     Content-Type: application/http\n\
//!     \n\
//!     HTTP/1.1 204 No Content\n\
//!     Content-ID: 0\n\
//!     \n\
//!     --cs_1--\n\
//!     --batch_1--\n";
//!
//! let mut parser = BatchParser::new("batch_1");
//! parser.feed(body.as_bytes()).unwrap();
//! assert_eq!(parser.state(), ParseState::EndResponse);
//!
//! let parsed = parser.finish().unwrap();
//! assert_eq!(parsed.responses.len(), 1);
//! assert_eq!(parsed.responses[0].content_id, "0");
//! ```

use crate::codec::decode_entity;
use crate::error::{Result, TableError};
use crate::protocol::constants::{headers, NO_CONTENT};
use crate::protocol::{parse_boundary, parse_header_line};
use crate::response::RestResponse;
use crate::types::Entity;
use bytes::BytesMut;
use std::collections::BTreeMap;

/// Parser states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Before the outer begin boundary
    BeginResponse,
    /// Headers of the batch part
    BatchHeaders,
    /// Between changesets
    BatchBody,
    /// Headers of a changeset part
    ChangesetHeaders,
    /// Embedded HTTP status line
    ResponseStatusLine,
    /// Embedded HTTP headers
    ResponseHeaders,
    /// Embedded HTTP body
    ResponseBody,
    /// After the outer end boundary
    EndResponse,
}

/// One operation's outcome inside a batch response.
#[derive(Debug, Clone, PartialEq)]
pub struct SubResponse {
    /// Correlation key, the zero-based index of the originating operation
    pub content_id: String,
    /// Headers of the changeset part itself
    pub part_headers: BTreeMap<String, String>,
    /// Embedded response
    pub response: RestResponse,
    /// Entity returned in the body, for successful responses that carry one
    pub entity: Option<Entity>,
}

impl SubResponse {
    /// Status below 300.
    pub fn succeeded(&self) -> bool {
        self.response.succeeded()
    }

    /// Status 412.
    pub fn precondition_failed(&self) -> bool {
        self.response.precondition_failed()
    }

    /// The operation index encoded in the Content-ID.
    pub fn index(&self) -> Option<usize> {
        self.content_id.parse().ok()
    }
}

/// Output of a completed parse.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedBatch {
    /// Headers of the outer batch part
    pub batch_headers: BTreeMap<String, String>,
    /// Sub-responses in the order they appeared
    pub responses: Vec<SubResponse>,
    /// Non-changeset text found inside the batch, usually an error document
    pub error_body: Option<String>,
}

#[derive(Debug, Default)]
struct ChangesetPart {
    part_headers: BTreeMap<String, String>,
    status: u16,
    headers: BTreeMap<String, String>,
    body: String,
}

enum Step {
    Consumed,
    Reprocess,
}

/// Incremental batch response parser.
#[derive(Debug)]
pub struct BatchParser {
    state: ParseState,
    /// Bytes of an incomplete trailing line
    buffer: BytesMut,
    batch_begin: String,
    batch_end: String,
    changeset_begin: Option<String>,
    changeset_end: Option<String>,
    batch_headers: BTreeMap<String, String>,
    error_body: String,
    current: Option<ChangesetPart>,
    responses: Vec<SubResponse>,
}

impl BatchParser {
    /// Parser for a response whose outer boundary is `batch_boundary`.
    pub fn new(batch_boundary: &str) -> Self {
        Self {
            state: ParseState::BeginResponse,
            buffer: BytesMut::new(),
            batch_begin: format!("--{}", batch_boundary),
            batch_end: format!("--{}--", batch_boundary),
            changeset_begin: None,
            changeset_end: None,
            batch_headers: BTreeMap::new(),
            error_body: String::new(),
            current: None,
            responses: Vec::new(),
        }
    }

    /// Parse a complete body in one call.
    pub fn parse(batch_boundary: &str, body: &str) -> Result<ParsedBatch> {
        let mut parser = Self::new(batch_boundary);
        parser.feed(body.as_bytes())?;
        parser.finish()
    }

    /// Current state.
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Feed bytes; complete lines are processed, a partial line is kept for the next call.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            let text = String::from_utf8(line[..pos].to_vec())
                .map_err(|e| TableError::Framing(format!("invalid UTF-8 in response: {}", e)))?;
            self.feed_line(text.strip_suffix('\r').unwrap_or(&text))?;
        }
        Ok(())
    }

    /// Process one line, without its terminator.
    pub fn feed_line(&mut self, line: &str) -> Result<()> {
        while let Step::Reprocess = self.step(line)? {}
        Ok(())
    }

    /// Flush any trailing partial line and check the parser reached the end state.
    pub fn finish(mut self) -> Result<ParsedBatch> {
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            let text = String::from_utf8(rest.to_vec())
                .map_err(|e| TableError::Framing(format!("invalid UTF-8 in response: {}", e)))?;
            self.feed_line(text.strip_suffix('\r').unwrap_or(&text))?;
        }

        if self.state != ParseState::EndResponse {
            return Err(TableError::Framing(format!(
                "premature end of response in state {:?}",
                self.state
            )));
        }

        let error_body = if self.error_body.trim().is_empty() {
            None
        } else {
            Some(self.error_body)
        };

        Ok(ParsedBatch {
            batch_headers: self.batch_headers,
            responses: self.responses,
            error_body,
        })
    }

    fn step(&mut self, line: &str) -> Result<Step> {
        match self.state {
            ParseState::BeginResponse => {
                if line == self.batch_begin {
                    self.state = ParseState::BatchHeaders;
                } else if !line.trim().is_empty() {
                    return Err(TableError::Framing(format!("unexpected content `{}`", line)));
                }
            }
            ParseState::BatchHeaders => {
                if let Some((name, value)) = parse_header_line(line) {
                    if name.eq_ignore_ascii_case(headers::CONTENT_TYPE) {
                        let boundary = parse_boundary(value).ok_or_else(|| {
                            TableError::Framing(format!("invalid batch Content-Type `{}`", value))
                        })?;
                        self.changeset_begin = Some(format!("--{}", boundary));
                        self.changeset_end = Some(format!("--{}--", boundary));
                    }
                    self.batch_headers
                        .insert(name.to_ascii_lowercase(), value.to_string());
                } else {
                    if self.changeset_begin.is_none() {
                        return Err(TableError::Framing("changeset boundary not found".to_string()));
                    }
                    self.state = ParseState::BatchBody;
                    if !line.trim().is_empty() {
                        return Ok(Step::Reprocess);
                    }
                }
            }
            ParseState::BatchBody => {
                if self.is_changeset_begin(line) {
                    self.current = Some(ChangesetPart::default());
                    self.state = ParseState::ChangesetHeaders;
                } else if line == self.batch_end {
                    self.state = ParseState::EndResponse;
                } else if self.is_changeset_end(line) {
                    // closing boundary of the changeset, nothing to collect
                } else if !line.trim().is_empty() {
                    self.error_body.push_str(line);
                    self.error_body.push('\n');
                }
            }
            ParseState::ChangesetHeaders => {
                if let Some((name, value)) = parse_header_line(line) {
                    self.part_mut()?
                        .part_headers
                        .insert(name.to_ascii_lowercase(), value.to_string());
                } else {
                    self.state = ParseState::ResponseStatusLine;
                    if !line.trim().is_empty() {
                        return Ok(Step::Reprocess);
                    }
                }
            }
            ParseState::ResponseStatusLine => {
                if line.trim().is_empty() {
                    return Ok(Step::Consumed);
                }
                let mut tokens = line.split(' ');
                let _version = tokens.next();
                let status = tokens
                    .next()
                    .ok_or_else(|| TableError::Framing(format!("malformed status line `{}`", line)))?;
                let status = status
                    .parse::<u16>()
                    .map_err(|_| TableError::Framing(format!("invalid status code `{}`", status)))?;
                self.part_mut()?.status = status;
                self.state = ParseState::ResponseHeaders;
            }
            ParseState::ResponseHeaders => {
                if let Some((name, value)) = parse_header_line(line) {
                    self.part_mut()?
                        .headers
                        .insert(name.to_ascii_lowercase(), value.to_string());
                } else {
                    self.state = ParseState::ResponseBody;
                }
            }
            ParseState::ResponseBody => {
                if self.is_changeset_begin(line) {
                    self.finalize()?;
                    self.current = Some(ChangesetPart::default());
                    self.state = ParseState::ChangesetHeaders;
                } else if self.is_changeset_end(line) {
                    self.finalize()?;
                    self.state = ParseState::BatchBody;
                } else if line == self.batch_end {
                    self.finalize()?;
                    self.state = ParseState::EndResponse;
                } else {
                    let part = self.part_mut()?;
                    part.body.push_str(line);
                    part.body.push('\n');
                }
            }
            ParseState::EndResponse => {}
        }
        Ok(Step::Consumed)
    }

    fn is_changeset_begin(&self, line: &str) -> bool {
        self.changeset_begin.as_deref() == Some(line)
    }

    fn is_changeset_end(&self, line: &str) -> bool {
        self.changeset_end.as_deref() == Some(line)
    }

    fn part_mut(&mut self) -> Result<&mut ChangesetPart> {
        self.current
            .as_mut()
            .ok_or_else(|| TableError::Framing("no open changeset".to_string()))
    }

    fn finalize(&mut self) -> Result<()> {
        let part = self
            .current
            .take()
            .ok_or_else(|| TableError::Framing("no open changeset".to_string()))?;

        let content_id = part
            .headers
            .get("content-id")
            .or_else(|| part.part_headers.get("content-id"))
            .cloned()
            .unwrap_or_else(|| {
                let position = self.responses.len().to_string();
                tracing::debug!(position = %position, "sub-response without Content-ID, using position");
                position
            });

        let response = RestResponse {
            status: part.status,
            headers: part.headers,
            body: part.body,
        };

        let entity = if response.status == NO_CONTENT
            || !response.succeeded()
            || response.body.trim().is_empty()
        {
            None
        } else {
            Some(decode_entity(response.body.trim())?)
        };

        self.responses.push(SubResponse {
            content_id,
            part_headers: part.part_headers,
            response,
            entity,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?><entry xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices" xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata" m:etag="W/&quot;1&quot;" xmlns="http://www.w3.org/2005/Atom"><content type="application/xml"><m:properties><d:PartitionKey>p</d:PartitionKey><d:RowKey>0</d:RowKey><d:Count m:type="Edm.Int32">3</d:Count></m:properties></content></entry>"#;

    fn response_body(statuses: &[u16]) -> String {
        let mut body = String::from(
            "--batchresponse_1\r\nContent-Type: multipart/mixed; boundary=changesetresponse_1\r\n\r\n",
        );
        for (i, status) in statuses.iter().enumerate() {
            body.push_str("--changesetresponse_1\r\n");
            body.push_str("Content-Type: application/http\r\n");
            body.push_str("Content-Transfer-Encoding: binary\r\n\r\n");
            body.push_str(&format!("HTTP/1.1 {} Status\r\n", status));
            body.push_str(&format!("Content-ID: {}\r\n", i));
            body.push_str("DataServiceVersion: 1.0;\r\n");
            if *status == 201 {
                body.push_str("Content-Type: application/atom+xml;charset=utf-8\r\n");
                body.push_str("ETag: W/\"1\"\r\n\r\n");
                body.push_str(ENTRY);
                body.push_str("\r\n");
            } else if *status == 204 {
                body.push_str(&format!("ETag: W/\"{}\"\r\n\r\n\r\n", i));
            } else {
                body.push_str("Content-Type: application/xml\r\n\r\n");
                body.push_str("<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"yes\"?>\r\n");
                body.push_str("<error><code>UpdateConditionNotSatisfied</code><message>no</message></error>\r\n");
            }
        }
        body.push_str("--changesetresponse_1--\r\n--batchresponse_1--\r\n");
        body
    }

    #[test]
    fn test_parses_every_changeset() {
        let parsed = BatchParser::parse("batchresponse_1", &response_body(&[201, 204, 204])).unwrap();
        assert_eq!(parsed.responses.len(), 3);
        let ids: Vec<&str> = parsed.responses.iter().map(|r| r.content_id.as_str()).collect();
        assert_eq!(ids, ["0", "1", "2"]);
        assert_eq!(parsed.responses[0].entity.as_ref().and_then(|e| e.get_i32("Count")), Some(3));
        assert!(parsed.responses[1].entity.is_none());
        assert_eq!(parsed.responses[2].response.header("etag"), Some("W/\"2\""));
        assert!(parsed.error_body.is_none());
    }

    #[test]
    fn test_failed_changeset_keeps_error_body() {
        let parsed = BatchParser::parse("batchresponse_1", &response_body(&[201, 204, 412])).unwrap();
        let failed = &parsed.responses[2];
        assert!(failed.precondition_failed());
        assert!(failed.entity.is_none());
        assert!(failed.response.body.contains("UpdateConditionNotSatisfied"));
    }

    #[test]
    fn test_truncated_body_is_framing_error() {
        let body = response_body(&[201, 204]);
        let cut = body.find("--changesetresponse_1--").unwrap();
        let err = BatchParser::parse("batchresponse_1", &body[..cut]).unwrap_err();
        assert!(matches!(err, TableError::Framing(_)));
    }

    #[test]
    fn test_incremental_feed_matches_single_parse() {
        let body = response_body(&[201, 204, 204]);
        let mut parser = BatchParser::new("batchresponse_1");
        for chunk in body.as_bytes().chunks(7) {
            parser.feed(chunk).unwrap();
        }
        let parsed = parser.finish().unwrap();
        assert_eq!(parsed, BatchParser::parse("batchresponse_1", &body).unwrap());
    }

    #[test]
    fn test_unexpected_leading_content() {
        let err = BatchParser::parse("b", "garbage\n--b--\n").unwrap_err();
        assert!(matches!(err, TableError::Framing(_)));
    }

    #[test]
    fn test_missing_changeset_boundary() {
        let err = BatchParser::parse("b", "--b\nX-Other: 1\n\n--b--\n").unwrap_err();
        assert!(matches!(err, TableError::Framing(_)));
    }

    #[test]
    fn test_invalid_status_code() {
        let body = "--b\nContent-Type: multipart/mixed; boundary=c\n\n--c\n\nHTTP/1.1 abc Oops\n\n--c--\n--b--\n";
        let err = BatchParser::parse("b", body).unwrap_err();
        assert!(matches!(err, TableError::Framing(_)));
    }

    #[test]
    fn test_batch_level_error_text() {
        let body = "--b\nContent-Type: multipart/mixed; boundary=c\n\n<error><code>InvalidInput</code></error>\n--b--\n";
        let parsed = BatchParser::parse("b", body).unwrap();
        assert!(parsed.responses.is_empty());
        assert!(parsed.error_body.unwrap().contains("InvalidInput"));
    }

    #[test]
    fn test_outer_end_directly_after_body() {
        let body = "--b\nContent-Type: multipart/mixed; boundary=c\n\n--c\n\nHTTP/1.1 204 No Content\nContent-ID: 0\n\n--b--\n";
        let parsed = BatchParser::parse("b", body).unwrap();
        assert_eq!(parsed.responses.len(), 1);
    }
}
