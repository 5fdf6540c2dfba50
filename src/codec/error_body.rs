//! Service error documents.

use crate::error::ServiceError;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::BTreeMap;

/// Build a [`ServiceError`] from a failure status and its body.
///
/// The body is expected to look like
/// `<error><code>ResourceNotFound</code><message>...</message></error>`. Children other than
/// `code` and `message` are kept in [`ServiceError::details`]. A body that is empty or not
/// XML still yields an error, carrying the status reason as message and the raw body.
pub fn parse_service_error(status: u16, body: &str) -> ServiceError {
    let reason = http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown status");

    let mut error = ServiceError::new(status, None, reason);
    error.body = body.to_string();

    if body.trim().is_empty() {
        return error;
    }

    match read_children(body) {
        Some(children) => {
            for (name, value) in children {
                match name.as_str() {
                    "code" => error.code = Some(value),
                    "message" => error.message = value,
                    _ => {
                        error.details.entry(name).or_insert(value);
                    }
                }
            }
        }
        None => {
            tracing::debug!(status, "error body is not an XML error document");
        }
    }

    error
}

/// Local names and text of the root element's direct children.
fn read_children(body: &str) -> Option<BTreeMap<String, String>> {
    let mut reader = Reader::from_str(body);
    let mut children = BTreeMap::new();
    let mut depth = 0usize;
    let mut current: Option<(String, String)> = None;

    loop {
        match reader.read_event().ok()? {
            Event::Start(e) => {
                depth += 1;
                if depth == 2 {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    current = Some((name, String::new()));
                }
            }
            Event::Empty(e) => {
                if depth == 1 {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    children.entry(name).or_insert_with(String::new);
                }
            }
            Event::Text(t) => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(&t.unescape().ok()?);
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    if let Some((name, text)) = current.take() {
                        children.entry(name).or_insert(text);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if children.is_empty() {
        None
    } else {
        Some(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_document() {
        let body = r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>
<error xmlns="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
  <code>ServerBusy</code>
  <message xml:lang="en-US">The server is busy.
RequestId:abc</message>
  <innererror>trace</innererror>
</error>"#;
        let err = parse_service_error(503, body);
        assert_eq!(err.status, 503);
        assert_eq!(err.code.as_deref(), Some("ServerBusy"));
        assert!(err.message.starts_with("The server is busy."));
        assert_eq!(err.details.get("innererror").map(String::as_str), Some("trace"));
        assert_eq!(err.body, body);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_empty_body_uses_reason() {
        let err = parse_service_error(404, "");
        assert_eq!(err.code, None);
        assert_eq!(err.message, "Not Found");
    }

    #[test]
    fn test_non_xml_body_is_preserved() {
        let err = parse_service_error(500, "upstream exploded");
        assert_eq!(err.code, None);
        assert_eq!(err.body, "upstream exploded");
    }
}
