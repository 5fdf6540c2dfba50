//! Header parsing and formatting shared by the request path and the batch parser.
//!
//! # Header Formats
//!
//! | Item | Format | Example |
//! |------|--------|---------|
//! | Header line | `Name: Value` | `Content-ID: 0` |
//! | Multipart type | `multipart/mixed; boundary=...` | `multipart/mixed; boundary=batch_1` |
//! | `x-ms-date` | RFC 1123, GMT | `Sun, 11 Oct 2009 21:49:42 GMT` |
//! | Entity resource | `Table(PartitionKey='..',RowKey='..')` | `Orders(PartitionKey='a',RowKey='1')` |
//!
//! # Examples
//!
//! ```
//! use tablestore_http::protocol::{parse_boundary, parse_header_line, format_resource};
//!
//! let (name, value) = parse_header_line("Content-ID: 3").unwrap();
//! assert_eq!((name, value), ("Content-ID", "3"));
//!
//! let boundary = parse_boundary("multipart/mixed; boundary=batch_42").unwrap();
//! assert_eq!(boundary, "batch_42");
//!
//! assert_eq!(format_resource("Orders", Some(("a b", "1"))), "Orders(PartitionKey='a%20b',RowKey='1')");
//! ```

use crate::protocol::constants::MULTIPART_MIXED;
use chrono::{DateTime, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left unencoded in key segments: RFC 3986 unreserved only.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Parse a `Name: Value` line.
///
/// Returns `None` for blank lines and for lines whose first colon is missing or in the
/// first position. The value is trimmed.
pub fn parse_header_line(line: &str) -> Option<(&str, &str)> {
    if line.trim().is_empty() {
        return None;
    }
    let colon = line.find(':')?;
    if colon == 0 {
        return None;
    }
    Some((&line[..colon], line[colon + 1..].trim()))
}

/// Extract the boundary of a `multipart/mixed` content type.
pub fn parse_boundary(content_type: &str) -> Option<&str> {
    let mut tokens = content_type
        .split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if !tokens.next()?.eq_ignore_ascii_case(MULTIPART_MIXED) {
        return None;
    }

    tokens.find_map(|token| {
        let (name, value) = token.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

/// RFC 1123 date used for `x-ms-date`.
pub fn format_ms_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Percent-decode an ETag as sent by the service in headers and attributes.
pub fn decode_etag(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Percent-encode a key for use inside a resource path.
pub fn encode_key_segment(key: &str) -> String {
    utf8_percent_encode(key, KEY_SEGMENT).to_string()
}

/// Resource path of a table, or of one entity when both keys are given.
pub fn format_resource(table: &str, keys: Option<(&str, &str)>) -> String {
    match keys {
        Some((partition_key, row_key)) => format!(
            "{}(PartitionKey='{}',RowKey='{}')",
            table,
            encode_key_segment(partition_key),
            encode_key_segment(row_key)
        ),
        None => table.to_string(),
    }
}

/// Join query parameters, percent-encoding the values. Returns `None` when empty.
pub fn format_query<'a, I>(params: I) -> Option<String>
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let joined = params
        .into_iter()
        .map(|(name, value)| format!("{}={}", name, utf8_percent_encode(&value, KEY_SEGMENT)))
        .collect::<Vec<_>>()
        .join("&");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_header_line() {
        assert_eq!(
            parse_header_line("Content-Type: multipart/mixed; boundary=x"),
            Some(("Content-Type", "multipart/mixed; boundary=x"))
        );
        assert_eq!(parse_header_line("ETag:  W/\"1\"  "), Some(("ETag", "W/\"1\"")));
    }

    #[test]
    fn test_parse_header_line_rejects_non_headers() {
        assert_eq!(parse_header_line(""), None);
        assert_eq!(parse_header_line("   "), None);
        assert_eq!(parse_header_line(":value"), None);
        assert_eq!(parse_header_line("HTTP/1.1 204 No Content"), None);
    }

    #[test]
    fn test_parse_boundary() {
        assert_eq!(parse_boundary("multipart/mixed; boundary=changeset_1"), Some("changeset_1"));
        assert_eq!(parse_boundary("multipart/mixed;boundary=\"b\""), Some("b"));
        assert_eq!(parse_boundary("application/atom+xml"), None);
        assert_eq!(parse_boundary("multipart/mixed"), None);
        assert_eq!(parse_boundary("multipart/mixed; charset=utf-8"), None);
    }

    #[test]
    fn test_format_ms_date() {
        let when = Utc.with_ymd_and_hms(2009, 10, 11, 21, 49, 42).unwrap();
        assert_eq!(format_ms_date(when), "Sun, 11 Oct 2009 21:49:42 GMT");
    }

    #[test]
    fn test_decode_etag() {
        assert_eq!(
            decode_etag("W/\"datetime'2012-01-01T10%3A00%3A00.1Z'\""),
            "W/\"datetime'2012-01-01T10:00:00.1Z'\""
        );
    }

    #[test]
    fn test_format_resource() {
        assert_eq!(format_resource("T", None), "T");
        assert_eq!(format_resource("T", Some(("p'1", "r"))), "T(PartitionKey='p%271',RowKey='r')");
    }

    #[test]
    fn test_format_query() {
        let query = format_query([("$filter", "A eq 'b'".to_string()), ("$top", "5".to_string())]);
        assert_eq!(query.as_deref(), Some("$filter=A%20eq%20%27b%27&$top=5"));
        assert_eq!(format_query(Vec::<(&str, String)>::new()), None);
    }
}
