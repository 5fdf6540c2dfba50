//! Explicit paging for entity queries.

use crate::protocol::constants::headers;
use crate::protocol::format_query;
use crate::response::RestResponse;
use crate::types::{Entity, PARTITION_KEY, ROW_KEY};

/// Query parameters of one page request.
///
/// ```
/// use tablestore_http::client::QueryOptions;
///
/// let options = QueryOptions::new()
///     .partition("orders-2012")
///     .filter("Total gt 100")
///     .top(50)
///     .select(["Total", "Status"]);
/// assert_eq!(
///     options.effective_filter().as_deref(),
///     Some("PartitionKey eq 'orders-2012' and (Total gt 100)")
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Restrict to one partition
    pub partition_key: Option<String>,
    /// Restrict to one row key
    pub row_key: Option<String>,
    /// OData `$filter` expression
    pub filter: Option<String>,
    /// Page size
    pub top: Option<u32>,
    /// Fields to return; empty for all
    pub select: Vec<String>,
}

impl QueryOptions {
    /// No restriction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to `partition_key`.
    pub fn partition(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    /// Restrict to `row_key`.
    pub fn row(mut self, row_key: impl Into<String>) -> Self {
        self.row_key = Some(row_key.into());
        self
    }

    /// Add a `$filter` expression.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Limit the page size.
    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    /// Return only these fields.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    /// The key restrictions and the user filter joined into one expression.
    pub fn effective_filter(&self) -> Option<String> {
        let keys: Vec<String> = [
            (PARTITION_KEY, self.partition_key.as_deref()),
            (ROW_KEY, self.row_key.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| format!("{} eq {}", name, odata_string(v))))
        .collect();

        let user = self.filter.as_deref().filter(|f| !f.trim().is_empty());
        match (keys.is_empty(), user) {
            (true, None) => None,
            (true, Some(filter)) => Some(filter.to_string()),
            (false, None) => Some(keys.join(" and ")),
            (false, Some(filter)) => Some(format!("{} and ({})", keys.join(" and "), filter)),
        }
    }

    /// Encoded query string for one page, continuing at `continuation`.
    pub fn to_query(&self, continuation: Option<&Continuation>) -> Option<String> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(filter) = self.effective_filter() {
            params.push(("$filter", filter));
        }
        if let Some(top) = self.top.filter(|t| *t > 0) {
            params.push(("$top", top.to_string()));
        }
        if !self.select.is_empty() {
            params.push(("$select", self.select.join(",")));
        }
        if let Some(continuation) = continuation {
            params.push(("NextPartitionKey", continuation.next_partition_key.clone()));
            if let Some(row) = &continuation.next_row_key {
                params.push(("NextRowKey", row.clone()));
            }
        }
        format_query(params)
    }
}

/// OData string literal, with embedded quotes doubled.
fn odata_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Opaque position at which the next page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    /// `x-ms-continuation-NextPartitionKey`
    pub next_partition_key: String,
    /// `x-ms-continuation-NextRowKey`
    pub next_row_key: Option<String>,
}

impl Continuation {
    /// Read the continuation headers of a query response.
    pub fn from_response(response: &RestResponse) -> Option<Self> {
        let next_partition_key = response.header(headers::NEXT_PARTITION_KEY)?;
        Some(Self {
            next_partition_key: next_partition_key.to_string(),
            next_row_key: response.header(headers::NEXT_ROW_KEY).map(str::to_string),
        })
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPage {
    /// Entities in server order
    pub entities: Vec<Entity>,
    /// Where the next page starts; `None` on the last page
    pub continuation: Option<Continuation>,
}

impl QueryPage {
    /// True when no further page exists.
    pub fn is_last(&self) -> bool {
        self.continuation.is_none()
    }
}
