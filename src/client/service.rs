//! Account-level operations: listing, creating and deleting tables.

use super::config::ClientConfig;
use super::executor::{RequestExecutor, RestRequest};
use super::table::TableClient;
use crate::codec::encode_table_entry;
use crate::error::Result;
use crate::protocol::constants::headers;
use crate::protocol::format_query;
use crate::types::validate_table_name;
use http::StatusCode;
use std::sync::Arc;

const TABLES: &str = "Tables";
const TABLE_NAME: &str = "TableName";

/// One page of table names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TablesPage {
    /// Names in server order
    pub names: Vec<String>,
    /// Name the next page starts at; `None` on the last page
    pub next_table_name: Option<String>,
}

/// Entry point for an account, handing out [`TableClient`]s that share one executor.
#[derive(Debug, Clone)]
pub struct TableServiceClient {
    executor: Arc<RequestExecutor>,
}

impl TableServiceClient {
    /// Client with the default transport.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self::with_executor(Arc::new(RequestExecutor::new(config)?)))
    }

    /// Client from a storage connection string.
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        Self::new(&ClientConfig::from_connection_string(connection_string)?)
    }

    /// Client over an existing executor.
    pub fn with_executor(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    /// Shared executor.
    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    /// Client for one table.
    pub fn table(&self, name: &str) -> Result<TableClient> {
        TableClient::with_executor(self.executor.clone(), name)
    }

    /// Fetch one page of table names, starting at `next_table_name`.
    pub async fn tables_page(&self, next_table_name: Option<&str>) -> Result<TablesPage> {
        let query = format_query(next_table_name.map(|name| ("NextTableName", name.to_string())));
        let request = RestRequest::get(TABLES).with_query(query);
        let response = self.executor.execute(&request).await?.error_for_status()?;

        let names = response
            .entities()?
            .iter()
            .filter_map(|entry| entry.get_str(TABLE_NAME).map(str::to_string))
            .collect();

        Ok(TablesPage {
            names,
            next_table_name: response.header(headers::NEXT_TABLE_NAME).map(str::to_string),
        })
    }

    /// Create a table, failing if it exists.
    pub async fn create_table(&self, name: &str) -> Result<TableClient> {
        self.create(name, true).await?;
        self.table(name)
    }

    /// Create a table. `Ok(false)` when it already exists.
    pub async fn try_create_table(&self, name: &str) -> Result<bool> {
        self.create(name, false).await
    }

    /// Delete a table.
    pub async fn delete_table(&self, name: &str) -> Result<()> {
        validate_table_name(name)?;
        let request = RestRequest::delete(format!("{}('{}')", TABLES, name));
        self.executor.execute(&request).await?.error_for_status()?;
        Ok(())
    }

    async fn create(&self, name: &str, fail_on_conflict: bool) -> Result<bool> {
        validate_table_name(name)?;
        let request = RestRequest::new("POST", TABLES).with_body(encode_table_entry(name));
        let response = self.executor.execute(&request).await?;

        if !fail_on_conflict && response.status == StatusCode::CONFLICT.as_u16() {
            return Ok(false);
        }
        response.error_for_status()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TableError, ValidationError};

    #[test]
    fn test_table_clients_share_executor() {
        let service = TableServiceClient::new(&ClientConfig::development_storage()).unwrap();
        let orders = service.table("Orders").unwrap();
        assert_eq!(orders.table(), "Orders");
        assert!(matches!(
            service.table("1bad").unwrap_err(),
            TableError::Validation(ValidationError::InvalidTableName(_))
        ));
    }

    #[test]
    fn test_from_connection_string() {
        assert!(TableServiceClient::from_connection_string("UseDevelopmentStorage=true").is_ok());
        assert!(TableServiceClient::from_connection_string("AccountName=a").is_err());
    }
}
