//! Per-table operations.
//!
//! Every fallible write comes in two flavours: the plain method raises any failure, and the
//! `try_` method reports the expected optimistic-concurrency outcome (`409` on insert, `412`
//! on update and merge) as `Ok(false)`.

use super::config::ClientConfig;
use super::executor::{RequestExecutor, RestRequest};
use super::query::{Continuation, QueryOptions, QueryPage};
use crate::batch::{Batch, BatchResponse};
use crate::codec::encode_entity;
use crate::error::Result;
use crate::protocol::format_resource;
use crate::response::RestResponse;
use crate::types::{validate_table_name, Entity, Precondition};
use http::StatusCode;
use std::sync::Arc;

/// Operations against one table.
#[derive(Debug, Clone)]
pub struct TableClient {
    executor: Arc<RequestExecutor>,
    table: String,
}

impl TableClient {
    /// Client for `table` with its own executor.
    pub fn new(config: &ClientConfig, table: impl Into<String>) -> Result<Self> {
        Self::with_executor(Arc::new(RequestExecutor::new(config)?), table)
    }

    /// Client for `table` sharing `executor`.
    pub fn with_executor(executor: Arc<RequestExecutor>, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self { executor, table })
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Empty batch against this table.
    pub fn batch(&self) -> Batch {
        Batch::new(self.table.clone())
    }

    /// Insert a new entity, refreshing its ETag and timestamp.
    pub async fn insert(&self, entity: &mut Entity) -> Result<()> {
        let response = self.send_insert(entity).await?.error_for_status()?;
        refresh_from_entry(entity, &response)
    }

    /// Insert a new entity. `Ok(false)` when it already exists.
    pub async fn try_insert(&self, entity: &mut Entity) -> Result<bool> {
        let response = self.send_insert(entity).await?;
        if response.status == StatusCode::CONFLICT.as_u16() {
            return Ok(false);
        }
        let response = response.error_for_status()?;
        refresh_from_entry(entity, &response)?;
        Ok(true)
    }

    /// Replace an entity. Conditional on its ETag unless `unconditional`.
    pub async fn update(&self, entity: &mut Entity, unconditional: bool) -> Result<()> {
        let precondition = condition(entity, unconditional);
        self.write("PUT", entity, None, Some(precondition)).await
    }

    /// Replace an entity if its ETag still matches. `Ok(false)` on a mismatch.
    pub async fn try_update(&self, entity: &mut Entity) -> Result<bool> {
        let precondition = entity.precondition();
        tolerate_precondition(self.write("PUT", entity, None, Some(precondition)).await)
    }

    /// Merge fields into an entity. With `fields` non-empty, only those fields are sent.
    pub async fn merge(&self, entity: &mut Entity, unconditional: bool, fields: &[&str]) -> Result<()> {
        let precondition = condition(entity, unconditional);
        self.write("MERGE", entity, Some(fields), Some(precondition)).await
    }

    /// Merge fields if the ETag still matches. `Ok(false)` on a mismatch.
    pub async fn try_merge(&self, entity: &mut Entity, fields: &[&str]) -> Result<bool> {
        let precondition = entity.precondition();
        tolerate_precondition(self.write("MERGE", entity, Some(fields), Some(precondition)).await)
    }

    /// Insert or fully replace an entity.
    pub async fn insert_or_replace(&self, entity: &mut Entity) -> Result<()> {
        self.write("PUT", entity, None, None).await
    }

    /// Insert an entity or merge fields into the existing one.
    pub async fn insert_or_merge(&self, entity: &mut Entity, fields: &[&str]) -> Result<()> {
        self.write("MERGE", entity, Some(fields), None).await
    }

    /// Delete an entity. Conditional on its ETag unless `unconditional`.
    pub async fn delete(&self, entity: &Entity, unconditional: bool) -> Result<()> {
        let etag = if unconditional { None } else { entity.etag() };
        self.delete_key(entity.partition_key(), entity.row_key(), etag).await
    }

    /// Delete by key. `None` deletes unconditionally.
    pub async fn delete_key(&self, partition_key: &str, row_key: &str, etag: Option<&str>) -> Result<()> {
        let request = RestRequest::delete(self.resource(partition_key, row_key))
            .with_if_match(Some(Precondition::from_etag(etag).header_value().to_string()));
        self.executor.execute(&request).await?.error_for_status()?;
        Ok(())
    }

    /// Read one entity. `Ok(None)` when it does not exist.
    pub async fn get(&self, partition_key: &str, row_key: &str) -> Result<Option<Entity>> {
        let request = RestRequest::get(self.resource(partition_key, row_key));
        let response = self.executor.execute(&request).await?;
        if response.status == StatusCode::NOT_FOUND.as_u16() {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        let mut entity = response.entity()?;
        if let Some(etag) = response.etag() {
            entity.set_etag(Some(etag));
        }
        Ok(Some(entity))
    }

    /// Fetch one page of a query.
    ///
    /// Pass the previous page's continuation to read the next one. Nothing is fetched
    /// implicitly; the caller decides whether to continue.
    pub async fn query_page(
        &self,
        options: &QueryOptions,
        continuation: Option<&Continuation>,
    ) -> Result<QueryPage> {
        let request = RestRequest::get(format_resource(&self.table, None))
            .with_query(options.to_query(continuation));
        let response = self.executor.execute(&request).await?.error_for_status()?;
        Ok(QueryPage {
            entities: response.entities()?,
            continuation: Continuation::from_response(&response),
        })
    }

    /// Submit a batch and return the raw outcome without judging it.
    pub async fn submit(&self, batch: &Batch) -> Result<BatchResponse> {
        self.executor.execute_batch(batch).await
    }

    /// Commit a batch, raising the first failure with its Content-ID attached.
    ///
    /// ETags of inserted, replaced and merged entities are refreshed. An empty batch is a
    /// no-op. A reply that does not answer every operation is a framing error.
    pub async fn commit(&self, batch: &mut Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let response = self.submit(batch).await?.error_for_status()?;
        response.ensure_complete(batch.len())?;
        refresh_batch(batch, &response);
        Ok(())
    }

    /// Commit a batch. `Ok(false)` when any operation failed its precondition, in which case
    /// nothing was written.
    pub async fn try_commit(&self, batch: &mut Batch) -> Result<bool> {
        if batch.is_empty() {
            return Ok(true);
        }
        let response = self.submit(batch).await?;
        if response.precondition_failed() {
            return Ok(false);
        }
        let response = response.error_for_status()?;
        response.ensure_complete(batch.len())?;
        refresh_batch(batch, &response);
        Ok(true)
    }

    fn resource(&self, partition_key: &str, row_key: &str) -> String {
        format_resource(&self.table, Some((partition_key, row_key)))
    }

    async fn send_insert(&self, entity: &Entity) -> Result<RestResponse> {
        let request = RestRequest::new("POST", format_resource(&self.table, None))
            .with_body(encode_entity(entity)?);
        self.executor.execute(&request).await
    }

    async fn write(
        &self,
        method: &str,
        entity: &mut Entity,
        fields: Option<&[&str]>,
        precondition: Option<Precondition>,
    ) -> Result<()> {
        let body = match fields.filter(|f| !f.is_empty()) {
            Some(fields) => encode_entity(&entity.project(fields))?,
            None => encode_entity(entity)?,
        };
        let request = RestRequest::new(method, self.resource(entity.partition_key(), entity.row_key()))
            .with_body(body)
            .with_if_match(precondition.map(|p| p.header_value().to_string()));

        let response = self.executor.execute(&request).await?.error_for_status()?;
        if let Some(etag) = response.etag() {
            entity.set_etag(Some(etag));
        }
        Ok(())
    }
}

fn condition(entity: &Entity, unconditional: bool) -> Precondition {
    if unconditional {
        Precondition::Unconditional
    } else {
        entity.precondition()
    }
}

fn tolerate_precondition(result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.is_precondition_failed() => Ok(false),
        Err(err) => Err(err),
    }
}

/// Take the ETag and timestamp the service assigned on insert.
fn refresh_from_entry(entity: &mut Entity, response: &RestResponse) -> Result<()> {
    if !response.body.trim().is_empty() {
        let stored = response.entity()?;
        entity.set_timestamp(stored.timestamp());
        if stored.etag().is_some() {
            entity.set_etag(stored.etag().map(str::to_string));
        }
    }
    if let Some(etag) = response.etag() {
        entity.set_etag(Some(etag));
    }
    Ok(())
}

fn refresh_batch(batch: &mut Batch, response: &BatchResponse) {
    for sub in response {
        let (Some(index), Some(etag)) = (sub.index(), sub.response.etag()) else {
            continue;
        };
        batch.refresh_etag(index, etag);
    }
}
