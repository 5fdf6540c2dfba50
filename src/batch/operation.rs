//! Batch operations and the entity group transaction builder.

use crate::error::{Result, ValidationError};
use crate::protocol::format_resource;
use crate::types::{validate_key, Entity, Precondition, PARTITION_KEY, ROW_KEY};
use std::collections::HashSet;

/// Most operations a single entity group transaction may carry.
pub const MAX_OPERATIONS: usize = 100;

/// What a batch operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Create a new entity (`POST table`)
    Insert,
    /// Upsert, replacing any existing entity (`PUT`, no precondition)
    InsertOrUpdate,
    /// Replace an existing entity (`PUT` with `If-Match`)
    Update,
    /// Merge fields into an existing entity (`MERGE` with `If-Match`)
    Merge,
    /// Remove an entity (`DELETE` with `If-Match`)
    Delete,
}

impl OperationKind {
    /// HTTP method of the embedded request.
    pub fn method(&self) -> &'static str {
        match self {
            OperationKind::Insert => "POST",
            OperationKind::InsertOrUpdate | OperationKind::Update => "PUT",
            OperationKind::Merge => "MERGE",
            OperationKind::Delete => "DELETE",
        }
    }

    /// Whether the service answers with a fresh ETag the caller should keep.
    pub fn refreshes_etag(&self) -> bool {
        !matches!(self, OperationKind::Delete)
    }
}

/// One operation of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOperation {
    kind: OperationKind,
    partition_key: String,
    row_key: String,
    entity: Option<Entity>,
    precondition: Option<Precondition>,
}

impl BatchOperation {
    /// Operation kind.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Partition key targeted.
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Row key targeted.
    pub fn row_key(&self) -> &str {
        &self.row_key
    }

    /// Entity sent as body; `None` for deletes.
    pub fn entity(&self) -> Option<&Entity> {
        self.entity.as_ref()
    }

    /// `If-Match` precondition, if any.
    pub fn precondition(&self) -> Option<&Precondition> {
        self.precondition.as_ref()
    }

    /// Resource path relative to the account endpoint.
    pub fn resource(&self, table: &str) -> String {
        match self.kind {
            OperationKind::Insert => format_resource(table, None),
            _ => format_resource(table, Some((&self.partition_key, &self.row_key))),
        }
    }
}

/// An entity group transaction under construction.
///
/// Operations are validated as they are added: all must share one partition key, each row
/// may be touched once, and at most [`MAX_OPERATIONS`] are allowed.
///
/// ```
/// use tablestore_http::{Batch, Entity};
///
/// let mut batch = Batch::new("Orders");
/// batch.insert(Entity::new("c1", "o1").unwrap()).unwrap();
/// batch.delete_key("c1", "o2", None).unwrap();
///
/// // a second partition is refused before anything is sent
/// assert!(batch.insert(Entity::new("c2", "o3").unwrap()).is_err());
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    table: String,
    partition_key: Option<String>,
    rows: HashSet<String>,
    operations: Vec<BatchOperation>,
}

impl Batch {
    /// Empty batch against `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            partition_key: None,
            rows: HashSet::new(),
            operations: Vec::new(),
        }
    }

    /// Table the batch writes to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Partition shared by every operation, once the first one is added.
    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }

    /// Operations in declaration order.
    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// True when no operation was added.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Insert a new entity.
    pub fn insert(&mut self, entity: Entity) -> Result<()> {
        self.push_entity(OperationKind::Insert, entity, None)
    }

    /// Insert or replace an entity, without precondition.
    pub fn insert_or_update(&mut self, entity: Entity) -> Result<()> {
        self.push_entity(OperationKind::InsertOrUpdate, entity, None)
    }

    /// Replace an entity. Conditional on its ETag unless `unconditional` or it has none.
    pub fn update(&mut self, entity: Entity, unconditional: bool) -> Result<()> {
        let precondition = condition(&entity, unconditional);
        self.push_entity(OperationKind::Update, entity, Some(precondition))
    }

    /// Merge an entity's fields. Conditional on its ETag unless `unconditional` or it has none.
    pub fn merge(&mut self, entity: Entity, unconditional: bool) -> Result<()> {
        let precondition = condition(&entity, unconditional);
        self.push_entity(OperationKind::Merge, entity, Some(precondition))
    }

    /// Delete an entity. Conditional on its ETag unless `unconditional` or it has none.
    pub fn delete(&mut self, entity: &Entity, unconditional: bool) -> Result<()> {
        let etag = if unconditional { None } else { entity.etag() };
        self.delete_key(entity.partition_key(), entity.row_key(), etag)
    }

    /// Delete by key. `None` deletes unconditionally.
    pub fn delete_key(&mut self, partition_key: &str, row_key: &str, etag: Option<&str>) -> Result<()> {
        self.push(BatchOperation {
            kind: OperationKind::Delete,
            partition_key: partition_key.to_string(),
            row_key: row_key.to_string(),
            entity: None,
            precondition: Some(Precondition::from_etag(etag)),
        })
    }

    /// Entities carried by the operations, with ETags refreshed after a commit.
    pub fn into_entities(self) -> Vec<Entity> {
        self.operations.into_iter().filter_map(|op| op.entity).collect()
    }

    /// Entity of the operation at `index`.
    pub fn entity(&self, index: usize) -> Option<&Entity> {
        self.operations.get(index).and_then(|op| op.entity.as_ref())
    }

    /// Store the ETag returned for operation `index`. Deletes and unknown indices are ignored.
    pub(crate) fn refresh_etag(&mut self, index: usize, etag: String) {
        if let Some(op) = self.operations.get_mut(index) {
            if op.kind.refreshes_etag() {
                if let Some(entity) = op.entity.as_mut() {
                    entity.set_etag(Some(etag));
                }
            }
        }
    }

    fn push_entity(
        &mut self,
        kind: OperationKind,
        entity: Entity,
        precondition: Option<Precondition>,
    ) -> Result<()> {
        self.push(BatchOperation {
            kind,
            partition_key: entity.partition_key().to_string(),
            row_key: entity.row_key().to_string(),
            entity: Some(entity),
            precondition,
        })
    }

    fn push(&mut self, operation: BatchOperation) -> Result<()> {
        validate_key(PARTITION_KEY, &operation.partition_key)?;
        validate_key(ROW_KEY, &operation.row_key)?;

        if self.operations.len() >= MAX_OPERATIONS {
            return Err(ValidationError::TooManyOperations(MAX_OPERATIONS).into());
        }
        if let Some(expected) = &self.partition_key {
            if *expected != operation.partition_key {
                return Err(ValidationError::MixedPartition {
                    expected: expected.clone(),
                    found: operation.partition_key,
                }
                .into());
            }
        }
        if self.rows.contains(&operation.row_key) {
            return Err(ValidationError::DuplicateRow(operation.row_key).into());
        }

        self.partition_key
            .get_or_insert_with(|| operation.partition_key.clone());
        self.rows.insert(operation.row_key.clone());
        self.operations.push(operation);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TableError;

    fn entity(pk: &str, rk: &str) -> Entity {
        Entity::new(pk, rk).unwrap()
    }

    fn validation(err: TableError) -> ValidationError {
        match err {
            TableError::Validation(v) => v,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_mixed_partition_rejected() {
        let mut batch = Batch::new("T");
        batch.insert(entity("a", "1")).unwrap();
        let err = validation(batch.insert(entity("b", "2")).unwrap_err());
        assert_eq!(
            err,
            ValidationError::MixedPartition { expected: "a".into(), found: "b".into() }
        );
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_duplicate_row_rejected() {
        let mut batch = Batch::new("T");
        batch.insert(entity("a", "1")).unwrap();
        let err = validation(batch.delete_key("a", "1", None).unwrap_err());
        assert_eq!(err, ValidationError::DuplicateRow("1".into()));
    }

    #[test]
    fn test_operation_limit() {
        let mut batch = Batch::new("T");
        for i in 0..MAX_OPERATIONS {
            batch.insert(entity("a", &i.to_string())).unwrap();
        }
        let err = validation(batch.insert(entity("a", "overflow")).unwrap_err());
        assert_eq!(err, ValidationError::TooManyOperations(MAX_OPERATIONS));
    }

    #[test]
    fn test_preconditions() {
        let mut tagged = entity("a", "1");
        tagged.set_etag(Some("W/\"1\"".into()));

        let mut batch = Batch::new("T");
        batch.update(tagged.clone(), false).unwrap();
        batch.merge(entity("a", "2"), false).unwrap();
        batch.insert_or_update(entity("a", "3")).unwrap();
        let mut other = entity("a", "4");
        other.set_etag(Some("W/\"4\"".into()));
        batch.delete(&other, true).unwrap();

        let ops = batch.operations();
        assert_eq!(ops[0].precondition(), Some(&Precondition::IfMatch("W/\"1\"".into())));
        assert_eq!(ops[1].precondition(), Some(&Precondition::Unconditional));
        assert_eq!(ops[2].precondition(), None);
        assert_eq!(ops[3].precondition(), Some(&Precondition::Unconditional));
    }

    #[test]
    fn test_refresh_etag_skips_deletes() {
        let mut batch = Batch::new("T");
        batch.insert(entity("a", "1")).unwrap();
        batch.delete_key("a", "2", None).unwrap();
        batch.refresh_etag(0, "new".into());
        batch.refresh_etag(1, "ignored".into());
        batch.refresh_etag(7, "ignored".into());
        assert_eq!(batch.entity(0).and_then(Entity::etag), Some("new"));
    }

    #[test]
    fn test_resources() {
        let mut batch = Batch::new("T");
        batch.insert(entity("a", "1")).unwrap();
        batch.delete_key("a", "2", None).unwrap();
        assert_eq!(batch.operations()[0].resource("T"), "T");
        assert_eq!(batch.operations()[1].resource("T"), "T(PartitionKey='a',RowKey='2')");
    }
}
