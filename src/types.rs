//! Core data model: entities, EDM values and optimistic-concurrency preconditions.
//!
//! An [`Entity`] is a schema-less record addressed by its partition key and row key.
//! Every field holds an [`EdmValue`], one variant per EDM type the wire format can tag.
//! System properties (`PartitionKey`, `RowKey`, `Timestamp`, `ETag`) live in dedicated
//! slots and can never appear among the generic fields.
//!
//! # Examples
//!
//! ```
//! use tablestore_http::{EdmValue, Entity};
//!
//! let mut entity = Entity::new("users", "alice").unwrap();
//! entity.set("Age", 30i32).unwrap();
//! entity.set("Active", true).unwrap();
//!
//! assert_eq!(entity.get_i32("Age"), Some(30));
//! assert_eq!(entity.get("Active"), Some(&EdmValue::Boolean(true)));
//! assert!(entity.etag().is_none());
//! ```

use crate::error::{Result, ValidationError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

/// Reserved element name for the partition key.
pub const PARTITION_KEY: &str = "PartitionKey";
/// Reserved element name for the row key.
pub const ROW_KEY: &str = "RowKey";
/// Reserved element name for the server timestamp.
pub const TIMESTAMP: &str = "Timestamp";
/// Name under which the concurrency token is exchanged with record types.
pub const ETAG: &str = "ETag";

/// Longest partition or row key accepted by the service, in characters.
pub const MAX_KEY_LENGTH: usize = 1024;

const RESERVED_NAMES: [&str; 4] = [PARTITION_KEY, ROW_KEY, TIMESTAMP, ETAG];

fn key_regex() -> &'static Regex {
    static KEY: OnceLock<Regex> = OnceLock::new();
    KEY.get_or_init(|| Regex::new(r"^[^#/\\?]*$").expect("static regex"))
}

fn field_name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,254}$").expect("static regex"))
}

fn table_name_regex() -> &'static Regex {
    static TABLE: OnceLock<Regex> = OnceLock::new();
    TABLE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]{2,62}$").expect("static regex"))
}

/// Check a table name: a letter followed by 2 to 62 letters or digits.
pub fn validate_table_name(name: &str) -> Result<()> {
    if table_name_regex().is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::InvalidTableName(name.to_string()).into())
    }
}

/// Check a partition or row key against the service rules.
///
/// Keys may be empty, may not exceed [`MAX_KEY_LENGTH`] characters and may not contain
/// `#`, `/`, `\` or `?`.
pub fn validate_key(key: &'static str, value: &str) -> Result<()> {
    if value.chars().count() > MAX_KEY_LENGTH {
        return Err(ValidationError::InvalidKeyField {
            key,
            reason: format!("longer than {} characters", MAX_KEY_LENGTH),
        }
        .into());
    }
    if !key_regex().is_match(value) {
        return Err(ValidationError::InvalidKeyField {
            key,
            reason: "contains one of '#', '/', '\\', '?'".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Check that `name` can be used as a generic field.
pub fn validate_field_name(name: &str) -> Result<()> {
    if RESERVED_NAMES.contains(&name) {
        return Err(ValidationError::ReservedFieldName(name.to_string()).into());
    }
    if !field_name_regex().is_match(name) {
        return Err(ValidationError::InvalidFieldName(name.to_string()).into());
    }
    Ok(())
}

/// EDM type tags understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdmType {
    /// `Edm.Binary`
    Binary,
    /// `Edm.Boolean`
    Boolean,
    /// `Edm.DateTime`
    DateTime,
    /// `Edm.Double`
    Double,
    /// `Edm.Guid`
    Guid,
    /// `Edm.Int32`
    Int32,
    /// `Edm.Int64`
    Int64,
    /// `Edm.String`, the default when no type attribute is present
    String,
}

impl EdmType {
    /// The wire name used in the `m:type` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            EdmType::Binary => "Edm.Binary",
            EdmType::Boolean => "Edm.Boolean",
            EdmType::DateTime => "Edm.DateTime",
            EdmType::Double => "Edm.Double",
            EdmType::Guid => "Edm.Guid",
            EdmType::Int32 => "Edm.Int32",
            EdmType::Int64 => "Edm.Int64",
            EdmType::String => "Edm.String",
        }
    }

    /// Look up a wire type name. Unknown names yield `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "Edm.Binary" => Some(EdmType::Binary),
            "Edm.Boolean" => Some(EdmType::Boolean),
            "Edm.DateTime" => Some(EdmType::DateTime),
            "Edm.Double" => Some(EdmType::Double),
            "Edm.Guid" => Some(EdmType::Guid),
            "Edm.Int32" => Some(EdmType::Int32),
            "Edm.Int64" => Some(EdmType::Int64),
            "Edm.String" => Some(EdmType::String),
            _ => None,
        }
    }
}

impl fmt::Display for EdmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum EdmValue {
    /// Raw bytes, base64 on the wire
    Binary(Vec<u8>),
    /// `true` / `false`
    Boolean(bool),
    /// UTC instant, ISO-8601 on the wire
    DateTime(DateTime<Utc>),
    /// IEEE double
    Double(f64),
    /// Dashed GUID
    Guid(Uuid),
    /// 32-bit integer
    Int32(i32),
    /// 64-bit integer
    Int64(i64),
    /// UTF-8 text
    String(String),
}

impl EdmValue {
    /// The EDM type tag of this value.
    pub fn edm_type(&self) -> EdmType {
        match self {
            EdmValue::Binary(_) => EdmType::Binary,
            EdmValue::Boolean(_) => EdmType::Boolean,
            EdmValue::DateTime(_) => EdmType::DateTime,
            EdmValue::Double(_) => EdmType::Double,
            EdmValue::Guid(_) => EdmType::Guid,
            EdmValue::Int32(_) => EdmType::Int32,
            EdmValue::Int64(_) => EdmType::Int64,
            EdmValue::String(_) => EdmType::String,
        }
    }

    /// Wire text of the value, without escaping.
    pub fn to_wire_text(&self) -> String {
        match self {
            EdmValue::Binary(bytes) => BASE64.encode(bytes),
            EdmValue::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            EdmValue::DateTime(dt) => format_datetime(dt),
            EdmValue::Double(d) => format_double(*d),
            EdmValue::Guid(g) => g.hyphenated().to_string(),
            EdmValue::Int32(i) => i.to_string(),
            EdmValue::Int64(i) => i.to_string(),
            EdmValue::String(s) => s.clone(),
        }
    }

    /// JSON rendering for application layers. Binary becomes base64 text.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            EdmValue::Boolean(b) => serde_json::Value::Bool(*b),
            EdmValue::Int32(i) => serde_json::Value::from(*i),
            EdmValue::Int64(i) => serde_json::Value::from(*i),
            EdmValue::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            other => serde_json::Value::String(other.to_wire_text()),
        }
    }
}

/// Round-trip ISO-8601 text for an instant, always in UTC with a `Z` suffix.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Locale-invariant text for a double, using the service spellings for non-finite values.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d == f64::INFINITY {
        "INF".to_string()
    } else if d == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        d.to_string()
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for EdmValue {
                fn from(value: $ty) -> Self {
                    EdmValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_value! {
    Vec<u8> => Binary,
    &[u8] => Binary,
    bool => Boolean,
    DateTime<Utc> => DateTime,
    f64 => Double,
    Uuid => Guid,
    i32 => Int32,
    i64 => Int64,
    String => String,
    &str => String,
}

/// Optimistic-concurrency precondition sent as `If-Match`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// `If-Match: *`
    Unconditional,
    /// `If-Match: <etag>`
    IfMatch(String),
}

impl Precondition {
    /// Use the entity's ETag when it has one, otherwise go unconditional.
    pub fn from_etag(etag: Option<&str>) -> Self {
        match etag {
            Some(etag) => Precondition::IfMatch(etag.to_string()),
            None => Precondition::Unconditional,
        }
    }

    /// Header value for `If-Match`.
    pub fn header_value(&self) -> &str {
        match self {
            Precondition::Unconditional => "*",
            Precondition::IfMatch(etag) => etag,
        }
    }
}

/// The explicit field-extraction contract: any record type that can list its keys and
/// named typed fields can be stored.
///
/// ```
/// use tablestore_http::{EdmValue, Entity, TableRecord};
///
/// struct Order { customer: String, id: String, total: f64 }
///
/// impl TableRecord for Order {
///     fn partition_key(&self) -> &str { &self.customer }
///     fn row_key(&self) -> &str { &self.id }
///     fn fields(&self) -> Vec<(String, EdmValue)> {
///         vec![("Total".to_string(), EdmValue::Double(self.total))]
///     }
/// }
///
/// let order = Order { customer: "c1".into(), id: "o1".into(), total: 9.5 };
/// let entity = Entity::from_record(&order).unwrap();
/// assert_eq!(entity.get_f64("Total"), Some(9.5));
/// ```
pub trait TableRecord {
    /// Partition key of the record.
    fn partition_key(&self) -> &str;
    /// Row key of the record.
    fn row_key(&self) -> &str;
    /// Concurrency token from a previous read or write.
    fn etag(&self) -> Option<&str> {
        None
    }
    /// Named typed fields, excluding system properties.
    fn fields(&self) -> Vec<(String, EdmValue)>;
}

/// A table entity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entity {
    partition_key: String,
    row_key: String,
    timestamp: Option<DateTime<Utc>>,
    etag: Option<String>,
    fields: BTreeMap<String, EdmValue>,
}

impl Entity {
    /// Create an entity, validating both keys.
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Result<Self> {
        let partition_key = partition_key.into();
        let row_key = row_key.into();
        validate_key(PARTITION_KEY, &partition_key)?;
        validate_key(ROW_KEY, &row_key)?;
        Ok(Self {
            partition_key,
            row_key,
            ..Default::default()
        })
    }

    /// Build an entity from any [`TableRecord`].
    pub fn from_record<R: TableRecord + ?Sized>(record: &R) -> Result<Self> {
        let mut entity = Self::new(record.partition_key(), record.row_key())?;
        entity.etag = record.etag().map(str::to_string);
        for (name, value) in record.fields() {
            entity.set(name, value)?;
        }
        Ok(entity)
    }

    /// Build an entity from a dynamic JSON object.
    ///
    /// `PartitionKey` and `RowKey` must be strings; `ETag`, when present, must be a string.
    /// Other members become fields: strings, booleans and numbers are accepted, integers
    /// become `Int32` when they fit and `Int64` otherwise. Nulls, arrays and objects have no
    /// EDM representation and are rejected.
    pub fn from_json(object: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let partition_key = object
            .get(PARTITION_KEY)
            .and_then(|v| v.as_str())
            .ok_or(ValidationError::MissingKey(PARTITION_KEY))?;
        let row_key = object
            .get(ROW_KEY)
            .and_then(|v| v.as_str())
            .ok_or(ValidationError::MissingKey(ROW_KEY))?;

        let mut entity = Self::new(partition_key, row_key)?;

        for (name, value) in object {
            match name.as_str() {
                PARTITION_KEY | ROW_KEY => {}
                ETAG => match value {
                    serde_json::Value::String(etag) => entity.etag = Some(etag.clone()),
                    other => return Err(unsupported(name, other)),
                },
                _ => {
                    let value = json_to_edm(name, value)?;
                    entity.set(name.clone(), value)?;
                }
            }
        }

        Ok(entity)
    }

    pub(crate) fn empty() -> Self {
        Self::default()
    }

    /// Partition key.
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Row key.
    pub fn row_key(&self) -> &str {
        &self.row_key
    }

    /// Server-assigned timestamp, if the entity was read from the service.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Concurrency token, absent until the entity has been persisted.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Replace the concurrency token.
    pub fn set_etag(&mut self, etag: Option<String>) {
        self.etag = etag;
    }

    pub(crate) fn set_partition_key_unchecked(&mut self, key: String) {
        self.partition_key = key;
    }

    pub(crate) fn set_row_key_unchecked(&mut self, key: String) {
        self.row_key = key;
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: Option<DateTime<Utc>>) {
        self.timestamp = timestamp;
    }

    pub(crate) fn insert_decoded(&mut self, name: String, value: EdmValue) {
        self.fields.insert(name, value);
    }

    /// The precondition matching the current ETag.
    pub fn precondition(&self) -> Precondition {
        Precondition::from_etag(self.etag())
    }

    /// Set a field. System property names and non-identifier names are rejected.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<EdmValue>) -> Result<()> {
        let name = name.into();
        validate_field_name(&name)?;
        self.fields.insert(name, value.into());
        Ok(())
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<EdmValue> {
        self.fields.remove(name)
    }

    /// Raw field access.
    pub fn get(&self, name: &str) -> Option<&EdmValue> {
        self.fields.get(name)
    }

    /// All generic fields, ordered by name.
    pub fn fields(&self) -> &BTreeMap<String, EdmValue> {
        &self.fields
    }

    /// String field.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(EdmValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Boolean field.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.fields.get(name) {
            Some(EdmValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Int32 field.
    pub fn get_i32(&self, name: &str) -> Option<i32> {
        match self.fields.get(name) {
            Some(EdmValue::Int32(i)) => Some(*i),
            _ => None,
        }
    }

    /// Int64 field. Int32 values widen.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.fields.get(name) {
            Some(EdmValue::Int64(i)) => Some(*i),
            Some(EdmValue::Int32(i)) => Some(i64::from(*i)),
            _ => None,
        }
    }

    /// Double field.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.fields.get(name) {
            Some(EdmValue::Double(d)) => Some(*d),
            _ => None,
        }
    }

    /// DateTime field.
    pub fn get_datetime(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.fields.get(name) {
            Some(EdmValue::DateTime(dt)) => Some(*dt),
            _ => None,
        }
    }

    /// Guid field.
    pub fn get_guid(&self, name: &str) -> Option<Uuid> {
        match self.fields.get(name) {
            Some(EdmValue::Guid(g)) => Some(*g),
            _ => None,
        }
    }

    /// Binary field.
    pub fn get_binary(&self, name: &str) -> Option<&[u8]> {
        match self.fields.get(name) {
            Some(EdmValue::Binary(b)) => Some(b),
            _ => None,
        }
    }

    /// Copy of this entity keeping only the named fields. Keys, timestamp and ETag are kept.
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let fields = self
            .fields
            .iter()
            .filter(|(name, _)| names.iter().any(|n| n.as_ref() == name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self {
            partition_key: self.partition_key.clone(),
            row_key: self.row_key.clone(),
            timestamp: self.timestamp,
            etag: self.etag.clone(),
            fields,
        }
    }

    /// JSON object with keys, timestamp, ETag and fields.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert(PARTITION_KEY.into(), self.partition_key.clone().into());
        object.insert(ROW_KEY.into(), self.row_key.clone().into());
        if let Some(ts) = &self.timestamp {
            object.insert(TIMESTAMP.into(), format_datetime(ts).into());
        }
        if let Some(etag) = &self.etag {
            object.insert(ETAG.into(), etag.clone().into());
        }
        for (name, value) in &self.fields {
            object.insert(name.clone(), value.to_json());
        }
        serde_json::Value::Object(object)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Partition: {}, Row: {}", self.partition_key, self.row_key)
    }
}

impl TableRecord for Entity {
    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn row_key(&self) -> &str {
        &self.row_key
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    fn fields(&self) -> Vec<(String, EdmValue)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn unsupported(name: &str, value: &serde_json::Value) -> crate::error::TableError {
    let kind = match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    };
    ValidationError::UnsupportedFieldType {
        field: name.to_string(),
        kind: kind.to_string(),
    }
    .into()
}

fn json_to_edm(name: &str, value: &serde_json::Value) -> Result<EdmValue> {
    match value {
        serde_json::Value::String(s) => Ok(EdmValue::String(s.clone())),
        serde_json::Value::Bool(b) => Ok(EdmValue::Boolean(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(match i32::try_from(i) {
                    Ok(small) => EdmValue::Int32(small),
                    Err(_) => EdmValue::Int64(i),
                })
            } else if let Some(d) = n.as_f64() {
                Ok(EdmValue::Double(d))
            } else {
                Err(unsupported(name, value))
            }
        }
        other => Err(unsupported(name, other)),
    }
}
