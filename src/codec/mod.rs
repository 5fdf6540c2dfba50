//! ATOM/EDM document codec.
//!
//! Entities travel as an ATOM `entry` whose `content` holds an `m:properties` element.
//! Each property is a `d:`-prefixed element named after the field, tagged with an `m:type`
//! attribute unless it is a plain string:
//!
//! ```xml
//! <m:properties>
//!   <d:PartitionKey>P</d:PartitionKey>
//!   <d:RowKey>R</d:RowKey>
//!   <d:Count m:type="Edm.Int32">3</d:Count>
//!   <d:Active m:type="Edm.Boolean">true</d:Active>
//! </m:properties>
//! ```
//!
//! Failures come back as a small `<error>` document, decoded by [`parse_service_error`].
//!
//! # Examples
//!
//! ```
//! use tablestore_http::codec::{decode_entity, encode_entity};
//! use tablestore_http::Entity;
//!
//! let mut entity = Entity::new("P", "R").unwrap();
//! entity.set("Count", 3i32).unwrap();
//!
//! let xml = encode_entity(&entity).unwrap();
//! assert!(xml.contains(r#"<d:Count m:type="Edm.Int32">3</d:Count>"#));
//!
//! let decoded = decode_entity(&xml).unwrap();
//! assert_eq!(decoded.get_i32("Count"), Some(3));
//! ```

mod entity;
mod error_body;

pub use entity::{
    decode_entity, decode_feed, decode_value, encode_entity, encode_entity_at, encode_table_entry,
};
pub use error_body::parse_service_error;
