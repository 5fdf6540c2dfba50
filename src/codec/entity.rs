//! Entity encoding and decoding.

use crate::error::{Result, TableError};
use crate::protocol::constants::namespaces;
use crate::protocol::decode_etag;
use crate::types::{
    format_datetime, validate_field_name, validate_key, EdmType, EdmValue, Entity,
    PARTITION_KEY, ROW_KEY, TIMESTAMP,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use uuid::Uuid;

/// Encode an entity as an ATOM entry, stamping `updated` with the current time.
pub fn encode_entity(entity: &Entity) -> Result<String> {
    encode_entity_at(entity, Utc::now())
}

/// Encode an entity as an ATOM entry with an explicit `updated` instant.
///
/// Keys are validated again here since an entity may have been decoded from elsewhere.
/// The ETag never becomes a body element and the server timestamp is not sent.
pub fn encode_entity_at(entity: &Entity, updated: DateTime<Utc>) -> Result<String> {
    validate_key(PARTITION_KEY, entity.partition_key())?;
    validate_key(ROW_KEY, entity.row_key())?;

    let mut properties = String::new();
    write_property(&mut properties, PARTITION_KEY, None, entity.partition_key());
    write_property(&mut properties, ROW_KEY, None, entity.row_key());

    for (name, value) in entity.fields() {
        validate_field_name(name)?;
        let edm_type = match value.edm_type() {
            EdmType::String => None,
            other => Some(other),
        };
        write_property(&mut properties, name, edm_type, &value.to_wire_text());
    }

    Ok(entry_document(&properties, updated))
}

/// Encode the entry that creates a table.
pub fn encode_table_entry(table: &str) -> String {
    let mut properties = String::new();
    write_property(&mut properties, "TableName", None, table);
    entry_document(&properties, Utc::now())
}

fn entry_document(properties: &str, updated: DateTime<Utc>) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>"#,
            r#"<entry xmlns:d="{data}" xmlns:m="{meta}" xmlns="{atom}">"#,
            r#"<title /><updated>{updated}</updated><author><name /></author><id />"#,
            r#"<content type="application/xml"><m:properties>{properties}</m:properties></content>"#,
            r#"</entry>"#
        ),
        data = namespaces::DATA,
        meta = namespaces::METADATA,
        atom = namespaces::ATOM,
        updated = format_datetime(&updated),
        properties = properties,
    )
}

fn write_property(out: &mut String, name: &str, edm_type: Option<EdmType>, text: &str) {
    match edm_type {
        Some(edm_type) => out.push_str(&format!(
            r#"<d:{name} m:type="{edm_type}">{text}</d:{name}>"#,
            text = escape(text)
        )),
        None => out.push_str(&format!("<d:{name}>{text}</d:{name}>", text = escape(text))),
    }
}

/// Decode a single `entry` document.
pub fn decode_entity(xml: &str) -> Result<Entity> {
    decode_entries(xml)?
        .into_iter()
        .next()
        .ok_or_else(|| TableError::Decode("document contains no entry".to_string()))
}

/// Decode every `entry` of a `feed` document, in document order.
pub fn decode_feed(xml: &str) -> Result<Vec<Entity>> {
    decode_entries(xml)
}

/// Property being accumulated while its element is open.
struct PendingProperty {
    name: String,
    edm_type: Option<String>,
    is_null: bool,
    text: String,
}

fn decode_entries(xml: &str) -> Result<Vec<Entity>> {
    let mut reader = Reader::from_str(xml);
    let mut entities = Vec::new();
    let mut current: Option<Entity> = None;
    let mut in_properties = false;
    let mut pending: Option<PendingProperty> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                on_start(&e, &mut current, &mut in_properties, &mut pending)?;
            }
            Event::Empty(e) => {
                if in_properties {
                    // <d:Name /> and <d:Name m:null="true" /> open and close at once
                    on_start(&e, &mut current, &mut in_properties, &mut pending)?;
                    if let (Some(entity), Some(property)) = (current.as_mut(), pending.take()) {
                        finish_property(entity, property)?;
                    }
                } else if e.local_name().as_ref() == b"entry" {
                    on_start(&e, &mut current, &mut in_properties, &mut pending)?;
                    if let Some(entity) = current.take() {
                        entities.push(entity);
                    }
                }
                // a self-closing <m:properties /> holds no fields
            }
            Event::Text(t) => {
                if let Some(property) = pending.as_mut() {
                    property.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(property) = pending.as_mut() {
                    property.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                let name = name.as_ref();
                if pending.as_ref().is_some_and(|p| p.name.as_bytes() == name) {
                    if let (Some(entity), Some(property)) = (current.as_mut(), pending.take()) {
                        finish_property(entity, property)?;
                    }
                } else if name == b"properties" {
                    in_properties = false;
                } else if name == b"entry" {
                    if let Some(entity) = current.take() {
                        entities.push(entity);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if pending.is_some() || current.is_some() {
        return Err(TableError::Decode("unterminated entry".to_string()));
    }

    Ok(entities)
}

fn on_start(
    e: &BytesStart<'_>,
    current: &mut Option<Entity>,
    in_properties: &mut bool,
    pending: &mut Option<PendingProperty>,
) -> Result<()> {
    let local = e.local_name();
    let local = local.as_ref();

    if *in_properties {
        if pending.is_some() {
            return Err(TableError::Decode("nested property element".to_string()));
        }
        let mut property = PendingProperty {
            name: String::from_utf8_lossy(local).into_owned(),
            edm_type: None,
            is_null: false,
            text: String::new(),
        };
        for attr in e.attributes() {
            let attr = attr?;
            match attr.key.local_name().as_ref() {
                b"type" => property.edm_type = Some(attr.unescape_value()?.into_owned()),
                b"null" => property.is_null = attr.unescape_value()?.trim() == "true",
                _ => {}
            }
        }
        *pending = Some(property);
        return Ok(());
    }

    match local {
        b"entry" => {
            let mut entity = Entity::empty();
            for attr in e.attributes() {
                let attr = attr?;
                if attr.key.local_name().as_ref() == b"etag" {
                    entity.set_etag(Some(decode_etag(&attr.unescape_value()?)));
                }
            }
            *current = Some(entity);
        }
        b"properties" if current.is_some() => *in_properties = true,
        _ => {}
    }
    Ok(())
}

fn finish_property(entity: &mut Entity, property: PendingProperty) -> Result<()> {
    // null-flagged properties are left out rather than represented
    if property.is_null {
        return Ok(());
    }

    match property.name.as_str() {
        PARTITION_KEY => entity.set_partition_key_unchecked(property.text),
        ROW_KEY => entity.set_row_key_unchecked(property.text),
        TIMESTAMP => {
            let timestamp = parse_datetime(&property.text).ok_or_else(|| {
                TableError::Decode(format!("invalid Timestamp `{}`", property.text))
            })?;
            entity.set_timestamp(Some(timestamp));
        }
        _ => {
            let value = decode_value(&property.name, property.edm_type.as_deref(), &property.text)?;
            entity.insert_decoded(property.name, value);
        }
    }
    Ok(())
}

/// Decode one property value from its type attribute and text.
///
/// A missing type attribute means `Edm.String`. An unrecognized type name falls back to
/// the raw text as a string; a recognized type whose text does not parse is an error.
pub fn decode_value(name: &str, edm_type: Option<&str>, text: &str) -> Result<EdmValue> {
    let Some(type_name) = edm_type else {
        return Ok(EdmValue::String(text.to_string()));
    };

    let Some(edm_type) = EdmType::from_wire(type_name) else {
        tracing::debug!(field = name, type_name, "unknown EDM type, keeping raw text");
        return Ok(EdmValue::String(text.to_string()));
    };

    let invalid = || TableError::Decode(format!("field `{}`: invalid {} value `{}`", name, edm_type, text));

    let value = match edm_type {
        EdmType::String => EdmValue::String(text.to_string()),
        EdmType::Binary => EdmValue::Binary(BASE64.decode(text.trim()).map_err(|_| invalid())?),
        EdmType::Boolean => EdmValue::Boolean(parse_bool(text).ok_or_else(invalid)?),
        EdmType::DateTime => EdmValue::DateTime(parse_datetime(text).ok_or_else(invalid)?),
        EdmType::Double => EdmValue::Double(parse_double(text).ok_or_else(invalid)?),
        EdmType::Guid => EdmValue::Guid(Uuid::parse_str(text.trim()).map_err(|_| invalid())?),
        EdmType::Int32 => EdmValue::Int32(text.trim().parse().map_err(|_| invalid())?),
        EdmType::Int64 => EdmValue::Int64(text.trim().parse().map_err(|_| invalid())?),
    };
    Ok(value)
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        t if t.eq_ignore_ascii_case("true") || t == "1" => Some(true),
        t if t.eq_ignore_ascii_case("false") || t == "0" => Some(false),
        _ => None,
    }
}

fn parse_double(text: &str) -> Option<f64> {
    match text.trim() {
        "INF" | "Infinity" => Some(f64::INFINITY),
        "-INF" | "-Infinity" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        t => t.parse().ok(),
    }
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
