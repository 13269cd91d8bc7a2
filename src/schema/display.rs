//! Rendering engine documents back to JSON.

use serde_json::{Map, Value};

use crate::core::error::Result;
use crate::core::validate::{hexesc, hexesc_bytes};
use crate::engine::document::Document;

/// Full dump of a document: stored data, terms (with wdf and positions)
/// and value slots. Empty sections are omitted; term and value bytes are
/// hex-escaped.
pub fn doc_to_json(doc: &Document) -> Result<Value> {
    let mut result = Map::new();

    let mut data = Map::new();
    for (field, serialised) in doc.data_fields() {
        data.insert(field.clone(), serde_json::from_str(serialised)?);
    }
    if !data.is_empty() {
        result.insert("data".to_string(), Value::Object(data));
    }

    let mut terms = Map::new();
    for (term, entry) in doc.terms() {
        let mut term_obj = Map::new();
        if entry.wdf != 0 {
            term_obj.insert("wdf".to_string(), entry.wdf.into());
        }
        if !entry.positions.is_empty() {
            term_obj.insert(
                "positions".to_string(),
                Value::Array(entry.positions.iter().map(|p| (*p).into()).collect()),
            );
        }
        terms.insert(hexesc(term), Value::Object(term_obj));
    }
    if !terms.is_empty() {
        result.insert("terms".to_string(), Value::Object(terms));
    }

    let mut values = Map::new();
    for (slot, encoded) in doc.values() {
        values.insert(slot.to_string(), Value::String(hexesc_bytes(encoded)));
    }
    if !values.is_empty() {
        result.insert("values".to_string(), Value::Object(values));
    }

    Ok(Value::Object(result))
}

/// The stored display fields of a document, optionally restricted to a
/// field list.
pub fn display_doc(doc: &Document, fieldlist: Option<&[String]>) -> Result<Value> {
    let mut result = Map::new();
    match fieldlist {
        Some(fields) => {
            for field in fields {
                if let Some(serialised) = doc.data_field(field) {
                    result.insert(field.clone(), serde_json::from_str(serialised)?);
                }
            }
        }
        None => {
            for (field, serialised) in doc.data_fields() {
                result.insert(field.clone(), serde_json::from_str(serialised)?);
            }
        }
    }
    Ok(Value::Object(result))
}
