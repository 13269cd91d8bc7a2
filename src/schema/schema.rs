use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::analysis::analyzer::Analyzer;
use crate::categorise::hierarchy::CategoryHierarchy;
use crate::core::error::{Error, Result};
use crate::core::validate::validate_doc_id;
use crate::engine::document::Document;
use crate::engine::serialise;
use crate::schema::field::{glob_match, FieldConfig, TooLongAction};

/// Collection-level state a schema consults while processing: category
/// hierarchies for `cat` fields.
pub trait SchemaContext {
    fn hierarchy(&self, name: &str) -> Option<&CategoryHierarchy>;
}

/// A context with no hierarchies, for standalone schema use.
pub struct EmptyContext;

impl SchemaContext for EmptyContext {
    fn hierarchy(&self, _name: &str) -> Option<&CategoryHierarchy> {
        None
    }
}

/// Per-document indexing errors. `total_failure` means the document must
/// be dropped rather than indexed partially.
#[derive(Debug, Default)]
pub struct IndexingErrors {
    pub errors: Vec<(String, String)>,
    pub total_failure: bool,
}

impl IndexingErrors {
    pub fn append(&mut self, field: impl Into<String>, msg: impl Into<String>) {
        self.errors.push((field.into(), msg.into()));
    }
}

/// Coerce a scalar to an id-style string: strings pass through, integers
/// format in decimal.
pub fn idstyle_value(value: &Value) -> std::result::Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Ok(u.to_string())
            } else {
                Err("value must be a string or an integer".to_string())
            }
        }
        _ => Err("value must be a string or an integer".to_string()),
    }
}

/// A field-typed document processor for one document type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    type_name: String,
    fields: BTreeMap<String, FieldConfig>,
    patterns: Vec<(String, FieldConfig)>,
}

impl Schema {
    pub fn new(type_name: impl Into<String>) -> Self {
        Schema {
            type_name: type_name.into(),
            ..Schema::default()
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn field(&self, name: &str) -> Option<&FieldConfig> {
        self.fields.get(name)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn from_json(type_name: &str, value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_value("schema must be an object"))?;
        let mut schema = Schema::new(type_name);

        if let Some(fields) = obj.get("fields") {
            let fields = fields
                .as_object()
                .ok_or_else(|| Error::invalid_value("schema fields must be an object"))?;
            for (name, config) in fields {
                let config: FieldConfig = serde_json::from_value(config.clone())?;
                schema.fields.insert(name.clone(), config);
            }
        }

        if let Some(patterns) = obj.get("patterns") {
            let patterns = patterns
                .as_array()
                .ok_or_else(|| Error::invalid_value("schema patterns must be an array"))?;
            for pair in patterns {
                let pair = pair
                    .as_array()
                    .filter(|p| p.len() == 2)
                    .ok_or_else(|| {
                        Error::invalid_value("schema pattern must be a [glob, config] pair")
                    })?;
                let glob = pair[0]
                    .as_str()
                    .ok_or_else(|| Error::invalid_value("pattern glob must be a string"))?;
                let config: FieldConfig = serde_json::from_value(pair[1].clone())?;
                schema.patterns.push((glob.to_string(), config));
            }
        }

        Ok(schema)
    }

    pub fn to_json(&self) -> Value {
        let mut fields = Map::new();
        for (name, config) in &self.fields {
            // FieldConfig serialisation cannot fail.
            fields.insert(name.clone(), serde_json::to_value(config).unwrap());
        }
        let patterns: Vec<Value> = self
            .patterns
            .iter()
            .map(|(glob, config)| {
                Value::Array(vec![
                    Value::String(glob.clone()),
                    serde_json::to_value(config).unwrap(),
                ])
            })
            .collect();
        let mut obj = Map::new();
        obj.insert("fields".to_string(), Value::Object(fields));
        obj.insert("patterns".to_string(), Value::Array(patterns));
        Value::Object(obj)
    }

    /// Monotone merge: new fields may be added; redefining a field with a
    /// different config fails without applying anything; redefining with
    /// the same config is a no-op.
    pub fn merge_from(&mut self, other: &Schema) -> Result<()> {
        for (name, config) in &other.fields {
            if let Some(existing) = self.fields.get(name) {
                if existing != config {
                    return Err(Error::invalid_value(format!(
                        "configuration for field '{}' differs from stored configuration",
                        name
                    )));
                }
            }
        }
        if !other.patterns.is_empty()
            && !self.patterns.is_empty()
            && self.patterns != other.patterns
        {
            return Err(Error::invalid_value(
                "pattern list differs from stored pattern list",
            ));
        }

        for (name, config) in &other.fields {
            self.fields
                .entry(name.clone())
                .or_insert_with(|| config.clone());
        }
        if self.patterns.is_empty() {
            self.patterns = other.patterns.clone();
        }
        Ok(())
    }

    /// Find the config for a field seen during indexing, materialising it
    /// from the first matching pattern when the field is new.
    fn config_for(&mut self, name: &str) -> Option<&FieldConfig> {
        if !self.fields.contains_key(name) {
            let found = self.patterns.iter().find_map(|(glob, config)| {
                glob_match(glob, name).map(|capture| config.expand(&capture))
            });
            if let Some(config) = found {
                self.fields.insert(name.to_string(), config);
            }
        }
        self.fields.get(name)
    }

    fn apply_length_policy(
        value: String,
        max_length: usize,
        action: TooLongAction,
        field: &str,
        errors: &mut IndexingErrors,
    ) -> Option<String> {
        if max_length == 0 || value.len() <= max_length {
            return Some(value);
        }
        match action {
            TooLongAction::Error => {
                errors.append(
                    field,
                    format!(
                        "field value of length {} exceeds maximum of {}",
                        value.len(),
                        max_length
                    ),
                );
                None
            }
            TooLongAction::Truncate => Some(truncate_at_boundary(&value, max_length)),
            TooLongAction::Hash => {
                let digest = format!("{:08x}", crc32fast::hash(value.as_bytes()));
                let keep = max_length.saturating_sub(digest.len());
                let mut result = truncate_at_boundary(&value, keep);
                result.push_str(&digest);
                Some(result)
            }
        }
    }

    /// Process an input JSON object into an engine document, returning the
    /// document and its unique id term (empty when the document carries no
    /// id). Per-field problems are recorded in `errors`; a problem with
    /// the id field marks `total_failure`.
    pub fn process(
        &mut self,
        doc_obj: &Value,
        context: &dyn SchemaContext,
        errors: &mut IndexingErrors,
    ) -> Result<(Document, String)> {
        let obj = doc_obj
            .as_object()
            .ok_or_else(|| Error::invalid_value("input document must be an object"))?;

        let mut doc = Document::new();
        let mut idterm = String::new();
        let mut stored: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        let mut fields_seen: Vec<String> = Vec::new();
        let mut fields_with_errors: Vec<String> = Vec::new();

        for (name, value) in obj {
            let config = match self.config_for(name) {
                Some(config) => config.clone(),
                // No configuration and no matching pattern: the field is
                // not indexed or stored.
                None => continue,
            };
            if matches!(config, FieldConfig::Meta { .. }) {
                // The meta field is derived, never read from the input.
                continue;
            }
            fields_seen.push(name.clone());

            let values: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                Value::Null => Vec::new(),
                other => vec![other],
            };

            let error_count = errors.errors.len();
            let mut position = 0u32;
            for item in values {
                self.process_value(
                    &config,
                    name,
                    item,
                    context,
                    &mut doc,
                    &mut idterm,
                    &mut stored,
                    &mut position,
                    errors,
                )?;
            }
            if errors.errors.len() > error_count {
                fields_with_errors.push(name.clone());
            }
        }

        // Derived meta flags: presence and error markers for other fields.
        let meta = self.fields.values().find_map(|config| match config {
            FieldConfig::Meta { prefix, slot } => Some((prefix.clone(), slot.resolve())),
            _ => None,
        });
        if let Some((prefix, slot)) = meta {
            let mut encoded = Vec::new();
            for name in &fields_seen {
                doc.add_term(&format!("{}\tF{}", prefix, name), 0);
                serialise::encode_entry(&mut encoded, name.as_bytes());
            }
            for name in &fields_with_errors {
                doc.add_term(&format!("{}\tE{}", prefix, name), 0);
            }
            if !encoded.is_empty() {
                doc.append_value(slot, &encoded);
            }
        }

        for (field, values) in stored {
            doc.set_data_field(&field, serde_json::to_string(&Value::Array(values))?);
        }

        Ok((doc, idterm))
    }

    #[allow(clippy::too_many_arguments)]
    fn process_value(
        &self,
        config: &FieldConfig,
        name: &str,
        value: &Value,
        context: &dyn SchemaContext,
        doc: &mut Document,
        idterm: &mut String,
        stored: &mut BTreeMap<String, Vec<Value>>,
        position: &mut u32,
        errors: &mut IndexingErrors,
    ) -> Result<()> {
        let mut store = |field: &str, value: Value| {
            if !field.is_empty() {
                stored.entry(field.to_string()).or_default().push(value);
            }
        };

        match config {
            FieldConfig::Id {
                store_field,
                max_length,
                too_long_action,
            } => {
                let id = match idstyle_value(value) {
                    Ok(id) => id,
                    Err(msg) => {
                        errors.append(name, msg);
                        errors.total_failure = true;
                        return Ok(());
                    }
                };
                if let Some(msg) = validate_doc_id(&id) {
                    errors.append(name, msg);
                    errors.total_failure = true;
                    return Ok(());
                }
                let id = match Self::apply_length_policy(
                    id,
                    *max_length,
                    *too_long_action,
                    name,
                    errors,
                ) {
                    Some(id) => id,
                    None => {
                        errors.total_failure = true;
                        return Ok(());
                    }
                };
                if !idterm.is_empty() {
                    errors.append(name, "multiple document ids stored in document");
                    errors.total_failure = true;
                    return Ok(());
                }
                *idterm = format!("\t{}\t{}", self.type_name, id);
                doc.add_term(idterm, 0);
                store(store_field, Value::String(id));
            }
            FieldConfig::Exact {
                prefix,
                store_field,
                max_length,
                too_long_action,
                wdfinc,
            } => {
                let text = match idstyle_value(value) {
                    Ok(text) => text,
                    Err(msg) => {
                        errors.append(name, msg);
                        return Ok(());
                    }
                };
                let text = match Self::apply_length_policy(
                    text,
                    *max_length,
                    *too_long_action,
                    name,
                    errors,
                ) {
                    Some(text) => text,
                    None => return Ok(()),
                };
                doc.add_term(&format!("{}\t{}", prefix, text), *wdfinc);
                store(store_field, value.clone());
            }
            FieldConfig::Text {
                prefix,
                store_field,
                processor,
                max_length,
                too_long_action,
            } => {
                let text = match value.as_str() {
                    Some(text) => text.to_string(),
                    None => {
                        errors.append(name, "text field value must be a string");
                        return Ok(());
                    }
                };
                let text = match Self::apply_length_policy(
                    text,
                    *max_length,
                    *too_long_action,
                    name,
                    errors,
                ) {
                    Some(text) => text,
                    None => return Ok(()),
                };
                let analyzer = Analyzer::for_processor(processor)?;
                let tokens = analyzer.analyze(&text);
                for token in &tokens {
                    doc.add_posting(
                        &format!("{}\t{}", prefix, token.text),
                        *position + token.position,
                        1,
                    );
                }
                // Leave a gap so phrases cannot span separate values.
                *position += tokens.len() as u32 + 100;
                store(store_field, value.clone());
            }
            FieldConfig::Timestamp { slot, store_field } => {
                let secs = match value.as_u64() {
                    Some(secs) => secs,
                    None => {
                        errors.append(
                            name,
                            "timestamp field value must be a non-negative integer",
                        );
                        return Ok(());
                    }
                };
                let mut encoded = Vec::new();
                serialise::encode_entry(&mut encoded, &serialise::serialise_timestamp(secs));
                doc.append_value(slot.resolve(), &encoded);
                store(store_field, value.clone());
            }
            FieldConfig::Cat {
                prefix,
                store_field,
                max_length,
                too_long_action,
                hierarchy,
            } => {
                let cat = match idstyle_value(value) {
                    Ok(cat) => cat,
                    Err(msg) => {
                        errors.append(name, msg);
                        return Ok(());
                    }
                };
                let cat = match Self::apply_length_policy(
                    cat,
                    *max_length,
                    *too_long_action,
                    name,
                    errors,
                ) {
                    Some(cat) => cat,
                    None => return Ok(()),
                };
                doc.add_term(&format!("{}\t{}", prefix, cat), 1);
                let hierarchy_name = hierarchy.as_deref().unwrap_or(name);
                if let Some(hierarchy) = context.hierarchy(hierarchy_name) {
                    for ancestor in hierarchy.ancestors(&cat) {
                        doc.add_term(&format!("{}\t{}", prefix, ancestor), 0);
                    }
                }
                store(store_field, value.clone());
            }
            FieldConfig::Stored { store_field } => {
                store(store_field, value.clone());
            }
            FieldConfig::Meta { .. } => {}
        }
        Ok(())
    }
}

fn truncate_at_boundary(value: &str, max_bytes: usize) -> String {
    let mut end = max_bytes.min(value.len());
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn simple_schema() -> Schema {
        Schema::from_json(
            "default",
            &json!({
                "fields": {
                    "id": {"type": "id", "store_field": "id"},
                    "tag": {"type": "exact", "prefix": "g", "store_field": "tag"},
                    "text": {"type": "text", "prefix": "t", "store_field": "text",
                             "processor": "stem_en"}
                }
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_process_basic() {
        let mut schema = simple_schema();
        let mut errors = IndexingErrors::default();
        let (doc, idterm) = schema
            .process(
                &json!({"id": ["1"], "tag": "news", "text": "Hello worlds"}),
                &EmptyContext,
                &mut errors,
            )
            .unwrap();
        assert!(errors.errors.is_empty());
        assert_eq!(idterm, "\tdefault\t1");
        assert!(doc.has_term("\tdefault\t1"));
        assert!(doc.has_term("g\tnews"));
        assert!(doc.has_term("t\thello"));
        assert!(doc.has_term("t\tworld"));
        assert_eq!(doc.data_field("text"), Some("[\"Hello worlds\"]"));
        assert_eq!(doc.data_field("id"), Some("[\"1\"]"));
    }

    #[test]
    fn test_multiple_ids_fail() {
        let mut schema = simple_schema();
        let mut errors = IndexingErrors::default();
        schema
            .process(&json!({"id": ["1", "2"]}), &EmptyContext, &mut errors)
            .unwrap();
        assert!(errors.total_failure);
    }

    #[test]
    fn test_invalid_id_fails() {
        let mut schema = simple_schema();
        let mut errors = IndexingErrors::default();
        schema
            .process(&json!({"id": "a/b"}), &EmptyContext, &mut errors)
            .unwrap();
        assert!(errors.total_failure);
    }

    #[test]
    fn test_pattern_materialisation() {
        let mut schema = Schema::from_json(
            "default",
            &json!({
                "patterns": [
                    ["*_tag", {"type": "exact", "prefix": "g*", "store_field": "*_tag"}],
                    ["*", {"type": "text", "prefix": "t", "store_field": "*"}]
                ]
            }),
        )
        .unwrap();
        let mut errors = IndexingErrors::default();
        let (doc, _) = schema
            .process(
                &json!({"colour_tag": "red", "body": "words here"}),
                &EmptyContext,
                &mut errors,
            )
            .unwrap();
        assert!(doc.has_term("gcolour\tred"));
        assert!(doc.has_term("t\twords"));
        // First match wins and is materialised into the field map.
        match schema.field("colour_tag").unwrap() {
            FieldConfig::Exact { prefix, .. } => assert_eq!(prefix, "gcolour"),
            other => panic!("unexpected config: {:?}", other),
        }
        assert_eq!(schema.field_count(), 2);
    }

    #[test]
    fn test_monotone_merge() {
        let mut schema = Schema::from_json(
            "default",
            &json!({"fields": {"store": {"type": "stored", "store_field": "store"}}}),
        )
        .unwrap();

        // Re-merging the same config is a no-op.
        let same = Schema::from_json(
            "default",
            &json!({"fields": {"store": {"type": "stored", "store_field": "store"}}}),
        )
        .unwrap();
        schema.merge_from(&same).unwrap();

        // A different config for an existing field fails and changes
        // nothing.
        let different = Schema::from_json(
            "default",
            &json!({"fields": {"store": {"type": "stored", "store_field": "store2"}}}),
        )
        .unwrap();
        assert!(schema.merge_from(&different).is_err());
        assert_eq!(schema.field("store").unwrap().store_field(), "store");

        // New fields may always be added.
        let extra = Schema::from_json(
            "default",
            &json!({"fields": {"store2": {"type": "stored", "store_field": "store2"}}}),
        )
        .unwrap();
        schema.merge_from(&extra).unwrap();
        assert_eq!(schema.field_count(), 2);

        // Merging twice with the same schema equals merging once.
        let snapshot = schema.clone();
        schema.merge_from(&extra).unwrap();
        assert_eq!(schema, snapshot);
    }

    #[test]
    fn test_too_long_error() {
        let mut schema = Schema::from_json(
            "default",
            &json!({"fields": {
                "tag": {"type": "exact", "prefix": "g", "store_field": "tag",
                        "max_length": 4, "too_long_action": "error"}
            }}),
        )
        .unwrap();
        let mut errors = IndexingErrors::default();
        let (doc, _) = schema
            .process(&json!({"tag": "overlong"}), &EmptyContext, &mut errors)
            .unwrap();
        assert_eq!(errors.errors.len(), 1);
        assert!(!errors.total_failure);
        assert!(!doc.has_term("g\toverlong"));
    }

    #[test]
    fn test_too_long_truncate_and_hash() {
        let mut schema = Schema::from_json(
            "default",
            &json!({"fields": {
                "cut": {"type": "exact", "prefix": "a", "store_field": "",
                        "max_length": 4, "too_long_action": "truncate"},
                "hashed": {"type": "exact", "prefix": "b", "store_field": "",
                           "max_length": 12, "too_long_action": "hash"}
            }}),
        )
        .unwrap();
        let mut errors = IndexingErrors::default();
        let (doc, _) = schema
            .process(
                &json!({"cut": "overlong", "hashed": "averylongvaluehere"}),
                &EmptyContext,
                &mut errors,
            )
            .unwrap();
        assert!(errors.errors.is_empty());
        assert!(doc.has_term("a\tover"));

        // The hashed value keeps a 4-byte head plus an 8-hex-digit tail,
        // deterministically.
        let digest = format!("{:08x}", crc32fast::hash(b"averylongvaluehere"));
        assert!(doc.has_term(&format!("b\taver{}", digest)));
    }

    #[test]
    fn test_cat_ancestors() {
        struct OneHierarchy(CategoryHierarchy);
        impl SchemaContext for OneHierarchy {
            fn hierarchy(&self, name: &str) -> Option<&CategoryHierarchy> {
                (name == "kind").then_some(&self.0)
            }
        }

        let mut hierarchy = CategoryHierarchy::default();
        let mut modified = Default::default();
        hierarchy.add_parent("poodle", "dog", &mut modified);
        hierarchy.add_parent("dog", "animal", &mut modified);

        let mut schema = Schema::from_json(
            "default",
            &json!({"fields": {
                "kind": {"type": "cat", "prefix": "c", "store_field": "kind"}
            }}),
        )
        .unwrap();
        let mut errors = IndexingErrors::default();
        let (doc, _) = schema
            .process(
                &json!({"kind": "poodle"}),
                &OneHierarchy(hierarchy),
                &mut errors,
            )
            .unwrap();
        assert!(doc.has_term("c\tpoodle"));
        assert!(doc.has_term("c\tdog"));
        assert!(doc.has_term("c\tanimal"));
    }

    #[test]
    fn test_meta_flags() {
        let mut schema = Schema::from_json(
            "default",
            &json!({"fields": {
                "tag": {"type": "exact", "prefix": "g", "store_field": "tag",
                        "max_length": 4, "too_long_action": "error"},
                "_meta": {"type": "meta", "prefix": "#", "slot": 0}
            }}),
        )
        .unwrap();
        let mut errors = IndexingErrors::default();
        let (doc, _) = schema
            .process(&json!({"tag": "overlong"}), &EmptyContext, &mut errors)
            .unwrap();
        assert!(doc.has_term("#\tFtag"));
        assert!(doc.has_term("#\tEtag"));
    }

    #[test]
    fn test_json_roundtrip() {
        let schema = simple_schema();
        let back = Schema::from_json("default", &schema.to_json()).unwrap();
        assert_eq!(schema, back);
    }
}
