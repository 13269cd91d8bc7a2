use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::categorise::categoriser::Categoriser;
use crate::categorise::hierarchy::{Categories, CategoryHierarchy};
use crate::core::error::{Error, Result};
use crate::core::validate::{validate_catid_throw, validate_doc_type};
use crate::engine::document::Document;
use crate::jsonmanip::mapping::Categorise;
use crate::pipeline::pipe::Pipe;
use crate::schema::schema::{idstyle_value, IndexingErrors, Schema, SchemaContext};

/// The current configuration format number, incremented whenever the
/// format changes.
pub const CONFIG_FORMAT: u64 = 3;

/// The oldest configuration format still readable.
pub const CONFIG_FORMAT_OLDEST: u64 = 3;

/// Depth cap backing up the pipe-cycle check.
const MAX_PIPE_DEPTH: usize = 64;

fn check_format_number(format: u64) -> Result<()> {
    if format < CONFIG_FORMAT_OLDEST {
        return Err(Error::invalid_value(format!(
            "configuration supplied is in too old a format: format {} but the oldest supported is {}",
            format, CONFIG_FORMAT_OLDEST
        )));
    }
    if format > CONFIG_FORMAT {
        return Err(Error::invalid_value(format!(
            "configuration supplied is in too new a format: format {} but the newest supported is {}",
            format, CONFIG_FORMAT
        )));
    }
    Ok(())
}

/// Destination for documents leaving the pipeline: the indexing queue of
/// a collection.
pub trait IndexerSink {
    fn queue_index_update(&self, coll_name: &str, idterm: &str, doc: Document) -> Result<()>;
}

fn hierarchy_context(
    categories: &BTreeMap<String, CategoryHierarchy>,
) -> impl SchemaContext + '_ {
    struct Ctx<'a>(&'a BTreeMap<String, CategoryHierarchy>);
    impl SchemaContext for Ctx<'_> {
        fn hierarchy(&self, name: &str) -> Option<&CategoryHierarchy> {
            self.0.get(name)
        }
    }
    Ctx(categories)
}

/// The aggregate configuration of one collection: schemas by document
/// type, pipes, categorisers and category hierarchies, plus the special
/// field names and the blueprint for lazily-created type schemas.
#[derive(Debug, Clone, Default)]
pub struct CollectionConfig {
    name: String,
    types: BTreeMap<String, Schema>,
    pipes: BTreeMap<String, Pipe>,
    categorisers: BTreeMap<String, Categoriser>,
    categories: BTreeMap<String, CategoryHierarchy>,
    default_type_config: Value,
    id_field: String,
    type_field: String,
    meta_field: String,
    changed: bool,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        CollectionConfig {
            name: name.into(),
            default_type_config: Value::Null,
            ..CollectionConfig::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn clear_changed(&mut self) {
        self.changed = false;
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn type_field(&self) -> &str {
        &self.type_field
    }

    /// Install the default configuration: the standard pattern-driven
    /// type blueprint and an empty "default" pipe.
    pub fn set_default(&mut self) {
        self.types.clear();
        self.pipes.clear();
        self.categorisers.clear();
        self.categories.clear();
        self.set_default_schema();
        self.set_pipe("default", Pipe::default());
        self.changed = false;
    }

    fn set_default_schema(&mut self) {
        self.types.clear();
        self.id_field = "id".to_string();
        self.type_field = "type".to_string();
        self.meta_field = "_meta".to_string();

        let blueprint = json!({
            "patterns": [
                ["*_text", {"type": "text", "prefix": "t*", "store_field": "*_text",
                            "processor": "stem_en"}],
                ["text", {"type": "text", "prefix": "t", "store_field": "text",
                          "processor": "stem_en"}],
                ["*_time", {"type": "timestamp", "slot": "d*", "store_field": "*_time"}],
                ["time", {"type": "timestamp", "slot": "d", "store_field": "time"}],
                ["*_tag", {"type": "exact", "prefix": "g*", "store_field": "*_tag",
                           "max_length": 100, "too_long_action": "hash"}],
                ["tag", {"type": "exact", "prefix": "g", "store_field": "tag",
                         "max_length": 100, "too_long_action": "hash"}],
                ["*_url", {"type": "exact", "prefix": "u*", "store_field": "*_url",
                           "max_length": 100, "too_long_action": "hash"}],
                ["url", {"type": "exact", "prefix": "u", "store_field": "url",
                         "max_length": 100, "too_long_action": "hash"}],
                ["*_cat", {"type": "cat", "prefix": "c*", "store_field": "*_cat"}],
                ["cat", {"type": "cat", "prefix": "c", "store_field": "cat"}],
                ["id", {"type": "id", "store_field": "id"}],
                ["type", {"type": "exact", "prefix": "!", "store_field": "type",
                          "wdfinc": 0}],
                ["_meta", {"type": "meta", "prefix": "#", "slot": 0}],
                ["*", {"type": "text", "prefix": "t", "store_field": "*"}]
            ],
            "fields": {}
        });
        // Round-trip through a Schema to validate and normalise.
        let schema = Schema::from_json("", &blueprint).expect("default type blueprint is valid");
        self.default_type_config = schema.to_json();
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();

        let mut types = Map::new();
        for (name, schema) in &self.types {
            types.insert(name.clone(), schema.to_json());
        }
        obj.insert("types".to_string(), Value::Object(types));
        obj.insert("default_type".to_string(), self.default_type_config.clone());
        obj.insert(
            "special_fields".to_string(),
            json!({
                "id_field": self.id_field,
                "type_field": self.type_field,
                "meta_field": self.meta_field,
            }),
        );

        if !self.pipes.is_empty() {
            let mut pipes = Map::new();
            for (name, pipe) in &self.pipes {
                pipes.insert(name.clone(), pipe.to_json());
            }
            obj.insert("pipes".to_string(), Value::Object(pipes));
        }
        if !self.categorisers.is_empty() {
            let mut categorisers = Map::new();
            for (name, categoriser) in &self.categorisers {
                categorisers.insert(name.clone(), categoriser.to_json());
            }
            obj.insert("categorisers".to_string(), Value::Object(categorisers));
        }
        if !self.categories.is_empty() {
            let mut categories = Map::new();
            for (name, hierarchy) in &self.categories {
                categories.insert(name.clone(), hierarchy.to_json());
            }
            obj.insert("categories".to_string(), Value::Object(categories));
        }

        obj.insert("format".to_string(), json!(CONFIG_FORMAT));
        Value::Object(obj)
    }

    /// Merge configuration from JSON into the current state. The format
    /// number is required and gated.
    pub fn from_json(&mut self, value: &Value) -> Result<()> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_value("collection configuration must be an object"))?;

        let format = obj
            .get("format")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::invalid_value("collection configuration lacks a format number"))?;
        check_format_number(format)?;

        if let Some(types) = obj.get("types") {
            let types = types
                .as_object()
                .ok_or_else(|| Error::invalid_value("types definition must be an object"))?;
            for (name, schema_json) in types {
                let schema = Schema::from_json(name, schema_json)?;
                self.set_schema(name, &schema)?;
            }
        }

        if let Some(default_type) = obj.get("default_type") {
            if !default_type.is_null() {
                // Load into a Schema first to verify it.
                Schema::from_json("", default_type)?;
                self.default_type_config = default_type.clone();
            }
        }

        if let Some(special) = obj.get("special_fields") {
            let special = special
                .as_object()
                .ok_or_else(|| Error::invalid_value("special_fields definition must be an object"))?;
            if let Some(id_field) = special.get("id_field").and_then(Value::as_str) {
                self.id_field = id_field.to_string();
            }
            if let Some(type_field) = special.get("type_field").and_then(Value::as_str) {
                self.type_field = type_field.to_string();
            }
            if let Some(meta_field) = special.get("meta_field").and_then(Value::as_str) {
                self.meta_field = meta_field.to_string();
            }
        }

        if let Some(pipes) = obj.get("pipes") {
            let pipes = pipes
                .as_object()
                .ok_or_else(|| Error::invalid_value("pipes definition must be an object"))?;
            for (name, pipe_json) in pipes {
                self.set_pipe(name, Pipe::from_json(pipe_json)?);
            }
        }

        if let Some(categorisers) = obj.get("categorisers") {
            let categorisers = categorisers
                .as_object()
                .ok_or_else(|| Error::invalid_value("categorisers definition must be an object"))?;
            for (name, categoriser_json) in categorisers {
                self.set_categoriser(name, Categoriser::from_json(categoriser_json)?);
            }
        }

        if let Some(categories) = obj.get("categories") {
            let categories = categories
                .as_object()
                .ok_or_else(|| Error::invalid_value("categories definition must be an object"))?;
            for (name, hierarchy_json) in categories {
                self.set_category_hierarchy(name, CategoryHierarchy::from_json(hierarchy_json)?);
            }
        }

        Ok(())
    }

    pub fn get_schema(&self, doc_type: &str) -> Option<&Schema> {
        self.types.get(doc_type)
    }

    /// Merge a schema into the named type, creating it if absent.
    /// Monotone: conflicting redefinitions fail.
    pub fn set_schema(&mut self, doc_type: &str, schema: &Schema) -> Result<()> {
        let entry = self
            .types
            .entry(doc_type.to_string())
            .or_insert_with(|| Schema::new(doc_type));
        entry.merge_from(schema)?;
        self.changed = true;
        Ok(())
    }

    pub fn get_pipe(&self, pipe_name: &str) -> Result<&Pipe> {
        self.pipes
            .get(pipe_name)
            .ok_or_else(|| Error::invalid_value(format!("no pipe of name '{}' found", pipe_name)))
    }

    pub fn set_pipe(&mut self, pipe_name: &str, pipe: Pipe) {
        self.pipes.insert(pipe_name.to_string(), pipe);
        self.changed = true;
    }

    pub fn get_categoriser(&self, name: &str) -> Result<&Categoriser> {
        self.categorisers
            .get(name)
            .ok_or_else(|| Error::invalid_value(format!("no categoriser of name '{}' found", name)))
    }

    pub fn set_categoriser(&mut self, name: &str, categoriser: Categoriser) {
        self.categorisers.insert(name.to_string(), categoriser);
        self.changed = true;
    }

    pub fn get_category_hierarchy(&self, name: &str) -> Option<&CategoryHierarchy> {
        self.categories.get(name)
    }

    pub fn set_category_hierarchy(&mut self, name: &str, hierarchy: CategoryHierarchy) {
        self.categories.insert(name.to_string(), hierarchy);
        self.changed = true;
    }

    fn hierarchy_mut(&mut self, name: &str) -> &mut CategoryHierarchy {
        self.changed = true;
        self.categories.entry(name.to_string()).or_default()
    }

    pub fn category_add(
        &mut self,
        hierarchy: &str,
        cat: &str,
        modified: &mut Categories,
    ) -> Result<()> {
        validate_catid_throw(cat)?;
        self.hierarchy_mut(hierarchy).add(cat, modified);
        Ok(())
    }

    pub fn category_remove(
        &mut self,
        hierarchy: &str,
        cat: &str,
        modified: &mut Categories,
    ) -> Result<()> {
        validate_catid_throw(cat)?;
        self.hierarchy_mut(hierarchy).remove(cat, modified);
        Ok(())
    }

    pub fn category_add_parent(
        &mut self,
        hierarchy: &str,
        child: &str,
        parent: &str,
        modified: &mut Categories,
    ) -> Result<()> {
        validate_catid_throw(child)?;
        validate_catid_throw(parent)?;
        self.hierarchy_mut(hierarchy).add_parent(child, parent, modified);
        Ok(())
    }

    pub fn category_remove_parent(
        &mut self,
        hierarchy: &str,
        child: &str,
        parent: &str,
        modified: &mut Categories,
    ) -> Result<()> {
        validate_catid_throw(child)?;
        validate_catid_throw(parent)?;
        self.hierarchy_mut(hierarchy)
            .remove_parent(child, parent, modified);
        Ok(())
    }

    /// Read the document type from the input, or reconcile it with a
    /// caller-supplied one, storing the resolved type back into the
    /// document. Single-element arrays are accepted; empty or longer
    /// arrays are rejected.
    fn resolve_special_field(
        obj: &mut Map<String, Value>,
        field: &str,
        supplied: &str,
        what: &str,
        errors: &mut IndexingErrors,
    ) -> Option<String> {
        let stored = match obj.get(field) {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => match items.len() {
                0 => {
                    errors.append(field, format!("no document {} stored in document", what));
                    errors.total_failure = true;
                    return None;
                }
                1 => match idstyle_value(&items[0]) {
                    Ok(value) => Some(value),
                    Err(msg) => {
                        errors.append(field, msg);
                        errors.total_failure = true;
                        return None;
                    }
                },
                _ => {
                    errors.append(
                        field,
                        format!("multiple document {}s stored in document", what),
                    );
                    errors.total_failure = true;
                    return None;
                }
            },
            Some(value) => match idstyle_value(value) {
                Ok(value) => Some(value),
                Err(msg) => {
                    errors.append(field, msg);
                    errors.total_failure = true;
                    return None;
                }
            },
        };

        if supplied.is_empty() {
            match stored {
                Some(stored) => Some(stored),
                None => {
                    errors.append(
                        field,
                        format!("no document {} supplied or stored in document", what),
                    );
                    errors.total_failure = true;
                    None
                }
            }
        } else {
            if let Some(stored) = stored {
                if stored != supplied {
                    errors.append(
                        field,
                        format!(
                            "document {} supplied ('{}') differs from that inside document ('{}')",
                            what, supplied, stored
                        ),
                    );
                    errors.total_failure = true;
                    return None;
                }
            }
            obj.insert(field.to_string(), json!([supplied]));
            Some(supplied.to_string())
        }
    }

    /// Process an input document into an engine document, resolving the
    /// document type and id, lazily creating a schema for unknown types
    /// from the default blueprint.
    pub fn process_doc(
        &mut self,
        doc_obj: &Value,
        doc_type: &str,
        doc_id: &str,
        errors: &mut IndexingErrors,
    ) -> Result<(Document, String)> {
        let mut obj = doc_obj
            .as_object()
            .ok_or_else(|| Error::invalid_value("input document must be an object"))?
            .clone();

        let type_field = self.type_field.clone();
        let id_field = self.id_field.clone();

        let resolved_type =
            match Self::resolve_special_field(&mut obj, &type_field, doc_type, "type", errors) {
                Some(t) => t,
                None => return Ok((Document::new(), String::new())),
            };
        if let Some(msg) = validate_doc_type(&resolved_type) {
            errors.append(type_field.as_str(), msg);
            errors.total_failure = true;
            return Ok((Document::new(), String::new()));
        }
        if !doc_id.is_empty()
            && Self::resolve_special_field(&mut obj, &id_field, doc_id, "id", errors).is_none()
        {
            return Ok((Document::new(), String::new()));
        }

        let mut schema = match self.types.remove(&resolved_type) {
            Some(schema) => schema,
            None => {
                self.changed = true;
                Schema::from_json(&resolved_type, &self.default_type_config)?
            }
        };
        let fields_before = schema.field_count();
        let result = {
            let context = hierarchy_context(&self.categories);
            schema.process(&Value::Object(obj), &context, errors)
        };
        if schema.field_count() != fields_before {
            self.changed = true;
        }
        self.types.insert(resolved_type, schema);
        result
    }

    /// Feed a document into the named pipe, recursing through pipe
    /// targets; the empty pipe name delivers to the indexer sink. Pipe
    /// chains that revisit a pipe are rejected.
    pub fn send_to_pipe(
        &mut self,
        sink: &dyn IndexerSink,
        pipe_name: &str,
        obj: Value,
    ) -> Result<()> {
        let mut chain = Vec::new();
        self.send_to_pipe_inner(sink, pipe_name, obj, &mut chain)
    }

    fn send_to_pipe_inner(
        &mut self,
        sink: &dyn IndexerSink,
        pipe_name: &str,
        obj: Value,
        chain: &mut Vec<String>,
    ) -> Result<()> {
        if pipe_name.is_empty() {
            let mut errors = IndexingErrors::default();
            let (doc, idterm) = self.process_doc(&obj, "default", "", &mut errors)?;
            if let Some((field, msg)) = errors.errors.first() {
                return Err(Error::invalid_value(format!("{}: {}", field, msg)));
            }
            return sink.queue_index_update(&self.name, &idterm, doc);
        }

        if chain.iter().any(|applied| applied == pipe_name) {
            return Err(Error::invalid_value(format!(
                "pipe chain loops back into pipe '{}'",
                pipe_name
            )));
        }
        if chain.len() >= MAX_PIPE_DEPTH {
            return Err(Error::invalid_value("pipe chain exceeds maximum depth"));
        }

        let pipe = self.get_pipe(pipe_name)?.clone();
        chain.push(pipe_name.to_string());
        if pipe.mappings.is_empty() {
            // A pipe with no mappings passes the document through
            // unchanged.
            self.send_to_pipe_inner(sink, &pipe.target, obj, chain)?;
            chain.pop();
            return Ok(());
        }
        for mapping in &pipe.mappings {
            let output = mapping.apply(self, &obj)?;
            if let Some(output) = output {
                self.send_to_pipe_inner(sink, &pipe.target, output, chain)?;
                if !pipe.apply_all {
                    break;
                }
            }
        }
        chain.pop();
        Ok(())
    }
}

impl Categorise for CollectionConfig {
    fn categorise(&self, categoriser: &str, text: &str) -> Result<Vec<String>> {
        Ok(self.get_categoriser(categoriser)?.categorise(text))
    }
}

impl SchemaContext for CollectionConfig {
    fn hierarchy(&self, name: &str) -> Option<&CategoryHierarchy> {
        self.categories.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        docs: Mutex<Vec<(String, String, Document)>>,
    }

    impl IndexerSink for RecordingSink {
        fn queue_index_update(&self, coll: &str, idterm: &str, doc: Document) -> Result<()> {
            self.docs
                .lock()
                .push((coll.to_string(), idterm.to_string(), doc));
            Ok(())
        }
    }

    fn default_config() -> CollectionConfig {
        let mut config = CollectionConfig::new("test");
        config.set_default();
        config
    }

    #[test]
    fn test_format_gate() {
        let mut config = default_config();
        assert!(config.from_json(&json!({})).is_err());
        assert!(config.from_json(&json!({"format": 2})).is_err());
        assert!(config.from_json(&json!({"format": 4})).is_err());
        config.from_json(&json!({"format": 3})).unwrap();
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = default_config();
        config
            .from_json(&json!({
                "format": 3,
                "types": {"doc": {"fields": {
                    "id": {"type": "id", "store_field": "id"}
                }}},
                "pipes": {"default": {"target": ""}}
            }))
            .unwrap();
        let dumped = config.to_json();
        assert_eq!(dumped["format"], 3);
        assert!(dumped["types"]["doc"].is_object());
        assert_eq!(dumped["special_fields"]["id_field"], "id");

        let mut reloaded = CollectionConfig::new("test");
        reloaded.from_json(&dumped).unwrap();
        assert_eq!(reloaded.to_json(), dumped);
    }

    #[test]
    fn test_process_doc_type_resolution() {
        let mut config = default_config();
        let mut errors = IndexingErrors::default();

        // Type supplied but absent from the document: stored into it.
        let (doc, idterm) = config
            .process_doc(&json!({"id": "1"}), "article", "", &mut errors)
            .unwrap();
        assert!(errors.errors.is_empty());
        assert_eq!(idterm, "\tarticle\t1");
        assert!(doc.has_term("!\tarticle"));

        // Conflicting supplied and stored types fail the document.
        let mut errors = IndexingErrors::default();
        config
            .process_doc(
                &json!({"id": "1", "type": "other"}),
                "article",
                "",
                &mut errors,
            )
            .unwrap();
        assert!(errors.total_failure);

        // A single-element array type is accepted.
        let mut errors = IndexingErrors::default();
        let (_, idterm) = config
            .process_doc(&json!({"id": "2", "type": ["article"]}), "", "", &mut errors)
            .unwrap();
        assert!(errors.errors.is_empty());
        assert_eq!(idterm, "\tarticle\t2");

        // No type anywhere fails.
        let mut errors = IndexingErrors::default();
        config
            .process_doc(&json!({"id": "3"}), "", "", &mut errors)
            .unwrap();
        assert!(errors.total_failure);
    }

    #[test]
    fn test_process_doc_creates_type_lazily() {
        let mut config = default_config();
        let mut errors = IndexingErrors::default();
        assert!(config.get_schema("newtype").is_none());
        config
            .process_doc(
                &json!({"id": "1", "body_text": "Hello"}),
                "newtype",
                "",
                &mut errors,
            )
            .unwrap();
        assert!(errors.errors.is_empty());
        let schema = config.get_schema("newtype").unwrap();
        // The pattern-derived field was materialised.
        assert!(schema.field("body_text").is_some());
        assert!(config.is_changed());
    }

    #[test]
    fn test_send_to_pipe_maps_and_indexes() {
        let mut config = default_config();
        config
            .from_json(&json!({
                "format": 3,
                "pipes": {"default": {"mappings": [
                    {"map": [{"from": ["foo"], "to": "bar"}]}
                ]}},
                "types": {"default": {"fields": {
                    "id": {"type": "id", "store_field": ""},
                    "bar": {"type": "stored", "store_field": "bar"}
                }}}
            }))
            .unwrap();

        let sink = RecordingSink::default();
        config
            .send_to_pipe(&sink, "default", json!({"id": "1", "foo": "Hello world"}))
            .unwrap();
        let docs = sink.docs.lock();
        assert_eq!(docs.len(), 1);
        let (coll, idterm, doc) = &docs[0];
        assert_eq!(coll, "test");
        assert_eq!(idterm, "\tdefault\t1");
        assert_eq!(doc.data_field("bar"), Some("[\"Hello world\"]"));
    }

    #[test]
    fn test_pipe_chain() {
        let mut config = default_config();
        config
            .from_json(&json!({
                "format": 3,
                "pipes": {
                    "first": {"mappings": [{"map": [
                        {"from": ["id"], "to": "id"},
                        {"from": ["a"], "to": "b"}
                    ]}], "target": "second"},
                    "second": {"mappings": [{"map": [
                        {"from": ["id"], "to": "id"},
                        {"from": ["b"], "to": "c"}
                    ]}]}
                },
                "types": {"default": {"fields": {
                    "id": {"type": "id", "store_field": ""},
                    "c": {"type": "stored", "store_field": "c"}
                }}}
            }))
            .unwrap();
        let sink = RecordingSink::default();
        config
            .send_to_pipe(&sink, "first", json!({"id": "9", "a": "deep"}))
            .unwrap();
        let docs = sink.docs.lock();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].2.data_field("c"), Some("[\"deep\"]"));
    }

    #[test]
    fn test_pipe_cycle_detected() {
        let mut config = default_config();
        config
            .from_json(&json!({
                "format": 3,
                "pipes": {
                    "a": {"mappings": [{"map": [{"from": ["x"], "to": "x"}]}],
                           "target": "b"},
                    "b": {"mappings": [{"map": [{"from": ["x"], "to": "x"}]}],
                           "target": "a"}
                }
            }))
            .unwrap();
        let sink = RecordingSink::default();
        let err = config
            .send_to_pipe(&sink, "a", json!({"x": "1"}))
            .unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::InvalidValue);
        assert!(err.context.contains("loop"));
    }

    #[test]
    fn test_categorise_via_config() {
        let mut config = default_config();
        let mut cat = Categoriser::new(1.03, 4, 10, 1);
        cat.add_target_profile("english", "hello world");
        cat.add_target_profile("russian", "Привет Добро");
        config.set_categoriser("lang", cat);

        assert_eq!(config.categorise("lang", "Hello").unwrap(), ["english"]);
        assert_eq!(config.categorise("lang", "Привет").unwrap(), ["russian"]);
        assert_eq!(
            config.categorise("lang", "café").unwrap(),
            Vec::<String>::new()
        );
        assert!(config.categorise("missing", "text").is_err());
    }

    #[test]
    fn test_schema_merge_via_config() {
        let mut config = default_config();
        let schema = Schema::from_json(
            "default",
            &json!({"fields": {"store": {"type": "stored", "store_field": "store"}}}),
        )
        .unwrap();
        config.set_schema("default", &schema).unwrap();

        let conflicting = Schema::from_json(
            "default",
            &json!({"fields": {"store": {"type": "stored", "store_field": "other"}}}),
        )
        .unwrap();
        assert!(config.set_schema("default", &conflicting).is_err());
        // The stored config is untouched.
        let stored = config.get_schema("default").unwrap();
        assert_eq!(stored.field("store").unwrap().store_field(), "store");
    }
}
