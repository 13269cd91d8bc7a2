use std::path::PathBuf;

use serde_json::Value;

use crate::categorise::categoriser::Categoriser;
use crate::categorise::hierarchy::CategoryHierarchy;
use crate::collection::config::{CollectionConfig, IndexerSink};
use crate::core::error::{Error, Result};
use crate::engine::document::Document;
use crate::group::dbgroup::DbGroup;
use crate::jsonmanip::mapping::Categorise;
use crate::pipeline::pipe::Pipe;
use crate::schema::display::doc_to_json;
use crate::schema::schema::{IndexingErrors, Schema};

/// Metadata key under which the collection configuration is persisted.
const CONFIG_METADATA_KEY: &str = "_restpose_config";

/// One collection: a fragment group bound to its configuration. The
/// configuration is read lazily from control metadata on open and written
/// back on mutation.
pub struct Collection {
    config: CollectionConfig,
    group: DbGroup,
    last_config: String,
}

impl Collection {
    pub fn new(coll_name: impl Into<String>, coll_path: impl Into<PathBuf>) -> Self {
        let coll_name = coll_name.into();
        Collection {
            config: CollectionConfig::new(&coll_name),
            group: DbGroup::new(coll_path),
            last_config: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn is_open(&self) -> bool {
        self.group.is_open()
    }

    pub fn is_writable(&self) -> bool {
        self.group.is_writable()
    }

    pub fn set_max_newdb_docs(&mut self, max: u64) {
        self.group.set_max_newdb_docs(max);
    }

    pub fn open_writable(&mut self) -> Result<()> {
        if !self.group.is_writable() {
            self.group.open_writable()?;
            self.read_config()?;
        }
        Ok(())
    }

    pub fn open_readonly(&mut self) -> Result<()> {
        self.group.open_readonly()?;
        self.read_config()
    }

    pub fn close(&mut self) {
        self.group.close();
    }

    fn read_config(&mut self) -> Result<()> {
        let result = (|| -> Result<()> {
            let config_str = self.group.get_metadata(CONFIG_METADATA_KEY)?;
            if !self.last_config.is_empty() && config_str == self.last_config {
                return Ok(());
            }
            self.last_config = config_str.clone();

            let mut config = CollectionConfig::new(self.config.name());
            if config_str.is_empty() {
                config.set_default();
            } else {
                let parsed: Value = serde_json::from_str(&config_str)?;
                config.from_json(&parsed)?;
            }
            self.config = config;
            Ok(())
        })();
        if result.is_err() {
            self.group.close();
        }
        result
    }

    fn write_config(&mut self) -> Result<()> {
        let serialised = serde_json::to_string(&self.config.to_json())?;
        self.group.set_metadata(CONFIG_METADATA_KEY, &serialised)?;
        self.config.clear_changed();
        Ok(())
    }

    fn require_open(&self, doing: &str) -> Result<()> {
        if !self.group.is_open() {
            return Err(Error::invalid_state(format!(
                "collection must be open to {}",
                doing
            )));
        }
        Ok(())
    }

    fn require_writable(&self, doing: &str) -> Result<()> {
        if !self.group.is_writable() {
            return Err(Error::invalid_state(format!(
                "collection must be open for writing to {}",
                doing
            )));
        }
        Ok(())
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub fn get_schema(&self, doc_type: &str) -> Result<&Schema> {
        self.require_open("get schema")?;
        self.config
            .get_schema(doc_type)
            .ok_or_else(|| Error::invalid_value(format!("no schema for type '{}'", doc_type)))
    }

    pub fn set_schema(&mut self, doc_type: &str, schema: &Schema) -> Result<()> {
        self.require_writable("set schema")?;
        self.config.set_schema(doc_type, schema)?;
        self.write_config()
    }

    pub fn get_pipe(&self, pipe_name: &str) -> Result<&Pipe> {
        self.require_open("get pipe")?;
        self.config.get_pipe(pipe_name)
    }

    pub fn set_pipe(&mut self, pipe_name: &str, pipe: Pipe) -> Result<()> {
        self.require_writable("set pipe")?;
        self.config.set_pipe(pipe_name, pipe);
        self.write_config()
    }

    pub fn get_categoriser(&self, name: &str) -> Result<&Categoriser> {
        self.require_open("get categoriser")?;
        self.config.get_categoriser(name)
    }

    pub fn set_categoriser(&mut self, name: &str, categoriser: Categoriser) -> Result<()> {
        self.require_writable("set categoriser")?;
        self.config.set_categoriser(name, categoriser);
        self.write_config()
    }

    pub fn get_category(&self, name: &str) -> Result<Option<&CategoryHierarchy>> {
        self.require_open("get category hierarchy")?;
        Ok(self.config.get_category_hierarchy(name))
    }

    pub fn set_category(&mut self, name: &str, hierarchy: CategoryHierarchy) -> Result<()> {
        self.require_writable("set category hierarchy")?;
        self.config.set_category_hierarchy(name, hierarchy);
        self.write_config()
    }

    /// Replace configuration from JSON and persist it.
    pub fn from_json(&mut self, value: &Value) -> Result<()> {
        self.require_writable("set config")?;
        self.config.from_json(value)?;
        self.write_config()
    }

    pub fn to_json(&self) -> Value {
        self.config.to_json()
    }

    pub fn categorise(&self, categoriser: &str, text: &str) -> Result<Vec<String>> {
        self.require_open("categorise")?;
        self.config.categorise(categoriser, text)
    }

    pub fn send_to_pipe(
        &mut self,
        sink: &dyn IndexerSink,
        pipe_name: &str,
        obj: Value,
    ) -> Result<()> {
        self.require_open("send to pipe")?;
        self.config.send_to_pipe(sink, pipe_name, obj)
    }

    pub fn process_doc(
        &mut self,
        doc_obj: &Value,
        doc_type: &str,
        doc_id: &str,
        errors: &mut IndexingErrors,
    ) -> Result<(Document, String)> {
        self.config.process_doc(doc_obj, doc_type, doc_id, errors)
    }

    /// Add or replace a processed document by its unique id term.
    pub fn raw_update_doc(&mut self, doc: Document, idterm: &str) -> Result<()> {
        self.require_writable("add document")?;
        self.group.add_doc(doc, idterm)
    }

    pub fn raw_delete_doc(&mut self, idterm: &str) -> Result<()> {
        self.require_writable("delete document")?;
        self.group.delete_doc(idterm)
    }

    /// Commit all pending changes durably, persisting the configuration
    /// first if it changed.
    pub fn commit(&mut self) -> Result<()> {
        self.require_writable("commit")?;
        if self.config.is_changed() {
            self.write_config()?;
        }
        self.group.sync()
    }

    pub fn doc_count(&mut self) -> Result<u64> {
        self.group.doc_count()
    }

    pub fn perform_search(&mut self, search: &Value, doc_type: &str) -> Result<Value> {
        self.require_open("perform search")?;
        let schema = match self.config.get_schema(doc_type) {
            Some(schema) => schema,
            None => return Ok(Value::Object(Default::default())),
        };
        let db = self.group.get_db()?;
        schema.perform_search(db, search)
    }

    /// Fetch a document by type and id, as its JSON dump, or null when
    /// absent.
    pub fn get_document(&mut self, doc_type: &str, docid: &str) -> Result<Value> {
        self.require_open("get document")?;
        let idterm = format!("\t{}\t{}", doc_type, docid);
        match self.group.get_document(&idterm)? {
            Some(doc) => doc_to_json(&doc),
            None => Ok(Value::Null),
        }
    }
}
