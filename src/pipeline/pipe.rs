use serde_json::{Map, Value};

use crate::core::error::{Error, Result};
use crate::jsonmanip::mapping::Mapping;

/// An ordered list of mappings plus a target: the name of the next pipe,
/// or the empty string to deliver to the indexer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipe {
    pub mappings: Vec<Mapping>,
    /// Apply every mapping whose conditional passes, rather than
    /// stopping after the first.
    pub apply_all: bool,
    pub target: String,
}

impl Pipe {
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_value("pipe definition must be an object"))?;

        let mut pipe = Pipe::default();

        if let Some(mappings) = obj.get("mappings") {
            let mappings = mappings
                .as_array()
                .ok_or_else(|| Error::invalid_value("pipe mappings must be an array"))?;
            for mapping in mappings {
                pipe.mappings.push(Mapping::from_json(mapping)?);
            }
        }

        if let Some(apply_all) = obj.get("apply_all") {
            pipe.apply_all = apply_all
                .as_bool()
                .ok_or_else(|| Error::invalid_value("pipe apply_all property must be a bool"))?;
        }

        if let Some(target) = obj.get("target") {
            pipe.target = target
                .as_str()
                .ok_or_else(|| Error::invalid_value("pipe target property must be a string"))?
                .to_string();
        }

        Ok(pipe)
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        if !self.mappings.is_empty() {
            obj.insert(
                "mappings".to_string(),
                Value::Array(self.mappings.iter().map(Mapping::to_json).collect()),
            );
        }
        if self.apply_all {
            obj.insert("apply_all".to_string(), Value::Bool(true));
        }
        if !self.target.is_empty() {
            obj.insert("target".to_string(), Value::String(self.target.clone()));
        }
        Value::Object(obj)
    }
}
