use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::core::error::{Error, Result};
use crate::jsonmanip::conditional::{path_from_json, Conditional};
use crate::jsonmanip::walker::{walk, Event, EventType, PathComponent};

/// Something able to run a named categoriser over a flattened text.
/// Implemented by the collection configuration; mappings only see this
/// capability.
pub trait Categorise {
    fn categorise(&self, categoriser: &str, text: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappingTarget {
    pub field: String,
    /// Empty means the raw value is copied rather than categorised.
    pub categoriser: String,
}

/// The actions to apply at or below one path component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingActions {
    children: BTreeMap<PathComponent, MappingActions>,
    target_fields: Vec<MappingTarget>,
}

impl MappingActions {
    /// Find the actions node for a path, creating empty nodes on the way.
    fn find(&mut self, path: &[PathComponent]) -> &mut MappingActions {
        let mut node = self;
        for component in path {
            node = node.children.entry(component.clone()).or_default();
        }
        node
    }

    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.target_fields.is_empty()
    }

    fn collect_map_entries(&self, path: &mut Vec<Value>, out: &mut Vec<Value>) {
        for (component, child) in &self.children {
            path.push(component.to_json());
            for target in &child.target_fields {
                let mut entry = Map::new();
                entry.insert("from".to_string(), Value::Array(path.clone()));
                entry.insert("to".to_string(), Value::String(target.field.clone()));
                if !target.categoriser.is_empty() {
                    entry.insert(
                        "categoriser".to_string(),
                        Value::String(target.categoriser.clone()),
                    );
                }
                out.push(Value::Object(entry));
            }
            child.collect_map_entries(path, out);
            path.pop();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultAction {
    /// Copy unmapped top-level fields to the output unchanged.
    #[default]
    PreserveTop,
    /// Drop unmapped fields.
    Discard,
}

/// A path-addressed extraction rule applied to a JSON document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    when: Conditional,
    mappings: MappingActions,
    default_action: DefaultAction,
}

/// Append a value under a key in the output, accumulating an array.
/// Appending an array flattens it one level; appending an empty array
/// resets the field to an empty array.
fn append_field(output: &mut Map<String, Value>, key: &str, value: &Value) {
    let slot = output
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    let items = slot.as_array_mut().unwrap();
    match value {
        Value::Array(elements) => {
            if elements.is_empty() {
                items.clear();
            } else {
                items.extend(elements.iter().cloned());
            }
        }
        other => items.push(other.clone()),
    }
}

impl Mapping {
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_value("mapping must be an object"))?;

        let when = Conditional::from_json(obj.get("when").unwrap_or(&Value::Null))?;

        let mut mappings = MappingActions::default();
        if let Some(mapval) = obj.get("map") {
            let entries = mapval
                .as_array()
                .ok_or_else(|| Error::invalid_value("map property in mapping must be an array"))?;
            for entry in entries {
                let entry = entry
                    .as_object()
                    .ok_or_else(|| Error::invalid_value("mapping definition must be an object"))?;
                let to = entry
                    .get("to")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::invalid_value("mapping target fieldname must be a string"))?;
                let from = entry
                    .get("from")
                    .ok_or_else(|| Error::invalid_value("mapping definition lacks \"from\""))?;
                let path = path_from_json(from)?;
                let categoriser = match entry.get("categoriser") {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(_) => {
                        return Err(Error::invalid_value(
                            "mapping target categoriser must be a string",
                        ))
                    }
                };
                let actions = mappings.find(&path);
                actions.target_fields.push(MappingTarget {
                    field: to.to_string(),
                    categoriser,
                });
            }
        }

        let default_action = match obj.get("default") {
            None | Some(Value::Null) => DefaultAction::PreserveTop,
            Some(Value::String(s)) if s == "preserve_top" => DefaultAction::PreserveTop,
            Some(Value::String(s)) if s == "discard" => DefaultAction::Discard,
            Some(_) => {
                return Err(Error::invalid_value(
                    "invalid value for \"default\" parameter in mapping",
                ))
            }
        };

        Ok(Mapping {
            when,
            mappings,
            default_action,
        })
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        if !self.when.is_null() {
            obj.insert("when".to_string(), self.when.to_json());
        }
        if self.default_action == DefaultAction::Discard {
            obj.insert("default".to_string(), json!("discard"));
        }
        let mut entries = Vec::new();
        self.mappings
            .collect_map_entries(&mut Vec::new(), &mut entries);
        if !entries.is_empty() {
            obj.insert("map".to_string(), Value::Array(entries));
        }
        Value::Object(obj)
    }

    fn handle(
        &self,
        ctx: &dyn Categorise,
        stack: &[Option<&MappingActions>],
        event: &Event,
        output: &mut Map<String, Value>,
    ) -> Result<bool> {
        let actions = match stack.last() {
            Some(Some(actions)) => actions,
            _ => return Ok(false),
        };
        let child = match actions.children.get(&event.component) {
            Some(child) => child,
            None => return Ok(false),
        };

        let mut handled = false;
        for target in &child.target_fields {
            if target.categoriser.is_empty() {
                append_field(output, &target.field, event.value);
            } else {
                let mut text = String::new();
                match event.value {
                    Value::Array(items) => {
                        for item in items {
                            if let Value::String(s) = item {
                                text.push_str(s);
                                text.push(' ');
                            }
                        }
                    }
                    Value::String(s) => text.push_str(s),
                    _ => {}
                }
                if text.is_empty() {
                    append_field(output, &target.field, &Value::String(String::new()));
                } else {
                    let categories = ctx.categorise(&target.categoriser, &text)?;
                    let categories =
                        Value::Array(categories.into_iter().map(Value::String).collect());
                    append_field(output, &target.field, &categories);
                }
            }
            handled = true;
        }
        Ok(handled)
    }

    fn handle_default(
        &self,
        stack: &[Option<&MappingActions>],
        event: &Event,
        output: &mut Map<String, Value>,
    ) {
        if self.default_action == DefaultAction::PreserveTop && stack.len() == 1 {
            if let PathComponent::Key(key) = &event.component {
                append_field(output, key, event.value);
            }
        }
    }

    /// Apply the mapping to an input document. Returns `None` when the
    /// `when` conditional rejects the input; otherwise the mapped output.
    pub fn apply(&self, ctx: &dyn Categorise, input: &Value) -> Result<Option<Value>> {
        if !input.is_object() {
            return Err(Error::invalid_value("input to mapping must be an object"));
        }
        if !self.when.is_null() && !self.when.test(input) {
            return Ok(None);
        }

        let mut output = Map::new();
        let mut stack: Vec<Option<&MappingActions>> = Vec::new();
        // Whether the current top-level item has been handled.
        let mut handled_top = false;

        for event in walk(input) {
            match event.event_type {
                EventType::Start => {
                    if stack.len() == 1 {
                        handled_top = false;
                    }
                    if self.handle(ctx, &stack, &event, &mut output)? {
                        handled_top = true;
                    }
                    let next = if stack.is_empty() {
                        Some(&self.mappings)
                    } else {
                        match stack.last().unwrap() {
                            None => None,
                            Some(actions) => actions.children.get(&event.component),
                        }
                    };
                    stack.push(next);
                }
                EventType::Leaf => {
                    if stack.len() == 1 {
                        handled_top = false;
                    }
                    if self.handle(ctx, &stack, &event, &mut output)? {
                        handled_top = true;
                    }
                    if !handled_top {
                        self.handle_default(&stack, &event, &mut output);
                    }
                }
                EventType::End => {
                    stack.pop();
                    if !handled_top {
                        self.handle_default(&stack, &event, &mut output);
                    }
                }
            }
        }

        Ok(Some(Value::Object(output)))
    }
}
