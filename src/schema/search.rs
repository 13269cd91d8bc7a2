use serde_json::{json, Map, Value};

use crate::core::error::{Error, Result};
use crate::engine::database::Database;
use crate::engine::matcher::run_match;
use crate::engine::query::Query;
use crate::engine::serialise;
use crate::analysis::analyzer::Analyzer;
use crate::schema::display::display_doc;
use crate::schema::field::FieldConfig;
use crate::schema::schema::{idstyle_value, Schema};
use crate::spies::infohandlers::InfoHandlers;

const DEFAULT_SIZE: u64 = 10;

impl Schema {
    /// Translate a structured query JSON tree to an engine query.
    pub fn query_from_json(&self, value: &Value) -> Result<Query> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_value("query must be an object"))?;
        if obj.len() != 1 {
            return Err(Error::invalid_value(
                "query must have exactly one member",
            ));
        }
        let (op, arg) = obj.iter().next().unwrap();
        match op.as_str() {
            "matchall" => Ok(Query::MatchAll),
            "matchnothing" => Ok(Query::MatchNothing),
            "field" => self.field_query(arg),
            "and" | "or" | "filter" => {
                let children = arg
                    .as_array()
                    .ok_or_else(|| Error::invalid_value("query list must be an array"))?
                    .iter()
                    .map(|child| self.query_from_json(child))
                    .collect::<Result<Vec<_>>>()?;
                if children.is_empty() {
                    return Err(Error::invalid_value(format!(
                        "\"{}\" query must have at least one subquery",
                        op
                    )));
                }
                Ok(match op.as_str() {
                    "and" => Query::And(children),
                    "or" => Query::Or(children),
                    _ => Query::Filter(children),
                })
            }
            "scale" => {
                let params = arg
                    .as_object()
                    .ok_or_else(|| Error::invalid_value("\"scale\" takes an object"))?;
                let factor = params
                    .get("factor")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| Error::invalid_value("\"scale\" lacks a numeric factor"))?;
                let query = params
                    .get("query")
                    .ok_or_else(|| Error::invalid_value("\"scale\" lacks a query"))?;
                Ok(Query::Scale {
                    factor,
                    query: Box::new(self.query_from_json(query)?),
                })
            }
            other => Err(Error::invalid_value(format!(
                "unknown query operator '{}'",
                other
            ))),
        }
    }

    fn field_query(&self, arg: &Value) -> Result<Query> {
        let parts = arg
            .as_array()
            .ok_or_else(|| Error::invalid_value("\"field\" takes [name, op, value]"))?;
        if parts.len() < 2 {
            return Err(Error::invalid_value("\"field\" takes [name, op, value]"));
        }
        let name = parts[0]
            .as_str()
            .ok_or_else(|| Error::invalid_value("field name must be a string"))?;
        let op = parts[1]
            .as_str()
            .ok_or_else(|| Error::invalid_value("field op must be a string"))?;
        let config = self
            .field(name)
            .ok_or_else(|| Error::invalid_value(format!("no configuration for field '{}'", name)))?;

        match op {
            "is" => {
                let arg = parts
                    .get(2)
                    .ok_or_else(|| Error::invalid_value("\"is\" lacks a value"))?;
                let values: Vec<&Value> = match arg {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                };
                let mut terms = Vec::new();
                for value in values {
                    let text = idstyle_value(value).map_err(Error::invalid_value)?;
                    let term = match config {
                        FieldConfig::Id { .. } => format!("\t{}\t{}", self.type_name(), text),
                        FieldConfig::Exact { prefix, .. } | FieldConfig::Cat { prefix, .. } => {
                            format!("{}\t{}", prefix, text)
                        }
                        _ => {
                            return Err(Error::invalid_value(format!(
                                "field '{}' does not support \"is\" searches",
                                name
                            )))
                        }
                    };
                    terms.push(Query::Term(term));
                }
                match terms.len() {
                    0 => Ok(Query::MatchNothing),
                    1 => Ok(terms.pop().unwrap()),
                    _ => Ok(Query::Or(terms)),
                }
            }
            "text" => {
                let text = parts
                    .get(2)
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::invalid_value("\"text\" takes a string"))?;
                let (prefix, processor) = match config {
                    FieldConfig::Text {
                        prefix, processor, ..
                    } => (prefix, processor),
                    _ => {
                        return Err(Error::invalid_value(format!(
                            "field '{}' does not support \"text\" searches",
                            name
                        )))
                    }
                };
                let analyzer = Analyzer::for_processor(processor)?;
                let terms: Vec<Query> = analyzer
                    .analyze(text)
                    .into_iter()
                    .map(|token| Query::Term(format!("{}\t{}", prefix, token.text)))
                    .collect();
                match terms.len() {
                    0 => Ok(Query::MatchNothing),
                    1 => Ok(terms.into_iter().next().unwrap()),
                    _ => Ok(Query::Or(terms)),
                }
            }
            "range" => {
                let slot = match config {
                    FieldConfig::Timestamp { slot, .. } => slot.resolve(),
                    _ => {
                        return Err(Error::invalid_value(format!(
                            "field '{}' does not support \"range\" searches",
                            name
                        )))
                    }
                };
                let bounds = parts
                    .get(2)
                    .and_then(Value::as_array)
                    .filter(|b| b.len() == 2)
                    .ok_or_else(|| Error::invalid_value("\"range\" takes [begin, end]"))?;
                let begin = bounds[0]
                    .as_u64()
                    .ok_or_else(|| Error::invalid_value("range bounds must be integers"))?;
                let end = bounds[1]
                    .as_u64()
                    .ok_or_else(|| Error::invalid_value("range bounds must be integers"))?;
                Ok(Query::ValueRange {
                    slot,
                    begin: serialise::serialise_timestamp(begin).to_vec(),
                    end: serialise::serialise_timestamp(end).to_vec(),
                })
            }
            "exists" => {
                let prefix = match config {
                    FieldConfig::Meta { prefix, .. } => prefix,
                    _ => {
                        return Err(Error::invalid_value(format!(
                            "field '{}' does not support \"exists\" searches",
                            name
                        )))
                    }
                };
                let target = parts
                    .get(2)
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::invalid_value("\"exists\" takes a field name"))?;
                Ok(Query::Term(format!("{}\tF{}", prefix, target)))
            }
            other => Err(Error::invalid_value(format!(
                "unknown field search op '{}'",
                other
            ))),
        }
    }

    /// Run a structured search over a read view, returning the result
    /// JSON (hits plus any info-handler output).
    pub fn perform_search(&self, db: &Database, search: &Value) -> Result<Value> {
        let obj = search
            .as_object()
            .ok_or_else(|| Error::invalid_value("search must be an object"))?;
        let query = self.query_from_json(
            obj.get("query")
                .ok_or_else(|| Error::invalid_value("search lacks a query"))?,
        )?;

        let from = match obj.get("from") {
            None | Some(Value::Null) => 0,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| Error::invalid_value("\"from\" must be a non-negative integer"))?,
        };
        let size = match obj.get("size") {
            None | Some(Value::Null) => DEFAULT_SIZE,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| Error::invalid_value("\"size\" must be a non-negative integer"))?,
        };
        let mut check_at_least = match obj.get("check_at_least") {
            None | Some(Value::Null) => 0,
            Some(value) => value.as_u64().ok_or_else(|| {
                Error::invalid_value("\"check_at_least\" must be a non-negative integer")
            })?,
        };

        let display: Option<Vec<String>> = match obj.get("display") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                value
                    .as_array()
                    .ok_or_else(|| Error::invalid_value("\"display\" must be an array"))?
                    .iter()
                    .map(|f| {
                        f.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| Error::invalid_value("display fields must be strings"))
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        let mut handlers = InfoHandlers::default();
        if let Some(info) = obj.get("info") {
            let info = info
                .as_array()
                .ok_or_else(|| Error::invalid_value("\"info\" must be an array"))?;
            for item in info {
                handlers.add_handler(item, db, &mut check_at_least)?;
            }
        }

        let mut observers = handlers.observers();
        let mset = run_match(db, &query, from as usize, size as usize, &mut observers)?;
        drop(observers);

        let mut items = Vec::new();
        for item in &mset.items {
            items.push(display_doc(&item.doc, display.as_deref())?);
        }

        let mut results = Map::new();
        results.insert("from".to_string(), json!(from));
        results.insert("size_requested".to_string(), json!(size));
        results.insert("check_at_least".to_string(), json!(check_at_least));
        results.insert(
            "matches_lower_bound".to_string(),
            json!(mset.matches_lower_bound),
        );
        results.insert(
            "matches_estimated".to_string(),
            json!(mset.matches_estimated),
        );
        results.insert(
            "matches_upper_bound".to_string(),
            json!(mset.matches_upper_bound),
        );
        results.insert("items".to_string(), Value::Array(items));
        handlers.write_results(&mut results, db);

        Ok(Value::Object(results))
    }
}
