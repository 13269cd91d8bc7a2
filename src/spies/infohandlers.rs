use serde_json::{Map, Value};

use crate::core::error::{Error, Result};
use crate::engine::database::Database;
use crate::engine::matcher::MatchObserver;
use crate::spies::matchspy::{TermCoOccurSpy, TermOccurSpy};

/// One info handler requested by a search: a tagged spy variant.
pub enum InfoHandler {
    Occur(TermOccurSpy),
    CoOccur(TermCoOccurSpy),
}

impl InfoHandler {
    fn result(&self, db: &Database) -> Value {
        match self {
            InfoHandler::Occur(spy) => spy.result(db),
            InfoHandler::CoOccur(spy) => spy.result(db),
        }
    }
}

/// The info handlers attached to one search.
#[derive(Default)]
pub struct InfoHandlers {
    handlers: Vec<InfoHandler>,
}

fn u64_member(params: &Map<String, Value>, key: &str, default: u64) -> Result<u64> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| Error::invalid_value(format!("\"{}\" must be a non-negative integer", key))),
    }
}

impl InfoHandlers {
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Build a handler from one entry of a search's "info" array, raising
    /// `check_at_least` to the handler's result limit.
    pub fn add_handler(
        &mut self,
        handler: &Value,
        db: &Database,
        check_at_least: &mut u64,
    ) -> Result<()> {
        let obj = handler
            .as_object()
            .ok_or_else(|| Error::invalid_value("search info item must be an object"))?;
        if obj.len() != 1 {
            return Err(Error::invalid_value(
                "info item must have exactly one member",
            ));
        }
        let (kind, params) = obj.iter().next().unwrap();
        let params = params
            .as_object()
            .ok_or_else(|| Error::invalid_value("info item parameters must be an object"))?;

        let prefix = match params.get("prefix") {
            None | Some(Value::Null) => "",
            Some(value) => value
                .as_str()
                .ok_or_else(|| Error::invalid_value("\"prefix\" must be a string"))?,
        };
        let doc_limit = u64_member(params, "doc_limit", db.doc_count())?;
        let result_limit = u64_member(params, "result_limit", u64::MAX)?;
        let result_limit = usize::try_from(result_limit).unwrap_or(usize::MAX);
        let get_termfreqs = match params.get("get_termfreqs") {
            None | Some(Value::Null) => false,
            Some(value) => value
                .as_bool()
                .ok_or_else(|| Error::invalid_value("\"get_termfreqs\" must be a bool"))?,
        };

        let stopwords = match params.get("stopwords") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => value
                .as_array()
                .ok_or_else(|| Error::invalid_value("\"stopwords\" must be an array"))?
                .iter()
                .map(|w| {
                    w.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| Error::invalid_value("stopword must be a string"))
                })
                .collect::<Result<Vec<_>>>()?,
        };

        let handler = match kind.as_str() {
            "occur" => {
                let mut spy = TermOccurSpy::new(prefix, doc_limit, result_limit, get_termfreqs);
                for word in &stopwords {
                    spy.add_stopword(word);
                }
                InfoHandler::Occur(spy)
            }
            "cooccur" => {
                let mut spy = TermCoOccurSpy::new(prefix, doc_limit, result_limit, get_termfreqs);
                for word in &stopwords {
                    spy.add_stopword(word);
                }
                InfoHandler::CoOccur(spy)
            }
            other => {
                return Err(Error::invalid_value(format!(
                    "unknown info item type '{}'",
                    other
                )))
            }
        };

        if *check_at_least < result_limit as u64 {
            *check_at_least = result_limit as u64;
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// The observers to hand to the matcher for this search.
    pub fn observers(&mut self) -> Vec<&mut dyn MatchObserver> {
        self.handlers
            .iter_mut()
            .map(|handler| match handler {
                InfoHandler::Occur(spy) => spy as &mut dyn MatchObserver,
                InfoHandler::CoOccur(spy) => spy as &mut dyn MatchObserver,
            })
            .collect()
    }

    /// Append each handler's serialised result to `results.info`.
    pub fn write_results(&self, results: &mut Map<String, Value>, db: &Database) {
        if self.handlers.is_empty() {
            return;
        }
        let info = results
            .entry("info".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(entries) = info {
            for handler in &self.handlers {
                entries.push(handler.result(db));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_malformed_items() {
        let db = Database::empty();
        let mut handlers = InfoHandlers::default();
        let mut check_at_least = 0;
        assert!(handlers
            .add_handler(&json!("occur"), &db, &mut check_at_least)
            .is_err());
        assert!(handlers
            .add_handler(&json!({"occur": {}, "cooccur": {}}), &db, &mut check_at_least)
            .is_err());
        assert!(handlers
            .add_handler(&json!({"facet": {}}), &db, &mut check_at_least)
            .is_err());
    }

    #[test]
    fn test_check_at_least_raised_to_result_limit() {
        let db = Database::empty();
        let mut handlers = InfoHandlers::default();
        let mut check_at_least = 5;
        handlers
            .add_handler(
                &json!({"occur": {"prefix": "t", "result_limit": 30}}),
                &db,
                &mut check_at_least,
            )
            .unwrap();
        assert_eq!(check_at_least, 30);
        assert_eq!(handlers.observers().len(), 1);
    }

    #[test]
    fn test_write_results_appends_info() {
        let db = Database::empty();
        let mut handlers = InfoHandlers::default();
        let mut check_at_least = 0;
        handlers
            .add_handler(
                &json!({"occur": {"prefix": "t"}}),
                &db,
                &mut check_at_least,
            )
            .unwrap();
        handlers
            .add_handler(
                &json!({"cooccur": {"prefix": "t"}}),
                &db,
                &mut check_at_least,
            )
            .unwrap();
        let mut results = Map::new();
        handlers.write_results(&mut results, &db);
        let info = results["info"].as_array().unwrap();
        assert_eq!(info.len(), 2);
        assert_eq!(info[0]["type"], "occur");
        assert_eq!(info[1]["type"], "cooccur");
    }
}
