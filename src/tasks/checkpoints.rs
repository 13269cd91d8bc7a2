use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};

/// An error recorded while indexing a document.
#[derive(Debug, Clone)]
pub struct IndexingError {
    msg: String,
    doc_type: String,
    doc_id: String,
}

impl IndexingError {
    pub fn new(
        msg: impl Into<String>,
        doc_type: impl Into<String>,
        doc_id: impl Into<String>,
    ) -> Self {
        IndexingError {
            msg: msg.into(),
            doc_type: doc_type.into(),
            doc_id: doc_id.into(),
        }
    }

    fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("msg".to_string(), json!(self.msg));
        if !self.doc_type.is_empty() {
            obj.insert("doc_type".to_string(), json!(self.doc_type));
        }
        if !self.doc_id.is_empty() {
            obj.insert("doc_id".to_string(), json!(self.doc_id));
        }
        Value::Object(obj)
    }
}

/// In-memory log of indexing errors since the previous checkpoint. The
/// first `max_errors` are kept in detail; further errors only increment
/// the total.
#[derive(Debug, Clone)]
pub struct IndexingErrorLog {
    errors: Vec<IndexingError>,
    total_errors: u64,
    max_errors: usize,
}

impl IndexingErrorLog {
    pub fn new(max_errors: usize) -> Self {
        IndexingErrorLog {
            errors: Vec::new(),
            total_errors: 0,
            max_errors,
        }
    }

    pub fn append_error(
        &mut self,
        msg: impl Into<String>,
        doc_type: impl Into<String>,
        doc_id: impl Into<String>,
    ) {
        self.total_errors += 1;
        if self.errors.len() < self.max_errors {
            self.errors.push(IndexingError::new(msg, doc_type, doc_id));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_errors == 0
    }

    fn write_json(&self, result: &mut Map<String, Value>) {
        result.insert("total_errors".to_string(), json!(self.total_errors));
        result.insert(
            "errors".to_string(),
            Value::Array(self.errors.iter().map(IndexingError::to_json).collect()),
        );
    }
}

/// A checkpoint in a collection's indexing stream: unreached until the
/// writer passes it, then reached exactly once (idempotent re-set
/// replaces the error log).
#[derive(Debug)]
pub struct CheckPoint {
    errors: Option<IndexingErrorLog>,
    last_touched: Instant,
    reached: bool,
}

impl CheckPoint {
    pub fn new() -> Self {
        CheckPoint {
            errors: None,
            last_touched: Instant::now(),
            reached: false,
        }
    }

    pub fn set_reached(&mut self, errors: Option<IndexingErrorLog>) {
        self.errors = errors;
        self.reached = true;
        self.last_touched = Instant::now();
    }

    /// Describe the checkpoint; inspecting it refreshes the touch time.
    pub fn get_state(&mut self) -> Value {
        self.last_touched = Instant::now();
        let mut result = Map::new();
        if self.reached {
            result.insert("reached".to_string(), json!(true));
            match &self.errors {
                Some(errors) => errors.write_json(&mut result),
                None => {
                    result.insert("total_errors".to_string(), json!(0));
                    result.insert("errors".to_string(), json!([]));
                }
            }
        } else {
            result.insert("reached".to_string(), json!(false));
        }
        Value::Object(result)
    }

    /// Time since the checkpoint was last modified or inspected, from a
    /// monotonic clock.
    pub fn seconds_since_touched(&self) -> f64 {
        self.last_touched.elapsed().as_secs_f64()
    }
}

/// The known checkpoints of one collection.
#[derive(Debug, Default)]
pub struct CheckPoints {
    points: BTreeMap<String, CheckPoint>,
}

impl CheckPoints {
    pub fn new() -> Self {
        CheckPoints::default()
    }

    /// Sweep checkpoints untouched for longer than `max_age`.
    pub fn expire(&mut self, max_age: Duration) {
        let max_age = max_age.as_secs_f64();
        self.points
            .retain(|_, point| point.seconds_since_touched() < max_age);
    }

    /// Allocate a new unreached checkpoint and return its id.
    pub fn alloc_checkpoint(&mut self) -> String {
        let checkid = uuid::Uuid::new_v4().simple().to_string();
        self.points.insert(checkid.clone(), CheckPoint::new());
        checkid
    }

    pub fn ids_to_json(&self) -> Value {
        Value::Array(self.points.keys().map(|id| json!(id)).collect())
    }

    /// Mark a checkpoint reached, creating it if it is unknown (or has
    /// expired).
    pub fn set_reached(&mut self, checkid: &str, errors: Option<IndexingErrorLog>) {
        self.points
            .entry(checkid.to_string())
            .or_insert_with(CheckPoint::new)
            .set_reached(errors);
    }

    /// The state of a checkpoint, or null when unknown.
    pub fn get_state(&mut self, checkid: &str) -> Value {
        match self.points.get_mut(checkid) {
            Some(point) => point.get_state(),
            None => Value::Null,
        }
    }
}
