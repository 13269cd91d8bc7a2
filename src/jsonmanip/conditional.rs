use serde_json::{Value, json};

use crate::core::error::{Error, Result};
use crate::jsonmanip::walker::{resolve, PathComponent};

/// A small condition algebra evaluated over an input JSON document.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Conditional {
    /// The null conditional; passes everything.
    #[default]
    Always,
    Exists(Vec<PathComponent>),
    Equals(Vec<PathComponent>, Value),
    And(Vec<Conditional>),
    Or(Vec<Conditional>),
    Not(Box<Conditional>),
}

pub fn path_from_json(value: &Value) -> Result<Vec<PathComponent>> {
    let components = match value {
        Value::String(s) => return Ok(vec![PathComponent::Key(s.clone())]),
        Value::Array(items) => items,
        _ => {
            return Err(Error::invalid_value(
                "path must be a string or an array of keys and indexes",
            ))
        }
    };
    let mut path = Vec::with_capacity(components.len());
    for item in components {
        match item {
            Value::String(s) => path.push(PathComponent::Key(s.clone())),
            Value::Number(n) => match n.as_u64() {
                Some(i) => path.push(PathComponent::Index(i)),
                None => {
                    return Err(Error::invalid_value(
                        "path indexes must be non-negative integers",
                    ))
                }
            },
            _ => {
                return Err(Error::invalid_value(
                    "path components must be strings or integers",
                ))
            }
        }
    }
    Ok(path)
}

pub fn path_to_json(path: &[PathComponent]) -> Value {
    Value::Array(path.iter().map(PathComponent::to_json).collect())
}

impl Conditional {
    pub fn is_null(&self) -> bool {
        matches!(self, Conditional::Always)
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Conditional::Always);
        }
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_value("conditional must be an object"))?;
        if obj.len() != 1 {
            return Err(Error::invalid_value(
                "conditional must have exactly one member",
            ));
        }
        let (op, arg) = obj.iter().next().unwrap();
        match op.as_str() {
            "exists" => Ok(Conditional::Exists(path_from_json(arg)?)),
            "equals" => {
                let parts = arg.as_array().ok_or_else(|| {
                    Error::invalid_value("\"equals\" takes a [path, value] pair")
                })?;
                if parts.len() != 2 {
                    return Err(Error::invalid_value(
                        "\"equals\" takes a [path, value] pair",
                    ));
                }
                Ok(Conditional::Equals(
                    path_from_json(&parts[0])?,
                    parts[1].clone(),
                ))
            }
            "and" | "or" => {
                let children = arg
                    .as_array()
                    .ok_or_else(|| Error::invalid_value("conditional list must be an array"))?
                    .iter()
                    .map(Conditional::from_json)
                    .collect::<Result<Vec<_>>>()?;
                if op == "and" {
                    Ok(Conditional::And(children))
                } else {
                    Ok(Conditional::Or(children))
                }
            }
            "not" => Ok(Conditional::Not(Box::new(Conditional::from_json(arg)?))),
            _ => Err(Error::invalid_value(format!(
                "unknown conditional operator '{}'",
                op
            ))),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Conditional::Always => Value::Null,
            Conditional::Exists(path) => json!({ "exists": path_to_json(path) }),
            Conditional::Equals(path, value) => {
                json!({ "equals": [path_to_json(path), value] })
            }
            Conditional::And(children) => {
                json!({ "and": children.iter().map(Conditional::to_json).collect::<Vec<_>>() })
            }
            Conditional::Or(children) => {
                json!({ "or": children.iter().map(Conditional::to_json).collect::<Vec<_>>() })
            }
            Conditional::Not(child) => json!({ "not": child.to_json() }),
        }
    }

    pub fn test(&self, input: &Value) -> bool {
        match self {
            Conditional::Always => true,
            Conditional::Exists(path) => resolve(input, path).is_some(),
            Conditional::Equals(path, expected) => {
                resolve(input, path).map_or(false, |found| found == expected)
            }
            Conditional::And(children) => children.iter().all(|c| c.test(input)),
            Conditional::Or(children) => children.iter().any(|c| c.test(input)),
            Conditional::Not(child) => !child.test(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exists() {
        let cond = Conditional::from_json(&json!({"exists": ["name"]})).unwrap();
        assert!(cond.test(&json!({"name": "arthur"})));
        assert!(!cond.test(&json!({"other": 1})));
    }

    #[test]
    fn test_equals_and_not() {
        let cond =
            Conditional::from_json(&json!({"equals": [["kind"], "post"]})).unwrap();
        assert!(cond.test(&json!({"kind": "post"})));
        assert!(!cond.test(&json!({"kind": "page"})));

        let negated = Conditional::Not(Box::new(cond));
        assert!(negated.test(&json!({"kind": "page"})));
    }

    #[test]
    fn test_boolean_combinators() {
        let cond = Conditional::from_json(&json!({
            "and": [
                {"exists": ["a"]},
                {"or": [{"exists": ["b"]}, {"exists": ["c"]}]}
            ]
        }))
        .unwrap();
        assert!(cond.test(&json!({"a": 1, "c": 2})));
        assert!(!cond.test(&json!({"a": 1})));
        assert!(!cond.test(&json!({"c": 2})));
    }

    #[test]
    fn test_json_roundtrip() {
        let source = json!({"and": [{"exists": ["x", 0]}, {"not": {"equals": [["y"], 3]}}]});
        let cond = Conditional::from_json(&source).unwrap();
        let back = Conditional::from_json(&cond.to_json()).unwrap();
        assert_eq!(cond, back);
    }

    #[test]
    fn test_null_passes() {
        let cond = Conditional::from_json(&Value::Null).unwrap();
        assert!(cond.is_null());
        assert!(cond.test(&json!({})));
        assert_eq!(cond.to_json(), Value::Null);
    }

    #[test]
    fn test_rejects_unknown_operator() {
        assert!(Conditional::from_json(&json!({"near": []})).is_err());
        assert!(Conditional::from_json(&json!({"exists": ["a"], "and": []})).is_err());
    }
}
