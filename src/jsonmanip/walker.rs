use serde_json::Value;

/// One step in a JSON path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathComponent {
    Key(String),
    Index(u64),
}

impl PathComponent {
    pub fn to_json(&self) -> Value {
        match self {
            PathComponent::Key(k) => Value::String(k.clone()),
            PathComponent::Index(i) => Value::Number((*i).into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Entering an object or array.
    Start,
    /// A scalar value.
    Leaf,
    /// Leaving an object or array; carries the container's value.
    End,
}

#[derive(Debug)]
pub struct Event<'a> {
    pub event_type: EventType,
    pub component: PathComponent,
    pub value: &'a Value,
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

fn visit<'a>(component: PathComponent, value: &'a Value, events: &mut Vec<Event<'a>>) {
    if !is_container(value) {
        events.push(Event {
            event_type: EventType::Leaf,
            component,
            value,
        });
        return;
    }
    events.push(Event {
        event_type: EventType::Start,
        component: component.clone(),
        value,
    });
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                visit(PathComponent::Key(key.clone()), child, events);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                visit(PathComponent::Index(index as u64), child, events);
            }
        }
        _ => unreachable!(),
    }
    events.push(Event {
        event_type: EventType::End,
        component,
        value,
    });
}

/// Flatten a JSON value into a START/LEAF/END event stream. The root
/// container is reported with an empty key component.
pub fn walk(input: &Value) -> Vec<Event<'_>> {
    let mut events = Vec::new();
    visit(PathComponent::Key(String::new()), input, &mut events);
    events
}

/// Resolve a path against a JSON value.
pub fn resolve<'a>(input: &'a Value, path: &[PathComponent]) -> Option<&'a Value> {
    let mut current = input;
    for component in path {
        current = match component {
            PathComponent::Key(k) => current.get(k.as_str())?,
            PathComponent::Index(i) => current.get(*i as usize)?,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_walk_order() {
        let doc = json!({"a": 1, "b": [2, 3]});
        let events = walk(&doc);
        let shape: Vec<(EventType, PathComponent)> = events
            .iter()
            .map(|e| (e.event_type, e.component.clone()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (EventType::Start, PathComponent::Key("".into())),
                (EventType::Leaf, PathComponent::Key("a".into())),
                (EventType::Start, PathComponent::Key("b".into())),
                (EventType::Leaf, PathComponent::Index(0)),
                (EventType::Leaf, PathComponent::Index(1)),
                (EventType::End, PathComponent::Key("b".into())),
                (EventType::End, PathComponent::Key("".into())),
            ]
        );
    }

    #[test]
    fn test_resolve() {
        let doc = json!({"name": {"first": "arthur"}, "tags": ["x", "y"]});
        assert_eq!(
            resolve(
                &doc,
                &[
                    PathComponent::Key("name".into()),
                    PathComponent::Key("first".into())
                ]
            ),
            Some(&json!("arthur"))
        );
        assert_eq!(
            resolve(
                &doc,
                &[PathComponent::Key("tags".into()), PathComponent::Index(1)]
            ),
            Some(&json!("y"))
        );
        assert_eq!(
            resolve(&doc, &[PathComponent::Key("missing".into())]),
            None
        );
    }
}
