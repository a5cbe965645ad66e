//! JSON tree operations with relay semantics
//!
//! Nulls and empty objects do not exist: writing null deletes, and a parent
//! left without children disappears with its last child.

use serde_json::{Map, Value};

use super::RelayPath;

/// Value stored at `path`, if any
pub fn get<'a>(root: &'a Value, path: &RelayPath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    (!is_empty(node)).then_some(node)
}

/// Replace the value at `path`; null deletes
pub fn set(root: &mut Value, path: &RelayPath, value: Value) {
    set_segments(root, path.segments(), normalize(value));
}

/// Merge each child of an object `value` into `path`. A non-object value
/// behaves like `set`.
pub fn merge(root: &mut Value, path: &RelayPath, value: Value) {
    match value {
        Value::Object(children) => {
            for (key, child) in children {
                set(root, &path.child(key), child);
            }
        }
        other => set(root, path, other),
    }
}

fn set_segments(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(children) = node else {
        return;
    };

    if rest.is_empty() {
        if value.is_null() {
            children.remove(head);
        } else {
            children.insert(head.clone(), value);
        }
        return;
    }

    let child = children.entry(head.clone()).or_insert(Value::Null);
    set_segments(child, rest, value);
    if is_empty(child) {
        children.remove(head);
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(children) => children.is_empty(),
        _ => false,
    }
}

/// Strip nulls and empty objects out of a value
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(children) => {
            let cleaned: Map<String, Value> = children
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect();
            if cleaned.is_empty() {
                Value::Null
            } else {
                Value::Object(cleaned)
            }
        }
        other => other,
    }
}
