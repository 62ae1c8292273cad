//! Path operations on a JSON tree.
//!
//! Null and empty objects never persist: writing one deletes the node, and any
//! parent left empty by a delete is pruned as well.

use super::StorePath;
use serde_json::{Map, Value};

fn is_empty_node(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Drop null and empty-object children, recursively.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !is_empty_node(v))
                .collect(),
        ),
        other => other,
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

/// Value at `path`, or `None` if absent.
pub fn get<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    if is_empty_node(node) { None } else { Some(node) }
}

/// Replace the value at `path`.
pub fn set(root: &mut Value, path: &StorePath, value: Value) {
    let value = normalize(value);
    if is_empty_node(&value) {
        remove(root, path);
        return;
    }

    let segments: Vec<&str> = path.segments().collect();
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };
    let mut node = root;
    for segment in parents {
        node = ensure_object(node)
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node).insert(last.to_string(), value);
}

/// Set each relative field path under `path`.
pub fn update(root: &mut Value, path: &StorePath, fields: Map<String, Value>) {
    for (field, value) in fields {
        set(root, &path.child(&field), value);
    }
}

/// Delete the value at `path`, pruning parents left empty.
pub fn remove(root: &mut Value, path: &StorePath) {
    let segments: Vec<&str> = path.segments().collect();
    if segments.is_empty() {
        *root = Value::Object(Map::new());
        return;
    }
    remove_in(root, &segments);
}

/// Returns true if `node` is empty afterwards.
fn remove_in(node: &mut Value, segments: &[&str]) -> bool {
    let Some(map) = node.as_object_mut() else {
        return false;
    };
    match segments {
        [] => {}
        [last] => {
            map.remove(*last);
        }
        [first, rest @ ..] => {
            if let Some(child) = map.get_mut(*first) {
                if remove_in(child, rest) {
                    map.remove(*first);
                }
            }
        }
    }
    map.is_empty()
}
