use std::collections::BTreeMap;

use serde_json::Value;

use super::Result;

/// Sentinel key marking a sequence's semantic shape.
///
/// The normalizer appends one sentinel mapping to each sequence whose
/// order is not meaningful; the differ dispatches on it and strips it from
/// every value it emits. Sequences without a sentinel are positional.
pub const SENTINEL: &str = "__list";

/// Semantic shape of a sequence
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Order is meaningful, compared index by index
    Positional,
    /// Unordered unique membership
    Set,
    /// Unordered, entries matched by a natural key attribute
    Keyed {
        key: String,
        index: BTreeMap<String, usize>,
    },
}

/// Tag a sequence as an unordered set
pub fn mark_set(list: &mut Value) -> Result<()> {
    let items = sequence(list)?;
    unmark_items(items);
    items.push(json!({ SENTINEL: "set" }));
    Ok(())
}

/// Tag a sequence as keyed by a natural-key attribute
///
/// The sentinel carries a key-to-position map so the differ can match
/// entries without rescanning. Entries missing the key attribute index
/// under their serialized form, which keeps malformed input deterministic.
pub fn mark_keyed(list: &mut Value, key: &str) -> Result<()> {
    let items = sequence(list)?;
    unmark_items(items);
    let mut index = serde_json::Map::new();
    for (position, item) in items.iter().enumerate() {
        // first occurrence wins for duplicate keys
        index.entry(entry_key(item, key)).or_insert(json!(position));
    }
    items.push(json!({ SENTINEL: "keyed", "key": key, "index": index }));
    Ok(())
}

/// Remove any sentinel from a sequence, leaving plain entries
pub fn unmark(list: &mut Value) {
    if let Some(items) = list.as_array_mut() {
        unmark_items(items);
    }
}

fn unmark_items(items: &mut Vec<Value>) {
    items.retain(|item| !is_sentinel(item));
}

/// Whether a sequence element is a shape sentinel
pub fn is_sentinel(item: &Value) -> bool {
    item.as_object().map(|m| m.contains_key(SENTINEL)).unwrap_or(false)
}

/// Read a sequence's shape from its sentinel (absent sentinel: positional)
pub fn shape_of(items: &[Value]) -> Shape {
    let tag = match items.last().filter(|item| is_sentinel(item)) {
        Some(tag) => tag,
        None => return Shape::Positional,
    };
    match tag.get(SENTINEL).and_then(Value::as_str) {
        Some("set") => Shape::Set,
        Some("keyed") => {
            let key = tag
                .get("key")
                .and_then(Value::as_str)
                .unwrap_or("name")
                .to_string();
            let mut index = BTreeMap::new();
            if let Some(map) = tag.get("index").and_then(Value::as_object) {
                for (k, v) in map {
                    if let Some(position) = v.as_u64() {
                        index.insert(k.clone(), position as usize);
                    }
                }
            }
            Shape::Keyed { key, index }
        }
        _ => Shape::Positional,
    }
}

/// Sequence entries without the trailing sentinel
pub fn entries(items: &[Value]) -> &[Value] {
    match items.last() {
        Some(last) if is_sentinel(last) => &items[..items.len() - 1],
        _ => items,
    }
}

/// The index key under which an entry is matched
pub fn entry_key(item: &Value, key: &str) -> String {
    match item.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => item.to_string(),
    }
}

/// Deep copy with every sentinel removed
///
/// Applied to anything that leaves the engine: patch values, generated
/// manifests, and the resource echoed in results.
pub fn strip(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|item| !is_sentinel(item))
                .map(strip)
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), strip(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn sequence(list: &mut Value) -> Result<&mut Vec<Value>> {
    match list.as_array_mut() {
        Some(items) => Ok(items),
        None => bail!("semantic list tags only apply to sequences"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_marking_is_idempotent() {
        let mut list = json!(["get", "list"]);
        mark_set(&mut list).unwrap();
        mark_set(&mut list).unwrap();
        let items = list.as_array().unwrap();
        assert_eq!(entries(items), &[json!("get"), json!("list")]);
        assert_eq!(shape_of(items), Shape::Set);
    }

    #[test]
    fn keyed_marking_builds_an_index() {
        let mut list = json!([{"name": "web"}, {"name": "sidecar"}]);
        mark_keyed(&mut list, "name").unwrap();
        match shape_of(list.as_array().unwrap()) {
            Shape::Keyed { key, index } => {
                assert_eq!(key, "name");
                assert_eq!(index["web"], 0);
                assert_eq!(index["sidecar"], 1);
            }
            other => panic!("expected keyed shape, got {:?}", other),
        }
    }

    #[test]
    fn numeric_keys_index_as_strings() {
        let mut list = json!([{"port": 80}, {"port": 443}]);
        mark_keyed(&mut list, "port").unwrap();
        match shape_of(list.as_array().unwrap()) {
            Shape::Keyed { index, .. } => {
                assert_eq!(index["80"], 0);
                assert_eq!(index["443"], 1);
            }
            other => panic!("expected keyed shape, got {:?}", other),
        }
    }

    #[test]
    fn untagged_sequences_are_positional() {
        let v = json!(["a", "b"]);
        assert_eq!(shape_of(v.as_array().unwrap()), Shape::Positional);
    }

    #[test]
    fn strip_removes_sentinels_recursively() {
        let mut ports = json!([{"port": 80}]);
        mark_keyed(&mut ports, "port").unwrap();
        let doc = json!({"spec": {"ports": ports}});
        assert_eq!(strip(&doc), json!({"spec": {"ports": [{"port": 80}]}}));
    }

    #[test]
    fn marking_a_mapping_fails() {
        let mut not_a_list = json!({"name": "web"});
        assert!(mark_set(&mut not_a_list).is_err());
    }
}
