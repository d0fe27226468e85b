use serde_json::{Map, Value};

use super::Result;

/// Merging a mapping into a scalar or sequence is always a bug upstream:
/// either the observed resource is corrupt or a kind normalizer patched
/// the wrong path.
#[derive(Debug, Fail)]
#[fail(display = "unable to merge a mapping into {} at '{}'", _0, _1)]
pub struct IncompatibleMerge(String, String);

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// One node of a structural patch.
///
/// Literal leaves fill or overwrite, mappings recurse, and callable nodes
/// compute their replacement from whatever the target currently holds.
/// The callable form is what drives per-list normalization: a kind
/// normalizer parks a closure at the list's path and the merger hands it
/// the existing sequence.
pub enum Overlay {
    /// Literal node: scalar, sequence or null
    Leaf(Value),
    /// Mapping node, recursed into
    Map(Vec<(String, Overlay)>),
    /// Replacement computed from the existing node
    With(Box<dyn Fn(Option<&Value>) -> Result<Value>>),
}

impl Overlay {
    /// Convert a plain json value into an overlay tree
    pub fn from_value(v: Value) -> Overlay {
        match v {
            Value::Object(map) => Overlay::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Overlay::from_value(v)))
                    .collect(),
            ),
            other => Overlay::Leaf(other),
        }
    }

    /// A callable overlay node
    pub fn with<F>(f: F) -> Overlay
    where
        F: Fn(Option<&Value>) -> Result<Value> + 'static,
    {
        Overlay::With(Box::new(f))
    }

    /// Empty mapping node for the builder style
    pub fn map() -> Overlay {
        Overlay::Map(Vec::new())
    }

    /// Builder-style insertion into a mapping node
    pub fn insert(mut self, key: &str, node: Overlay) -> Overlay {
        if let Overlay::Map(ref mut entries) = self {
            entries.push((key.to_string(), node));
        }
        self
    }
}

/// Recursively overlay `patch` onto `target`.
///
/// With `overwrite` set, literal leaves replace existing values; without
/// it they only fill absent keys (the defaulting mode). Mapping nodes
/// recurse in either mode, and callable nodes always run.
pub fn merge(target: &mut Value, patch: &Overlay, overwrite: bool) -> Result<()> {
    let entries = match patch {
        Overlay::Map(entries) => entries,
        _ => {
            return Err(IncompatibleMerge("a non-mapping patch".into(), "".into()).into());
        }
    };
    if !target.is_object() {
        return Err(IncompatibleMerge(type_name(target).into(), "".into()).into());
    }
    if let Some(map) = target.as_object_mut() {
        for (key, node) in entries {
            merge_key(map, key, node, overwrite)?;
        }
    }
    Ok(())
}

fn merge_key(
    map: &mut Map<String, Value>,
    key: &str,
    node: &Overlay,
    overwrite: bool,
) -> Result<()> {
    match node {
        Overlay::Map(_) => match map.get_mut(key) {
            None => {
                if let Some(v) = materialize(node)? {
                    map.insert(key.to_string(), v);
                }
            }
            Some(slot) if slot.is_object() => merge(slot, node, overwrite)?,
            Some(slot) => {
                return Err(IncompatibleMerge(type_name(slot).into(), key.into()).into());
            }
        },
        Overlay::With(f) => {
            let replacement = f(map.get(key))?;
            // computed overlays do not create keys they decline to fill
            if !replacement.is_null() || map.contains_key(key) {
                map.insert(key.to_string(), replacement);
            }
        }
        Overlay::Leaf(v) => {
            if overwrite || !map.contains_key(key) {
                map.insert(key.to_string(), v.clone());
            }
        }
    }
    Ok(())
}

/// Materialize an overlay subtree with no existing target underneath it
fn materialize(node: &Overlay) -> Result<Option<Value>> {
    match node {
        Overlay::Leaf(v) => Ok(Some(v.clone())),
        Overlay::With(f) => {
            let v = f(None)?;
            if v.is_null() {
                Ok(None)
            } else {
                Ok(Some(v))
            }
        }
        Overlay::Map(entries) => {
            let mut out = Map::new();
            for (key, child) in entries {
                if let Some(v) = materialize(child)? {
                    out.insert(key.clone(), v);
                }
            }
            Ok(Some(Value::Object(out)))
        }
    }
}

/// Apply `merge` to every element of a sequence of mappings
pub fn merge_each(target: &mut Value, patch: &Overlay, overwrite: bool) -> Result<()> {
    let items = match target.as_array_mut() {
        Some(items) => items,
        None => {
            return Err(IncompatibleMerge(type_name(target).into(), "".into()).into());
        }
    };
    for item in items {
        if !item.is_object() {
            return Err(IncompatibleMerge(type_name(item).into(), "".into()).into());
        }
        merge(item, patch, overwrite)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{merge, merge_each, Overlay};
    use serde_json::Value;

    #[test]
    fn fill_only_writes_absent_keys() {
        let mut target = json!({"spec": {"type": "NodePort"}});
        let patch = Overlay::from_value(json!({"spec": {"type": "ClusterIP", "sessionAffinity": "None"}}));
        merge(&mut target, &patch, false).unwrap();
        assert_eq!(target, json!({"spec": {"type": "NodePort", "sessionAffinity": "None"}}));
    }

    #[test]
    fn overwrite_replaces_existing_keys() {
        let mut target = json!({"metadata": {"namespace": "apps", "name": "web"}});
        let patch = Overlay::from_value(json!({"metadata": {"namespace": ""}}));
        merge(&mut target, &patch, true).unwrap();
        assert_eq!(target, json!({"metadata": {"namespace": "", "name": "web"}}));
    }

    #[test]
    fn absent_mappings_are_deep_copied_in() {
        let mut target = json!({});
        let patch = Overlay::from_value(json!({"spec": {"lookupPolicy": {"local": false}}}));
        merge(&mut target, &patch, false).unwrap();
        assert_eq!(target, json!({"spec": {"lookupPolicy": {"local": false}}}));
    }

    #[test]
    fn mapping_into_scalar_fails() {
        let mut target = json!({"spec": "oops"});
        let patch = Overlay::from_value(json!({"spec": {"replicas": 1}}));
        assert!(merge(&mut target, &patch, false).is_err());
    }

    #[test]
    fn callable_overlay_sees_existing_node() {
        let mut target = json!({"spec": {"replicas": 3}});
        let patch = Overlay::map().insert(
            "spec",
            Overlay::map().insert(
                "replicas",
                Overlay::with(|v| {
                    let n = v.and_then(Value::as_i64).unwrap_or(0);
                    Ok(json!(n * 2))
                }),
            ),
        );
        merge(&mut target, &patch, false).unwrap();
        assert_eq!(target, json!({"spec": {"replicas": 6}}));
    }

    #[test]
    fn callable_overlay_declining_does_not_create_keys() {
        let mut target = json!({"spec": {}});
        let patch = Overlay::map().insert(
            "spec",
            Overlay::map().insert("ports", Overlay::with(|v| Ok(v.cloned().unwrap_or(Value::Null)))),
        );
        merge(&mut target, &patch, false).unwrap();
        assert_eq!(target, json!({"spec": {}}));
    }

    #[test]
    fn merge_each_patches_every_element() {
        let mut target = json!([{"name": "a"}, {"name": "b", "value": "x"}]);
        let patch = Overlay::from_value(json!({"value": ""}));
        merge_each(&mut target, &patch, false).unwrap();
        assert_eq!(
            target,
            json!([{"name": "a", "value": ""}, {"name": "b", "value": "x"}])
        );
    }

    #[test]
    fn merge_each_requires_a_sequence_of_mappings() {
        let mut not_a_list = json!({"name": "a"});
        let patch = Overlay::from_value(json!({"value": ""}));
        assert!(merge_each(&mut not_a_list, &patch, false).is_err());
        let mut scalars = json!(["a", "b"]);
        assert!(merge_each(&mut scalars, &patch, false).is_err());
    }
}
