/// Patch production between two normalized resource documents.
///
/// `diff(observed, desired, kind)` emits the ordered operation list that
/// rewrites the observed form into the desired one. Both inputs must come
/// out of `normalize`; the differ trusts the semantic-list sentinels it
/// finds there and strips them from every value it emits.
use std::collections::BTreeMap;

use serde_json::Value;

use crate::listkind::{self, Shape};

/// A patch operation verb
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Test,
    Remove,
    Replace,
    Add,
}

/// One operation of a patch document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: Op,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOp {
    fn test(path: String, value: &Value) -> PatchOp {
        PatchOp { op: Op::Test, path, value: Some(listkind::strip(value)) }
    }
    fn remove(path: String) -> PatchOp {
        PatchOp { op: Op::Remove, path, value: None }
    }
    fn replace(path: String, value: &Value) -> PatchOp {
        PatchOp { op: Op::Replace, path, value: Some(listkind::strip(value)) }
    }
    fn add(path: String, value: &Value) -> PatchOp {
        PatchOp { op: Op::Add, path, value: Some(listkind::strip(value)) }
    }
}

// json-pointer escaping; annotation keys contain slashes
fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn child(path: &str, segment: &str) -> String {
    format!("{}/{}", path, escape(segment))
}

fn child_index(path: &str, index: usize) -> String {
    format!("{}/{}", path, index)
}

/// The top-level fields a kind is compared on
///
/// Most kinds live entirely under `spec`, but several carry their payload
/// in sibling fields, and SecurityContextConstraints has no `spec` at all:
/// there the desired document decides what is compared.
pub fn comparison_fields(kind: &str, desired: &Value) -> Vec<String> {
    let fields: Vec<&str> = match kind {
        "ClusterRole" | "Role" => vec!["metadata", "rules"],
        "ClusterRoleBinding" | "RoleBinding" => vec!["metadata", "roleRef", "subjects"],
        "ConfigMap" | "Secret" => vec!["metadata", "data"],
        "Group" => vec!["metadata", "users"],
        "Project" => vec!["metadata", "labels"],
        "ServiceAccount" => vec!["metadata", "imagePullSecrets", "secrets"],
        "Template" => vec!["metadata", "labels", "objects", "parameters"],
        "MutatingWebhookConfiguration" | "ValidatingWebhookConfiguration" => {
            vec!["metadata", "webhooks"]
        }
        "SecurityContextConstraints" => {
            return desired
                .as_object()
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default();
        }
        _ => vec!["metadata", "spec"],
    };
    fields.into_iter().map(str::to_string).collect()
}

/// Produce the patch transforming normalized `src` into normalized `dst`
pub fn diff(src: &Value, dst: &Value, kind: &str) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    for field in comparison_fields(kind, dst) {
        let path = child("", &field);
        match (src.get(&field), dst.get(&field)) {
            (Some(a), None) => {
                ops.push(PatchOp::test(path.clone(), a));
                ops.push(PatchOp::remove(path));
            }
            (None, Some(b)) => ops.push(PatchOp::add(path, b)),
            (Some(a), Some(b)) => diff_value(&path, a, b, &mut ops),
            (None, None) => {}
        }
    }
    ops
}

fn stripped_eq(a: &Value, b: &Value) -> bool {
    listkind::strip(a) == listkind::strip(b)
}

fn diff_value(path: &str, a: &Value, b: &Value, ops: &mut Vec<PatchOp>) {
    if stripped_eq(a, b) {
        return;
    }
    match (a, b) {
        (Value::Object(ma), Value::Object(mb)) => {
            for (k, va) in ma {
                match mb.get(k) {
                    None => {
                        let p = child(path, k);
                        ops.push(PatchOp::test(p.clone(), va));
                        ops.push(PatchOp::remove(p));
                    }
                    Some(vb) => diff_value(&child(path, k), va, vb, ops),
                }
            }
            for (k, vb) in mb {
                if !ma.contains_key(k) {
                    ops.push(PatchOp::add(child(path, k), vb));
                }
            }
        }
        (Value::Array(la), Value::Array(lb)) => diff_lists(path, la, lb, ops),
        _ => {
            ops.push(PatchOp::test(path.to_string(), a));
            ops.push(PatchOp::replace(path.to_string(), b));
        }
    }
}

fn diff_lists(path: &str, la: &[Value], lb: &[Value], ops: &mut Vec<PatchOp>) {
    let shape = match listkind::shape_of(la) {
        Shape::Positional => listkind::shape_of(lb),
        tagged => tagged,
    };
    let ea = listkind::entries(la);
    let eb = listkind::entries(lb);
    match shape {
        Shape::Positional => {
            let common = ea.len().min(eb.len());
            for i in 0..common {
                diff_value(&child_index(path, i), &ea[i], &eb[i], ops);
            }
            for (i, item) in eb.iter().enumerate().skip(common) {
                ops.push(PatchOp::add(child_index(path, i), item));
            }
            for i in (common..ea.len()).rev() {
                let p = child_index(path, i);
                ops.push(PatchOp::test(p.clone(), &ea[i]));
                ops.push(PatchOp::remove(p));
            }
        }
        Shape::Set => {
            let sa: Vec<Value> = ea.iter().map(listkind::strip).collect();
            let sb: Vec<Value> = eb.iter().map(listkind::strip).collect();
            // multiset matching: each member consumes at most one partner
            let mut claimed = vec![false; sb.len()];
            let mut removals = Vec::new();
            for (i, va) in sa.iter().enumerate() {
                match sb.iter().enumerate().position(|(j, vb)| !claimed[j] && va == vb) {
                    Some(j) => claimed[j] = true,
                    None => removals.push(i),
                }
            }
            for &i in removals.iter().rev() {
                let p = child_index(path, i);
                ops.push(PatchOp::test(p.clone(), &ea[i]));
                ops.push(PatchOp::remove(p));
            }
            for (j, item) in eb.iter().enumerate() {
                if !claimed[j] {
                    ops.push(PatchOp::add(format!("{}/-", path), item));
                }
            }
        }
        Shape::Keyed { key, .. } => {
            let ia = index_for(la, &key);
            let ib = index_for(lb, &key);
            let mut removals = Vec::new();
            for (i, item) in ea.iter().enumerate() {
                if !ib.contains_key(&listkind::entry_key(item, &key)) {
                    removals.push(i);
                }
            }
            for &i in removals.iter().rev() {
                let p = child_index(path, i);
                ops.push(PatchOp::test(p.clone(), &ea[i]));
                ops.push(PatchOp::remove(p));
            }
            for (i, item) in ea.iter().enumerate() {
                if let Some(&j) = ib.get(&listkind::entry_key(item, &key)) {
                    diff_value(&child_index(path, i), item, &eb[j], ops);
                }
            }
            for item in eb {
                if !ia.contains_key(&listkind::entry_key(item, &key)) {
                    ops.push(PatchOp::add(format!("{}/-", path), item));
                }
            }
        }
    }
}

// prefer the sentinel's precomputed index, rebuild when it is foreign
fn index_for(items: &[Value], key: &str) -> BTreeMap<String, usize> {
    if let Shape::Keyed { key: own, index } = listkind::shape_of(items) {
        if own == key {
            return index;
        }
    }
    let mut index = BTreeMap::new();
    for (i, item) in listkind::entries(items).iter().enumerate() {
        index.entry(listkind::entry_key(item, key)).or_insert(i);
    }
    index
}

#[cfg(test)]
mod tests {
    use super::{diff, Op, PatchOp};
    use crate::listkind;
    use crate::normalize::normalize_in;

    fn paths(ops: &[PatchOp]) -> Vec<(Op, String)> {
        ops.iter().map(|o| (o.op, o.path.clone())).collect()
    }

    #[test]
    fn identical_documents_produce_no_ops() {
        let r = json!({
            "kind": "ConfigMap",
            "metadata": {"name": "settings"},
            "data": {"a": "1"}
        });
        assert_eq!(diff(&r, &r, "ConfigMap"), vec![]);
    }

    #[test]
    fn leaf_changes_are_guarded_replacements() {
        let a = json!({"kind": "ConfigMap", "metadata": {"name": "c"}, "data": {"a": "1"}});
        let b = json!({"kind": "ConfigMap", "metadata": {"name": "c"}, "data": {"a": "2"}});
        let ops = diff(&a, &b, "ConfigMap");
        assert_eq!(
            ops,
            vec![
                PatchOp { op: Op::Test, path: "/data/a".into(), value: Some(json!("1")) },
                PatchOp { op: Op::Replace, path: "/data/a".into(), value: Some(json!("2")) },
            ]
        );
    }

    #[test]
    fn missing_fields_remove_and_add() {
        let a = json!({"kind": "ConfigMap", "metadata": {"name": "c"}, "data": {"a": "1"}});
        let b = json!({"kind": "ConfigMap", "metadata": {"name": "c"}});
        let ops = diff(&a, &b, "ConfigMap");
        assert_eq!(
            paths(&ops),
            vec![(Op::Test, "/data".into()), (Op::Remove, "/data".into())]
        );
        let ops = diff(&b, &a, "ConfigMap");
        assert_eq!(paths(&ops), vec![(Op::Add, "/data".into())]);
    }

    #[test]
    fn annotation_keys_are_pointer_escaped() {
        let a = json!({"kind": "ConfigMap", "metadata": {"name": "c", "annotations": {"example.com/a": "1"}}});
        let b = json!({"kind": "ConfigMap", "metadata": {"name": "c", "annotations": {"example.com/a": "2"}}});
        let ops = diff(&a, &b, "ConfigMap");
        assert_eq!(ops[0].path, "/metadata/annotations/example.com~1a");
    }

    #[test]
    fn set_lists_ignore_order() {
        let mut va = json!({"kind": "Group", "metadata": {"name": "g"}, "users": ["alice", "bob"]});
        let mut vb = json!({"kind": "Group", "metadata": {"name": "g"}, "users": ["bob", "alice"]});
        listkind::mark_set(&mut va["users"]).unwrap();
        listkind::mark_set(&mut vb["users"]).unwrap();
        assert_eq!(diff(&va, &vb, "Group"), vec![]);
    }

    #[test]
    fn set_lists_respect_multiplicity() {
        let mut va = json!({"kind": "Group", "metadata": {"name": "g"}, "users": ["alice", "alice"]});
        let mut vb = json!({"kind": "Group", "metadata": {"name": "g"}, "users": ["alice"]});
        listkind::mark_set(&mut va["users"]).unwrap();
        listkind::mark_set(&mut vb["users"]).unwrap();
        let ops = diff(&va, &vb, "Group");
        assert_eq!(
            paths(&ops),
            vec![(Op::Test, "/users/1".into()), (Op::Remove, "/users/1".into())]
        );
    }

    #[test]
    fn set_additions_append() {
        let mut va = json!({"kind": "Group", "metadata": {"name": "g"}, "users": ["alice"]});
        let mut vb = json!({"kind": "Group", "metadata": {"name": "g"}, "users": ["alice", "bob"]});
        listkind::mark_set(&mut va["users"]).unwrap();
        listkind::mark_set(&mut vb["users"]).unwrap();
        let ops = diff(&va, &vb, "Group");
        assert_eq!(
            ops,
            vec![PatchOp { op: Op::Add, path: "/users/-".into(), value: Some(json!("bob")) }]
        );
    }

    #[test]
    fn keyed_lists_match_by_key_and_recurse() {
        let mut la = json!([
            {"name": "web", "image": "nginx:1.15"},
            {"name": "old", "image": "legacy:1"}
        ]);
        let mut lb = json!([
            {"name": "fresh", "image": "new:1"},
            {"name": "web", "image": "nginx:1.16"}
        ]);
        listkind::mark_keyed(&mut la, "name").unwrap();
        listkind::mark_keyed(&mut lb, "name").unwrap();
        let a = json!({"kind": "X", "metadata": {"name": "x"}, "spec": {"containers": la}});
        let b = json!({"kind": "X", "metadata": {"name": "x"}, "spec": {"containers": lb}});
        let ops = diff(&a, &b, "X");
        assert_eq!(
            paths(&ops),
            vec![
                (Op::Test, "/spec/containers/1".into()),
                (Op::Remove, "/spec/containers/1".into()),
                (Op::Test, "/spec/containers/0/image".into()),
                (Op::Replace, "/spec/containers/0/image".into()),
                (Op::Add, "/spec/containers/-".into()),
            ]
        );
        // emitted values carry no sentinels
        let added = ops.last().and_then(|o| o.value.clone()).unwrap();
        assert_eq!(added, json!({"name": "fresh", "image": "new:1"}));
    }

    #[test]
    fn positional_lists_compare_by_index() {
        let a = json!({"kind": "X", "metadata": {"name": "x"}, "spec": {"seq": [1, 2, 3]}});
        let b = json!({"kind": "X", "metadata": {"name": "x"}, "spec": {"seq": [1, 9]}});
        let ops = diff(&a, &b, "X");
        assert_eq!(
            paths(&ops),
            vec![
                (Op::Test, "/spec/seq/1".into()),
                (Op::Replace, "/spec/seq/1".into()),
                (Op::Test, "/spec/seq/2".into()),
                (Op::Remove, "/spec/seq/2".into()),
            ]
        );
    }

    #[test]
    fn canonicalized_memory_compares_equal() {
        let desired = json!({
            "kind": "Deployment",
            "metadata": {"name": "web"},
            "spec": {"template": {"metadata": {}, "spec": {"containers": [{
                "name": "web",
                "resources": {"limits": {"memory": "1Gi"}}
            }]}}}
        });
        let observed = json!({
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "apps"},
            "spec": {"template": {"metadata": {}, "spec": {"containers": [{
                "name": "web",
                "resources": {"limits": {"memory": "1073741824"}}
            }]}}}
        });
        let a = normalize_in(&observed, Some("apps")).unwrap();
        let b = normalize_in(&desired, Some("apps")).unwrap();
        assert_eq!(diff(&a, &b, "Deployment"), vec![]);
    }

    #[test]
    fn self_diff_of_normalized_documents_is_empty() {
        let r = json!({
            "kind": "Service",
            "metadata": {"name": "web"},
            "spec": {"ports": [{"port": 80}, {"port": 443}]}
        });
        let n = normalize_in(&r, Some("apps")).unwrap();
        assert_eq!(diff(&n, &n, "Service"), vec![]);
    }

    #[test]
    fn scc_compares_the_desired_documents_fields() {
        let a = json!({
            "kind": "SecurityContextConstraints",
            "metadata": {"name": "restricted"},
            "priority": 10,
            "readOnlyRootFilesystem": false
        });
        let b = json!({
            "kind": "SecurityContextConstraints",
            "metadata": {"name": "restricted"},
            "priority": 5
        });
        let ops = diff(&a, &b, "SecurityContextConstraints");
        // readOnlyRootFilesystem is not in the desired document, so it is
        // not compared; priority is, and differs
        assert_eq!(
            paths(&ops),
            vec![(Op::Test, "/priority".into()), (Op::Replace, "/priority".into())]
        );
    }

    #[test]
    fn emitted_values_are_sentinel_free() {
        let mut la = json!(["get"]);
        listkind::mark_set(&mut la).unwrap();
        let a = json!({"kind": "X", "metadata": {"name": "x"}, "spec": {"verbs": la}});
        let b = json!({"kind": "X", "metadata": {"name": "x"}});
        let ops = diff(&a, &b, "X");
        assert_eq!(ops[0].op, Op::Test);
        assert_eq!(ops[0].value, Some(json!({"verbs": ["get"]})));
    }

    #[test]
    fn op_serialization_is_lowercase() {
        let op = PatchOp { op: Op::Replace, path: "/spec".into(), value: Some(json!(1)) };
        let s = serde_json::to_value(&op).unwrap();
        assert_eq!(s, json!({"op": "replace", "path": "/spec", "value": 1}));
        let none = PatchOp { op: Op::Remove, path: "/spec".into(), value: None };
        assert_eq!(serde_json::to_value(&none).unwrap(), json!({"op": "remove", "path": "/spec"}));
    }
}
