/// Normalizers for the RBAC kinds and SecurityContextConstraints.
use serde_json::Value;

use super::{fill, force, Ctx};
use crate::listkind;
use crate::merge::{merge, Overlay};
use crate::Result;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// ClusterRole and Role
pub fn role(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    if let Some(rules) = res.get_mut("rules").and_then(Value::as_array_mut) {
        for rule in rules {
            // legacy field the server reflects back as null
            if rule
                .get("attributeRestrictions")
                .map(Value::is_null)
                .unwrap_or(false)
            {
                if let Some(map) = rule.as_object_mut() {
                    map.remove("attributeRestrictions");
                }
            }
            for list in &["apiGroups", "nonResourceURLs", "resourceNames", "resources", "verbs"] {
                if let Some(members) = rule.get_mut(*list) {
                    if members.is_array() {
                        listkind::mark_set(members)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// ClusterRoleBinding and RoleBinding
pub fn rolebinding(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    fill(
        res,
        json!({"roleRef": {"apiGroup": RBAC_API_GROUP, "kind": "ClusterRole"}}),
    )?;
    if let Some(subjects) = res.get_mut("subjects").and_then(Value::as_array_mut) {
        for subject in subjects {
            // the implied group reads the same with or without the field
            if subject.get("apiGroup").and_then(Value::as_str) == Some(RBAC_API_GROUP) {
                if let Some(map) = subject.as_object_mut() {
                    map.remove("apiGroup");
                }
            }
            // openshift's legacy alias for Group
            if subject.get("kind").and_then(Value::as_str) == Some("SystemGroup") {
                force(subject, json!({"kind": "Group"}))?;
            }
        }
    }
    if let Some(subjects) = res.get_mut("subjects") {
        if subjects.is_array() {
            listkind::mark_set(subjects)?;
        }
    }
    Ok(())
}

pub fn securitycontextconstraints(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    for list in &[
        "allowedCapabilities",
        "defaultAddCapabilities",
        "groups",
        "requiredDropCapabilities",
        "users",
        "volumes",
    ] {
        let overlay = Overlay::map().insert(list, Overlay::with(scc_list));
        merge(res, &overlay, true)?;
    }
    Ok(())
}

// the server reports unset scc lists as null
fn scc_list(existing: Option<&Value>) -> Result<Value> {
    let mut list = match existing {
        None => return Ok(Value::Null),
        Some(Value::Null) => json!([]),
        Some(other) => other.clone(),
    };
    if list.is_array() {
        listkind::mark_set(&mut list)?;
    }
    Ok(list)
}
