/// Adoption of server-assigned dynamic values.
///
/// A handful of fields are legitimately invented by the cluster: a
/// service's clusterIP, the volume bound to a claim, and the pull-secret
/// references the controller manager attaches to every service account.
/// Before diffing, those are copied from the observed state into the
/// desired document so they do not read as drift.
use serde_json::Value;

use crate::resource;
use crate::Result;

/// Copy server-assigned values from `observed` into `desired`
pub fn adopt(desired: &mut Value, observed: &Value) -> Result<()> {
    match resource::kind(desired) {
        "PersistentVolumeClaim" => {
            adopt_spec_field(desired, observed, "storageClassName");
            adopt_spec_field(desired, observed, "volumeName");
        }
        "Service" => adopt_spec_field(desired, observed, "clusterIP"),
        "ServiceAccount" => {
            adopt_references(desired, observed, "imagePullSecrets", |name| {
                is_dockercfg(name)
            });
            adopt_references(desired, observed, "secrets", |name| {
                is_dockercfg(name) || is_token(name)
            });
        }
        _ => {}
    }
    Ok(())
}

fn adopt_spec_field(desired: &mut Value, observed: &Value, field: &str) {
    let value = match observed.pointer(&format!("/spec/{}", field)) {
        Some(v) if !v.is_null() => v.clone(),
        _ => return,
    };
    if desired.pointer(&format!("/spec/{}", field)).is_some() {
        return;
    }
    if desired.get("spec").is_none() {
        if let Some(map) = desired.as_object_mut() {
            map.insert("spec".to_string(), json!({}));
        }
    }
    if let Some(spec) = desired.get_mut("spec").and_then(Value::as_object_mut) {
        debug!("adopting spec.{} from cluster", field);
        spec.insert(field.to_string(), value);
    }
}

fn adopt_references<F>(desired: &mut Value, observed: &Value, field: &str, generated: F)
where
    F: Fn(&str) -> bool,
{
    let observed_refs = match observed.get(field).and_then(Value::as_array) {
        Some(refs) => refs.clone(),
        None => return,
    };
    let adopted: Vec<Value> = {
        let declared: Vec<&str> = desired
            .get(field)
            .and_then(Value::as_array)
            .map(|refs| {
                refs.iter()
                    .filter_map(|r| r.get("name").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        observed_refs
            .iter()
            .filter(|r| {
                r.get("name")
                    .and_then(Value::as_str)
                    .map(|name| generated(name) && !declared.contains(&name))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    };
    if adopted.is_empty() {
        return;
    }
    if desired.get(field).is_none() {
        if let Some(map) = desired.as_object_mut() {
            map.insert(field.to_string(), json!([]));
        }
    }
    if let Some(refs) = desired.get_mut(field).and_then(Value::as_array_mut) {
        debug!("adopting {} generated {} from cluster", adopted.len(), field);
        refs.extend(adopted);
    }
}

// literal position tests against openshift's generated-name shapes; see
// the design notes before generalizing these
fn is_dockercfg(name: &str) -> bool {
    name.len() >= 16 && name.get(name.len() - 16..name.len() - 5) == Some("-dockercfg-")
}

fn is_token(name: &str) -> bool {
    name.len() >= 12 && name.get(name.len() - 12..name.len() - 5) == Some("-token-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_adopts_binding_fields() {
        let mut desired = json!({
            "kind": "PersistentVolumeClaim",
            "metadata": {"name": "data"},
            "spec": {"accessModes": ["ReadWriteOnce"]}
        });
        let observed = json!({
            "kind": "PersistentVolumeClaim",
            "metadata": {"name": "data"},
            "spec": {"storageClassName": "gp2", "volumeName": "pvc-8c2a"}
        });
        adopt(&mut desired, &observed).unwrap();
        assert_eq!(desired.pointer("/spec/storageClassName"), Some(&json!("gp2")));
        assert_eq!(desired.pointer("/spec/volumeName"), Some(&json!("pvc-8c2a")));
    }

    #[test]
    fn declared_fields_are_not_overwritten() {
        let mut desired = json!({
            "kind": "Service",
            "metadata": {"name": "web"},
            "spec": {"clusterIP": "None"}
        });
        let observed = json!({
            "kind": "Service",
            "metadata": {"name": "web"},
            "spec": {"clusterIP": "10.0.0.42"}
        });
        adopt(&mut desired, &observed).unwrap();
        assert_eq!(desired.pointer("/spec/clusterIP"), Some(&json!("None")));
    }

    #[test]
    fn service_account_adopts_generated_secrets_only() {
        let mut desired = json!({
            "kind": "ServiceAccount",
            "metadata": {"name": "builder"}
        });
        let observed = json!({
            "kind": "ServiceAccount",
            "metadata": {"name": "builder"},
            "imagePullSecrets": [
                {"name": "builder-dockercfg-x4f2b"},
                {"name": "hand-made-pull-secret"}
            ],
            "secrets": [
                {"name": "builder-dockercfg-x4f2b"},
                {"name": "builder-token-9k2lm"},
                {"name": "user-supplied"}
            ]
        });
        adopt(&mut desired, &observed).unwrap();
        assert_eq!(
            desired["imagePullSecrets"],
            json!([{"name": "builder-dockercfg-x4f2b"}])
        );
        assert_eq!(
            desired["secrets"],
            json!([{"name": "builder-dockercfg-x4f2b"}, {"name": "builder-token-9k2lm"}])
        );
    }

    #[test]
    fn already_declared_references_are_not_duplicated() {
        let mut desired = json!({
            "kind": "ServiceAccount",
            "metadata": {"name": "builder"},
            "secrets": [{"name": "builder-token-9k2lm"}]
        });
        let observed = json!({
            "kind": "ServiceAccount",
            "metadata": {"name": "builder"},
            "secrets": [{"name": "builder-token-9k2lm"}]
        });
        adopt(&mut desired, &observed).unwrap();
        assert_eq!(desired["secrets"], json!([{"name": "builder-token-9k2lm"}]));
    }

    #[test]
    fn suffix_positions_are_literal() {
        assert!(is_dockercfg("default-dockercfg-abc12"));
        // five trailing characters required after the marker
        assert!(!is_dockercfg("default-dockercfg-ab"));
        assert!(is_token("builder-token-9k2lm"));
        assert!(!is_token("builder-token"));
        assert!(!is_token("token-9k2lm-builder"));
    }
}
