/// Normalizers for LimitRange and the quota kinds.
use serde_json::{Map, Value};

use super::{canonicalize_compute, quantity_str, Ctx};
use crate::units::{canonical_cpu, canonical_memory};
use crate::Result;

pub fn limitrange(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    if let Some(limits) = res.pointer_mut("/spec/limits").and_then(Value::as_array_mut) {
        for item in limits {
            for section in &["default", "defaultRequest", "max", "maxLimitRequestRatio", "min"] {
                if let Some(map) = item.get_mut(*section).and_then(Value::as_object_mut) {
                    canonicalize_compute(map)?;
                }
            }
        }
    }
    Ok(())
}

/// ResourceQuota and ClusterResourceQuota
pub fn resourcequota(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    // openshift nests the cluster-wide variant under spec.quota
    for path in &["/spec/hard", "/spec/quota/hard"] {
        if let Some(map) = res.pointer_mut(path).and_then(Value::as_object_mut) {
            canonicalize_hard(map)?;
        }
    }
    Ok(())
}

fn canonicalize_hard(map: &mut Map<String, Value>) -> Result<()> {
    for key in &["limits.cpu", "requests.cpu"] {
        if let Some(q) = map.get(*key).and_then(quantity_str) {
            map.insert(key.to_string(), Value::String(canonical_cpu(&q)?));
        }
    }
    for key in &["limits.memory", "requests.memory"] {
        if let Some(q) = map.get(*key).and_then(quantity_str) {
            map.insert(key.to_string(), Value::String(canonical_memory(&q)?));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::normalize::normalize_in;

    #[test]
    fn limitrange_quantities_canonicalize() {
        let r = json!({
            "kind": "LimitRange",
            "metadata": {"name": "bounds"},
            "spec": {"limits": [{
                "type": "Container",
                "default": {"cpu": "1", "memory": "512Mi"},
                "defaultRequest": {"cpu": "100m", "memory": "256Mi"},
                "max": {"cpu": 2, "memory": "1Gi"}
            }]}
        });
        let n = normalize_in(&r, Some("apps")).unwrap();
        let item = n.pointer("/spec/limits/0").unwrap();
        assert_eq!(item.pointer("/default/cpu"), Some(&json!("1000m")));
        assert_eq!(item.pointer("/default/memory"), Some(&json!("536870912")));
        assert_eq!(item.pointer("/max/cpu"), Some(&json!("2000m")));
        assert_eq!(item.pointer("/max/memory"), Some(&json!("1073741824")));
    }

    #[test]
    fn quota_hard_entries_canonicalize() {
        let r = json!({
            "kind": "ResourceQuota",
            "metadata": {"name": "compute"},
            "spec": {"hard": {
                "limits.cpu": "4",
                "limits.memory": "8Gi",
                "requests.cpu": "2",
                "requests.memory": "4G",
                "pods": "20"
            }}
        });
        let n = normalize_in(&r, Some("apps")).unwrap();
        assert_eq!(n.pointer("/spec/hard/limits.cpu"), Some(&json!("4000m")));
        assert_eq!(n.pointer("/spec/hard/limits.memory"), Some(&json!("8589934592")));
        assert_eq!(n.pointer("/spec/hard/requests.memory"), Some(&json!("4000000000")));
        // untracked entries pass through
        assert_eq!(n.pointer("/spec/hard/pods"), Some(&json!("20")));
    }
}
