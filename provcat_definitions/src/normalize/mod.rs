/// Kind-dispatched resource normalization.
///
/// `normalize` rewrites a deep copy of a resource document into canonical
/// form: server-populated noise blanked, schema defaults filled, cpu and
/// memory quantities canonicalized, and sequences tagged with their
/// semantic shape. Two documents describe the same cluster state iff their
/// normalized forms are equal.
use serde_json::Value;

use crate::listkind;
use crate::merge::{merge, Overlay};
use crate::resource;
use crate::units::{canonical_cpu, canonical_memory};
use crate::Result;

/// Pod template handling shared by the workload kinds
pub mod pod;
/// Workload kinds: builds, deployments, daemonsets, statefulsets, batch
pub mod workloads;
/// Service, Route and NetworkPolicy
pub mod network;
/// RBAC kinds and SecurityContextConstraints
pub mod rbac;
/// PersistentVolume and PersistentVolumeClaim
pub mod storage;
/// LimitRange and the quota kinds
pub mod quota;

/// Context a kind normalizer may need beyond the document itself
pub struct Ctx {
    /// Namespace the request targets; "" for cluster scope
    pub namespace: String,
}

type KindFn = fn(&mut Value, &Ctx) -> Result<()>;

/// The static kind-dispatch table
///
/// Unknown kinds get the common mask only.
fn kind_normalizer(kind: &str) -> Option<KindFn> {
    match kind {
        "BuildConfig" => Some(workloads::buildconfig),
        "CronJob" => Some(workloads::cronjob),
        "DaemonSet" => Some(workloads::daemonset),
        "Deployment" => Some(workloads::deployment),
        "DeploymentConfig" => Some(workloads::deploymentconfig),
        "HorizontalPodAutoscaler" => Some(workloads::horizontalpodautoscaler),
        "ImageStream" => Some(workloads::imagestream),
        "Job" => Some(workloads::job),
        "ReplicaSet" | "ReplicationController" => Some(workloads::replicaset),
        "StatefulSet" => Some(workloads::statefulset),
        "NetworkPolicy" => Some(network::networkpolicy),
        "Route" => Some(network::route),
        "Service" => Some(network::service),
        "PersistentVolume" => Some(storage::persistentvolume),
        "PersistentVolumeClaim" => Some(storage::persistentvolumeclaim),
        "ClusterRole" | "Role" => Some(rbac::role),
        "ClusterRoleBinding" | "RoleBinding" => Some(rbac::rolebinding),
        "SecurityContextConstraints" => Some(rbac::securitycontextconstraints),
        "LimitRange" => Some(quota::limitrange),
        "ClusterResourceQuota" | "ResourceQuota" => Some(quota::resourcequota),
        _ => None,
    }
}

/// Normalize a resource using the namespace recorded in its metadata
pub fn normalize(resource: &Value) -> Result<Value> {
    let ns = resource::namespace(resource).map(str::to_string);
    normalize_in(resource, ns.as_ref().map(String::as_str))
}

/// Normalize a resource against an explicit target namespace
///
/// The reconciler passes the request namespace so desired documents that
/// leave `metadata.namespace` implicit normalize the same way as the
/// observed state, which always carries it.
pub fn normalize_in(resource: &Value, namespace: Option<&str>) -> Result<Value> {
    resource::validate(resource)?;
    let kind = resource::kind(resource).to_string();
    let ctx = Ctx {
        namespace: namespace.unwrap_or("").to_string(),
    };

    // work on a sentinel-free deep copy so re-normalizing is a fixpoint
    let mut res = listkind::strip(resource);
    common_mask(&mut res)?;
    if let Some(rewrite) = kind_normalizer(&kind) {
        trace!("applying {} normalizer to {}", kind, resource::name(&res));
        rewrite(&mut res, &ctx)?;
    } else {
        debug!("no normalizer for kind {}, common mask only", kind);
    }
    Ok(res)
}

/// Blank the fields every api server populates regardless of kind
fn common_mask(res: &mut Value) -> Result<()> {
    force(
        res,
        json!({
            "metadata": {
                "annotations": {
                    "kubectl.kubernetes.io/last-applied-configuration": ""
                },
                "creationTimestamp": "",
                "generation": 0,
                "namespace": "",
                "resourceVersion": "",
                "selfLink": "",
                "uid": ""
            }
        }),
    )?;
    if res.pointer("/spec/template").map(Value::is_object).unwrap_or(false) {
        force(
            res,
            json!({
                "spec": {
                    "template": {"metadata": {"creationTimestamp": ""}},
                    "templateGeneration": 0
                }
            }),
        )?;
    }
    Ok(())
}

/// Fill defaults: write only keys the document does not set
pub(crate) fn fill(res: &mut Value, patch: Value) -> Result<()> {
    merge(res, &Overlay::from_value(patch), false)
}

/// Blank server-managed fields: overwrite whatever the document holds
pub(crate) fn force(res: &mut Value, patch: Value) -> Result<()> {
    merge(res, &Overlay::from_value(patch), true)
}

/// Overwrite a single annotation with the blank value
pub(crate) fn blank_annotation(res: &mut Value, key: &str) -> Result<()> {
    force(res, json!({"metadata": {"annotations": {key: ""}}}))
}

/// Status subtrees never participate in comparison
pub(crate) fn blank_status(res: &mut Value) -> Result<()> {
    force(res, json!({"status": null}))
}

/// Quantity values arrive as strings or bare numbers
pub(crate) fn quantity_str(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Canonicalize the cpu/memory entries of a limits- or requests-style map
pub(crate) fn canonicalize_compute(map: &mut serde_json::Map<String, Value>) -> Result<()> {
    if let Some(q) = map.get("cpu").and_then(quantity_str) {
        map.insert("cpu".to_string(), Value::String(canonical_cpu(&q)?));
    }
    if let Some(q) = map.get("memory").and_then(quantity_str) {
        map.insert("memory".to_string(), Value::String(canonical_memory(&q)?));
    }
    Ok(())
}

/// Canonicalize `resources.limits` and `resources.requests`
pub(crate) fn canonicalize_resources(resources: &mut Value) -> Result<()> {
    for section in &["limits", "requests"] {
        if let Some(map) = resources.get_mut(*section).and_then(Value::as_object_mut) {
            canonicalize_compute(map)?;
        }
    }
    Ok(())
}
