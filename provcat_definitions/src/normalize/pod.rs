/// Pod template normalization shared by every workload kind.
///
/// The kubelet and the scheduler default a large number of template
/// fields server-side; those defaults are replayed here so a terse
/// user-supplied template compares equal to the fully-expanded form the
/// cluster reports.
use serde_json::Value;

use super::{canonicalize_resources, fill, force};
use crate::listkind;
use crate::merge::{merge_each, Overlay};
use crate::Result;

/// Normalize a `{metadata, spec}` pod template in place
pub fn pod_template(template: &mut Value) -> Result<()> {
    // nested templates sit below where the common mask reaches
    force(template, json!({"metadata": {"creationTimestamp": ""}}))?;
    if let Some(spec) = template.get_mut("spec") {
        if spec.is_object() {
            pod_spec(spec)?;
        }
    }
    Ok(())
}

/// Normalize a bare pod spec
pub fn pod_spec(spec: &mut Value) -> Result<()> {
    fill(
        spec,
        json!({
            "dnsPolicy": "ClusterFirst",
            "restartPolicy": "Always",
            "schedulerName": "default-scheduler",
            "securityContext": {},
            "terminationGracePeriodSeconds": 30
        }),
    )?;
    mirror_service_account(spec);

    let host_network = spec
        .get("hostNetwork")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    for list in &["containers", "initContainers"] {
        if let Some(containers) = spec.get_mut(*list) {
            if !containers.is_array() {
                continue;
            }
            listkind::unmark(containers);
            if let Some(items) = containers.as_array_mut() {
                for c in items {
                    container(c, host_network)?;
                }
            }
            listkind::mark_keyed(containers, "name")?;
        }
    }
    if let Some(volumes) = spec.get_mut("volumes") {
        normalize_volumes(volumes)?;
    }
    Ok(())
}

/// `serviceAccount` and `serviceAccountName` are aliases; the server
/// mirrors whichever one is set into the other.
fn mirror_service_account(spec: &mut Value) {
    let account = spec
        .get("serviceAccountName")
        .or_else(|| spec.get("serviceAccount"))
        .cloned();
    if let (Some(account), Some(map)) = (account, spec.as_object_mut()) {
        map.entry("serviceAccount".to_string()).or_insert(account.clone());
        map.entry("serviceAccountName".to_string()).or_insert(account);
    }
}

fn container(c: &mut Value, host_network: bool) -> Result<()> {
    fill(
        c,
        json!({
            "imagePullPolicy": "IfNotPresent",
            "resources": {},
            "securityContext": {"privileged": false, "procMount": "Default"},
            "terminationMessagePath": "/dev/termination-log",
            "terminationMessagePolicy": "File",
            "volumeMounts": []
        }),
    )?;
    if let Some(env) = c.get_mut("env") {
        normalize_env(env)?;
    }
    if let Some(ports) = c.get_mut("ports") {
        normalize_container_ports(ports, host_network)?;
    }
    for probe in &["livenessProbe", "readinessProbe"] {
        if let Some(p) = c.get_mut(*probe) {
            if p.is_object() {
                normalize_probe(p)?;
            }
        }
    }
    if let Some(resources) = c.get_mut("resources") {
        canonicalize_resources(resources)?;
    }
    Ok(())
}

/// Env lists are keyed by variable name; an entry with neither `value`
/// nor `valueFrom` is an empty-string variable.
pub fn normalize_env(env: &mut Value) -> Result<()> {
    listkind::unmark(env);
    if let Some(items) = env.as_array_mut() {
        for e in items {
            if e.is_object() && e.get("value").is_none() && e.get("valueFrom").is_none() {
                fill(e, json!({"value": ""}))?;
            }
        }
    }
    listkind::mark_keyed(env, "name")
}

fn normalize_container_ports(ports: &mut Value, host_network: bool) -> Result<()> {
    listkind::unmark(ports);
    merge_each(ports, &Overlay::from_value(json!({"protocol": "TCP"})), false)?;
    if host_network {
        // on the host network every container port is a host port
        if let Some(items) = ports.as_array_mut() {
            for p in items {
                if p.get("hostPort").is_none() {
                    if let Some(container_port) = p.get("containerPort").cloned() {
                        fill(p, json!({ "hostPort": container_port }))?;
                    }
                }
            }
        }
    }
    listkind::mark_keyed(ports, "containerPort")
}

fn normalize_probe(probe: &mut Value) -> Result<()> {
    fill(
        probe,
        json!({
            "failureThreshold": 3,
            "initialDelaySeconds": 30,
            "periodSeconds": 10,
            "successThreshold": 1
        }),
    )?;
    if probe.get("httpGet").map(Value::is_object).unwrap_or(false) {
        fill(probe, json!({"httpGet": {"scheme": "HTTP"}}))?;
    }
    Ok(())
}

fn normalize_volumes(volumes: &mut Value) -> Result<()> {
    listkind::unmark(volumes);
    if let Some(items) = volumes.as_array_mut() {
        for v in items {
            if v.get("configMap").map(Value::is_object).unwrap_or(false) {
                fill(v, json!({"configMap": {"defaultMode": 0o644}}))?;
            }
            if v.get("secret").map(Value::is_object).unwrap_or(false) {
                fill(v, json!({"secret": {"defaultMode": 0o644}}))?;
            }
            if v.get("hostPath").map(Value::is_object).unwrap_or(false) {
                fill(v, json!({"hostPath": {"type": ""}}))?;
            }
        }
    }
    listkind::mark_keyed(volumes, "name")
}
