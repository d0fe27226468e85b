/// Normalizers for Service, Route and NetworkPolicy.
use serde_json::Value;

use super::{blank_annotation, blank_status, fill, force, Ctx};
use crate::listkind;
use crate::merge::{merge, merge_each, Overlay};
use crate::resource;
use crate::Result;

const SERVING_CERT_SECRET: &str = "service.alpha.openshift.io/serving-cert-secret-name";
const SERVING_CERT_SIGNED_BY: &str = "service.alpha.openshift.io/serving-cert-signed-by";

pub fn service(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    fill(
        res,
        json!({"spec": {"sessionAffinity": "None", "type": "ClusterIP"}}),
    )?;
    let ports = Overlay::map().insert(
        "spec",
        Overlay::map().insert("ports", Overlay::with(service_ports)),
    );
    merge(res, &ports, true)?;
    if res.pointer("/spec/sessionAffinity") == Some(&json!("ClientIP")) {
        fill(
            res,
            json!({"spec": {"sessionAffinityConfig": {"clientIP": {"timeoutSeconds": 10800}}}}),
        )?;
    }
    if resource::annotation(res, SERVING_CERT_SECRET).is_some() {
        blank_annotation(res, SERVING_CERT_SIGNED_BY)?;
    }
    blank_status(res)
}

fn service_ports(existing: Option<&Value>) -> Result<Value> {
    let mut ports = match existing {
        Some(p) if p.is_array() => p.clone(),
        _ => return Ok(Value::Null),
    };
    listkind::unmark(&mut ports);
    merge_each(&mut ports, &Overlay::from_value(json!({"protocol": "TCP"})), false)?;
    listkind::mark_keyed(&mut ports, "port")?;
    Ok(ports)
}

pub fn route(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    fill(res, json!({"spec": {"wildcardPolicy": "None"}}))?;
    if res.pointer("/spec/to").map(Value::is_object).unwrap_or(false) {
        fill(res, json!({"spec": {"to": {"weight": 100}}}))?;
    }

    // a generated host is server state; compare the "please generate"
    // request on both sides instead of the assigned name
    let generated = resource::annotation(res, "openshift.io/host.generated") == Some("true");
    let host_unset = res
        .pointer("/spec/host")
        .and_then(Value::as_str)
        .map(str::is_empty)
        .unwrap_or(true);
    if host_unset || generated {
        force(
            res,
            json!({
                "metadata": {"annotations": {"openshift.io/host.generated": "true"}},
                "spec": {"host": ""}
            }),
        )?;
    }
    blank_status(res)
}

pub fn networkpolicy(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    fill(
        res,
        json!({"spec": {"podSelector": {}, "policyTypes": ["Ingress"]}}),
    )?;
    // declaring egress rules implies the Egress policy type
    let has_egress = res
        .pointer("/spec/egress")
        .map(Value::is_array)
        .unwrap_or(false);
    if has_egress {
        if let Some(types) = res.pointer_mut("/spec/policyTypes").and_then(Value::as_array_mut) {
            if !types.iter().any(|t| t == &json!("Egress")) {
                types.push(json!("Egress"));
            }
        }
    }

    for (direction, peer_key) in &[("ingress", "from"), ("egress", "to")] {
        let path = format!("/spec/{}", direction);
        if let Some(rules) = res.pointer_mut(&path).and_then(Value::as_array_mut) {
            for rule in rules {
                if let Some(ports) = rule.get_mut("ports") {
                    if ports.is_array() {
                        listkind::unmark(ports);
                        merge_each(ports, &Overlay::from_value(json!({"protocol": "TCP"})), false)?;
                        listkind::mark_set(ports)?;
                    }
                }
                if let Some(peers) = rule.get_mut(*peer_key) {
                    if peers.is_array() {
                        listkind::mark_set(peers)?;
                    }
                }
            }
        }
    }
    if let Some(types) = res.pointer_mut("/spec/policyTypes") {
        if types.is_array() {
            listkind::mark_set(types)?;
        }
    }
    Ok(())
}
