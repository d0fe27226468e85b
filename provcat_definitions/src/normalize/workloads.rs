/// Normalizers for the workload kinds.
use serde_json::Value;

use super::pod;
use super::{blank_annotation, blank_status, fill, force, Ctx};
use crate::Result;

fn template_at(res: &mut Value) -> Result<()> {
    if let Some(template) = res.pointer_mut("/spec/template") {
        if template.is_object() {
            pod::pod_template(template)?;
        }
    }
    Ok(())
}

pub fn buildconfig(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    fill(
        res,
        json!({
            "spec": {
                "resources": {},
                "runPolicy": "Serial",
                "source": {"contextDir": "", "git": {"ref": ""}},
                "triggers": [{"imageChange": {}}]
            }
        }),
    )?;
    blank_annotation(res, "template.alpha.openshift.io/wait-for-ready")?;
    if let Some(strategy) = res.pointer_mut("/spec/strategy") {
        for sub in &[
            "customStrategy",
            "dockerStrategy",
            "jenkinsPipelineStrategy",
            "sourceStrategy",
        ] {
            if let Some(s) = strategy.get_mut(*sub) {
                if !s.is_object() {
                    continue;
                }
                if s.get("from").map(Value::is_object).unwrap_or(false) {
                    fill(s, json!({"from": {"namespace": ""}}))?;
                }
                if let Some(env) = s.get_mut("env") {
                    pod::normalize_env(env)?;
                }
            }
        }
    }
    Ok(())
}

pub fn cronjob(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    if let Some(job_template) = res.pointer_mut("/spec/jobTemplate") {
        force(job_template, json!({"metadata": {"creationTimestamp": ""}}))?;
        if let Some(template) = job_template.pointer_mut("/spec/template") {
            pod::pod_template(template)?;
        }
    }
    blank_status(res)
}

pub fn daemonset(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    fill(res, json!({"spec": {"revisionHistoryLimit": 10}}))?;
    template_at(res)?;
    blank_status(res)
}

pub fn deployment(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    fill(
        res,
        json!({"spec": {"progressDeadlineSeconds": 600, "revisionHistoryLimit": 10}}),
    )?;
    blank_annotation(res, "deployment.kubernetes.io/revision")?;
    template_at(res)?;
    blank_status(res)
}

pub fn deploymentconfig(res: &mut Value, ctx: &Ctx) -> Result<()> {
    fill(
        res,
        json!({
            "spec": {
                "revisionHistoryLimit": 10,
                "strategy": {
                    "activeDeadlineSeconds": 21600,
                    "recreateParams": {"timeoutSeconds": 600},
                    "resources": {}
                },
                "test": false,
                "triggers": [{"type": "ConfigChange"}]
            }
        }),
    )?;

    // the deployment controller owns the image of any container named in
    // an ImageChange trigger, so those images never participate in the
    // comparison
    let mut image_change_containers: Vec<String> = Vec::new();
    if let Some(triggers) = res.pointer_mut("/spec/triggers").and_then(Value::as_array_mut) {
        for trigger in triggers {
            if trigger.get("type").and_then(Value::as_str) != Some("ImageChange") {
                continue;
            }
            if let Some(params) = trigger.get_mut("imageChangeParams") {
                fill(params, json!({"from": {"namespace": ctx.namespace}}))?;
                force(params, json!({"lastTriggeredImage": ""}))?;
                if let Some(names) = params.get("containerNames").and_then(Value::as_array) {
                    for name in names {
                        if let Some(s) = name.as_str() {
                            image_change_containers.push(s.to_string());
                        }
                    }
                }
            }
        }
    }
    if let Some(containers) = res
        .pointer_mut("/spec/template/spec/containers")
        .and_then(Value::as_array_mut)
    {
        for container in containers {
            let name = container.get("name").and_then(Value::as_str).unwrap_or("");
            if image_change_containers.iter().any(|n| n == name) {
                force(container, json!({"image": ""}))?;
            }
        }
    }
    template_at(res)
}

pub fn horizontalpodautoscaler(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    blank_annotation(res, "autoscaling.alpha.kubernetes.io/conditions")?;
    blank_status(res)
}

pub fn imagestream(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    fill(
        res,
        json!({"spec": {"dockerImageRepository": "", "lookupPolicy": {"local": false}}}),
    )?;
    blank_annotation(res, "openshift.io/image.dockerRepositoryCheck")?;
    if let Some(tags) = res.pointer_mut("/spec/tags").and_then(Value::as_array_mut) {
        for tag in tags {
            fill(tag, json!({"referencePolicy": {"type": "Source"}}))?;
            force(tag, json!({"generation": 0}))?;
        }
    }
    Ok(())
}

pub fn job(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    template_at(res)?;
    blank_status(res)
}

pub fn replicaset(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    template_at(res)?;
    blank_status(res)
}

pub fn statefulset(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    fill(res, json!({"spec": {"replicas": 1, "revisionHistoryLimit": 10}}))?;
    template_at(res)?;
    if let Some(claims) = res
        .pointer_mut("/spec/volumeClaimTemplates")
        .and_then(Value::as_array_mut)
    {
        for claim in claims {
            force(claim, json!({"metadata": {"creationTimestamp": ""}}))?;
            super::storage::claim_rules(claim)?;
        }
    }
    blank_status(res)
}
