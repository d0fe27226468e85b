/// Normalizers for PersistentVolume and PersistentVolumeClaim.
use serde_json::Value;

use super::{blank_annotation, blank_status, fill, force, Ctx};
use crate::Result;

pub fn persistentvolume(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    fill(
        res,
        json!({
            "metadata": {"finalizers": ["kubernetes.io/pv-protection"]},
            "spec": {"persistentVolumeReclaimPolicy": "Retain"}
        }),
    )?;
    blank_annotation(res, "pv.kubernetes.io/bound-by-controller")?;
    force(res, json!({"spec": {"claimRef": ""}}))?;
    blank_status(res)
}

pub fn persistentvolumeclaim(res: &mut Value, _ctx: &Ctx) -> Result<()> {
    fill(
        res,
        json!({"metadata": {"finalizers": ["kubernetes.io/pvc-protection"]}}),
    )?;
    for annotation in &[
        "pv.kubernetes.io/bind-completed",
        "pv.kubernetes.io/bound-by-controller",
        "volume.beta.kubernetes.io/storage-provisioner",
    ] {
        blank_annotation(res, annotation)?;
    }
    claim_rules(res)
}

/// The claim-body subset shared with StatefulSet volumeClaimTemplates
pub fn claim_rules(claim: &mut Value) -> Result<()> {
    fill(claim, json!({"spec": {"dataSource": null}}))?;
    force(claim, json!({"spec": {"volumeName": ""}}))?;
    blank_status(claim)
}
