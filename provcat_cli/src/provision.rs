use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use uuid::Uuid;

use provcat_definitions::adopt::adopt;
use provcat_definitions::diff::{diff, PatchOp};
use provcat_definitions::listkind;
use provcat_definitions::normalize::normalize_in;
use provcat_definitions::resource;

use crate::oc::Oc;
use crate::{Error, Result};

const LAST_APPLIED: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// What to do with the desired resource
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Apply,
    Create,
    Replace,
    Patch,
    Delete,
    Ignore,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Action::Apply => "apply",
            Action::Create => "create",
            Action::Replace => "replace",
            Action::Patch => "patch",
            Action::Delete => "delete",
            Action::Ignore => "ignore",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Action {
    type Err = Error;
    fn from_str(s: &str) -> Result<Action> {
        match s {
            "apply" => Ok(Action::Apply),
            "create" => Ok(Action::Create),
            "replace" => Ok(Action::Replace),
            "patch" => Ok(Action::Patch),
            "delete" => Ok(Action::Delete),
            "ignore" => Ok(Action::Ignore),
            _ => bail!("unknown action '{}'", s),
        }
    }
}

/// Patch strategy handed to the CLI for `patch` actions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchType {
    Strategic,
    Json,
    Merge,
}

impl fmt::Display for PatchType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            PatchType::Strategic => "strategic",
            PatchType::Json => "json",
            PatchType::Merge => "merge",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for PatchType {
    type Err = Error;
    fn from_str(s: &str) -> Result<PatchType> {
        match s {
            "strategic" => Ok(PatchType::Strategic),
            "json" => Ok(PatchType::Json),
            "merge" => Ok(PatchType::Merge),
            _ => bail!("unknown patch type '{}'", s),
        }
    }
}

/// One reconciliation request
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub action: Action,
    pub patch_type: PatchType,
    pub namespace: Option<String>,
    pub resource: Value,
    pub fail_on_change: bool,
    pub check_mode: bool,
    pub generate_resources: bool,
}

impl ProvisionRequest {
    pub fn new(resource: Value) -> ProvisionRequest {
        ProvisionRequest {
            action: Action::Apply,
            patch_type: PatchType::Strategic,
            namespace: None,
            resource,
            fail_on_change: false,
            check_mode: false,
            generate_resources: false,
        }
    }
}

/// The outcome of one reconciliation
#[derive(Debug, Serialize)]
pub struct ProvisionResult {
    /// Possibly rewritten (apply can become replace, replace create)
    pub action: Action,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Vec<PatchOp>>,
    /// Observed state when nothing changed, the mutated document otherwise
    pub resource: Value,
}

/// Raised under fail_on_change whenever the engine would have mutated
#[derive(Debug, Fail)]
#[fail(display = "{} {} would change on {}", kind, name, action)]
pub struct DriftExpected {
    pub kind: String,
    pub name: String,
    pub action: String,
    /// json-serialized patch, for assertions in test plays
    pub patch: String,
}

#[derive(Debug, Fail)]
#[fail(display = "no {} named {} to patch", _0, _1)]
pub struct NotFoundForPatch(String, String);

/// Reconcile one resource against the cluster
pub fn provision(oc: &Oc, req: &ProvisionRequest) -> Result<ProvisionResult> {
    resource::validate(&req.resource)?;
    let mut desired = req.resource.clone();
    let kind = resource::kind(&desired).to_string();
    let name = resource::name(&desired).to_string();
    // a namespace in the document wins over the request parameter
    let namespace: Option<String> = resource::namespace(&desired)
        .map(String::from)
        .or_else(|| req.namespace.clone());
    let ns = namespace.as_ref().map(String::as_str);
    let mut action = req.action;

    if action == Action::Ignore {
        return Ok(ProvisionResult { action, changed: false, patch: None, resource: desired });
    }

    let mut observed = oc.get(&kind, &name, ns)?;

    // pop the server bookkeeping apply will want re-attached
    let mut resource_version = None;
    let mut last_applied = None;
    if let Some(ref mut obs) = observed {
        if let Some(md) = obs.get_mut("metadata").and_then(Value::as_object_mut) {
            resource_version = md.remove("resourceVersion");
        }
        if let Some(ann) = obs
            .pointer_mut("/metadata/annotations")
            .and_then(Value::as_object_mut)
        {
            last_applied = ann.remove(LAST_APPLIED);
        }
    }

    if action == Action::Apply || action == Action::Replace {
        if let Some(ref obs) = observed {
            adopt(&mut desired, obs)?;
        }
    }

    // generate-only mode serializes the adopted document and stops; one
    // file per call, mutation never
    if req.generate_resources {
        let written = write_manifest(Path::new("manifests"), &desired, ns)?;
        info!("wrote {}", written.display());
        return Ok(ProvisionResult { action, changed: false, patch: None, resource: desired });
    }

    let mut patch_ops: Option<Vec<PatchOp>> = None;
    let mut save_config = false;

    if action == Action::Create {
        if let Some(obs) = observed {
            debug!("{} {} already exists", kind, name);
            return Ok(ProvisionResult { action, changed: false, patch: None, resource: obs });
        }
    } else if action == Action::Apply || action == Action::Replace {
        match observed {
            Some(ref obs) => {
                let normalized_observed = normalize_in(obs, ns)?;
                let normalized_desired = normalize_in(&desired, ns)?;
                let ops = diff(&normalized_observed, &normalized_desired, &kind);
                if ops.is_empty() {
                    debug!("{} {} is up to date", kind, name);
                    return Ok(ProvisionResult {
                        action,
                        changed: false,
                        patch: None,
                        resource: obs.clone(),
                    });
                }
                if action == Action::Apply {
                    if drifted_from_last_applied(&normalized_observed, &last_applied, ns, &kind)? {
                        info!(
                            "{} {} drifted from its last applied configuration, replacing",
                            kind, name
                        );
                        action = Action::Replace;
                        save_config = true;
                    }
                }
                patch_ops = Some(ops);
            }
            None => {
                if action == Action::Replace {
                    action = Action::Create;
                }
            }
        }
    } else if action == Action::Patch {
        match observed {
            Some(ref obs) => {
                let ops = simulate_patch(oc, obs, &desired, req.patch_type, ns, &kind)?;
                if ops.is_empty() {
                    debug!("patch for {} {} is a no-op", kind, name);
                    return Ok(ProvisionResult {
                        action,
                        changed: false,
                        patch: None,
                        resource: obs.clone(),
                    });
                }
                patch_ops = Some(ops);
            }
            None => return Err(NotFoundForPatch(kind, name).into()),
        }
    } else if action == Action::Delete {
        if observed.is_none() {
            return Ok(ProvisionResult { action, changed: false, patch: None, resource: desired });
        }
    }

    // past this point a mutation is certain
    if req.fail_on_change {
        return Err(DriftExpected {
            kind,
            name,
            action: action.to_string(),
            patch: serde_json::to_string(&patch_ops)?,
        }
        .into());
    }
    if req.check_mode {
        return Ok(ProvisionResult { action, changed: true, patch: patch_ops, resource: desired });
    }

    mutate(
        oc,
        action,
        &desired,
        ns,
        req.patch_type,
        save_config,
        resource_version,
        last_applied,
    )?;
    info!("{} {} {}", action, kind, name);
    Ok(ProvisionResult { action, changed: true, patch: patch_ops, resource: desired })
}

/// Whether the cluster state no longer matches what was last applied
///
/// When it does not, a plain apply would three-way-merge against a stale
/// base; the caller switches to replace with --save-config instead.
fn drifted_from_last_applied(
    normalized_observed: &Value,
    last_applied: &Option<Value>,
    ns: Option<&str>,
    kind: &str,
) -> Result<bool> {
    let raw = match last_applied.as_ref().and_then(Value::as_str) {
        Some(raw) => raw,
        None => return Ok(false),
    };
    let last: Value = match serde_json::from_str(raw) {
        Ok(last) => last,
        Err(e) => {
            warn!("unparseable last-applied-configuration annotation: {}", e);
            return Ok(false);
        }
    };
    if resource::validate(&last).is_err() {
        return Ok(false);
    }
    let normalized_last = normalize_in(&last, ns)?;
    Ok(!diff(normalized_observed, &normalized_last, kind).is_empty())
}

/// Ask the CLI to compute the patched document without touching the
/// cluster, then diff the observed state against the simulation.
fn simulate_patch(
    oc: &Oc,
    observed: &Value,
    patch_body: &Value,
    patch_type: PatchType,
    ns: Option<&str>,
    kind: &str,
) -> Result<Vec<PatchOp>> {
    let scratch = std::env::temp_dir().join(format!("provcat-{}.json", Uuid::new_v4()));
    let result = simulate_patch_inner(oc, observed, patch_body, patch_type, ns, kind, &scratch);
    if scratch.exists() {
        if let Err(e) = fs::remove_file(&scratch) {
            warn!("could not remove scratch file {}: {}", scratch.display(), e);
        }
    }
    result
}

fn simulate_patch_inner(
    oc: &Oc,
    observed: &Value,
    patch_body: &Value,
    patch_type: PatchType,
    ns: Option<&str>,
    kind: &str,
    scratch: &Path,
) -> Result<Vec<PatchOp>> {
    fs::write(scratch, serde_json::to_string(observed)?)?;
    let args: Vec<String> = vec![
        "patch".into(),
        "--local".into(),
        format!("--filename={}", scratch.display()),
        format!("--patch={}", serde_json::to_string(patch_body)?),
        format!("--type={}", patch_type),
        "-o".into(),
        "json".into(),
    ];
    let stdout = oc.run_checked(&args, None)?;
    let simulated: Value = serde_json::from_str(&stdout)?;
    let normalized_observed = normalize_in(observed, ns)?;
    let normalized_simulated = normalize_in(&simulated, ns)?;
    Ok(diff(&normalized_observed, &normalized_simulated, kind))
}

/// Serialize the desired document into the manifests directory
fn write_manifest(dir: &Path, desired: &Value, namespace: Option<&str>) -> Result<PathBuf> {
    let scope = namespace.unwrap_or("cluster");
    fs::create_dir_all(dir)?;
    let file = dir.join(format!(
        "{}_{}_{}.json",
        scope,
        resource::kind(desired),
        resource::name(desired)
    ));
    // write-then-rename so readers never see a torn document
    let staging = file.with_extension("json.part");
    fs::write(&staging, serde_json::to_string_pretty(&listkind::strip(desired))?)?;
    fs::rename(&staging, &file)?;
    Ok(file)
}

fn mutate(
    oc: &Oc,
    action: Action,
    desired: &Value,
    ns: Option<&str>,
    patch_type: PatchType,
    save_config: bool,
    resource_version: Option<Value>,
    last_applied: Option<Value>,
) -> Result<()> {
    if action == Action::Delete {
        let mut args: Vec<String> = vec![
            "delete".into(),
            resource::kind(desired).into(),
            resource::name(desired).into(),
        ];
        push_namespace(&mut args, ns);
        oc.run_checked(&args, None)?;
        return Ok(());
    }

    let mut payload = desired.clone();
    if action == Action::Apply {
        // keep the api server's three-way merge base consistent
        if let Some(rv) = resource_version {
            if let Some(md) = payload.get_mut("metadata").and_then(Value::as_object_mut) {
                md.insert("resourceVersion".to_string(), rv);
            }
        }
        if let Some(la) = last_applied {
            if payload.pointer("/metadata/annotations").is_none() {
                if let Some(md) = payload.get_mut("metadata").and_then(Value::as_object_mut) {
                    md.insert("annotations".to_string(), json!({}));
                }
            }
            if let Some(ann) = payload
                .pointer_mut("/metadata/annotations")
                .and_then(Value::as_object_mut)
            {
                ann.insert(LAST_APPLIED.to_string(), la);
            }
        }
    }

    let mut args: Vec<String> = vec![action.to_string(), "-f".into(), "-".into()];
    if action == Action::Patch {
        args.push(format!("--patch={}", serde_json::to_string(&payload)?));
        args.push(format!("--type={}", patch_type));
    }
    if save_config {
        args.push("--save-config".into());
    }
    push_namespace(&mut args, ns);
    oc.run_checked(&args, Some(&serde_json::to_string(&payload)?))?;
    Ok(())
}

fn push_namespace(args: &mut Vec<String>, ns: Option<&str>) {
    if let Some(ns) = ns {
        args.push("-n".into());
        args.push(ns.into());
    }
}
