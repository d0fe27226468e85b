/// Append-only change-record emission.
///
/// Each change is one yaml document in an append-only stream, so a whole
/// provisioning run can be replayed or audited afterwards. Secret bodies
/// never reach the record.
use std::fs::OpenOptions;
use std::io::Write;

use regex::Regex;
use serde_json::Value;

use provcat_definitions::listkind;
use provcat_definitions::resource;

use crate::provision::ProvisionResult;
use crate::Result;

// connection options recognized by kubectl/oc; values may carry credentials
const CONNECTION_OPTS: &[&str] = &[
    "as",
    "as-group",
    "certificate-authority",
    "client-certificate",
    "client-key",
    "cluster",
    "config",
    "context",
    "insecure-skip-tls-verify",
    "kubeconfig",
    "match-server-version",
    "request-timeout",
    "server",
    "token",
    "user",
];

/// Drop connection options from a recorded command line
pub fn connection_stripped(cmd: &[String]) -> Vec<String> {
    let opt = Regex::new(r"^--([a-z-]+)=").unwrap();
    cmd.iter()
        .filter(|arg| {
            match opt.captures(arg) {
                Some(caps) => !CONNECTION_OPTS.contains(&&caps[1]),
                None => true,
            }
        })
        .cloned()
        .collect()
}

/// The yaml document recorded for one provision outcome
pub fn provision_record(result: &ProvisionResult) -> Result<Value> {
    let kind = resource::kind(&result.resource).to_string();
    let mut record = json!({
        "action": result.action,
        "kind": kind,
        "name": resource::name(&result.resource),
    });
    if let Some(ns) = resource::namespace(&result.resource) {
        record["namespace"] = json!(ns);
    }
    // secret contents stay out of the audit trail
    if kind != "Secret" {
        match result.patch {
            Some(ref patch) => record["patch"] = serde_json::to_value(patch)?,
            None => record["resource"] = listkind::strip(&result.resource),
        }
    }
    Ok(record)
}

/// Append one provision outcome to the change record, if it changed
pub fn record_provision(path: &str, result: &ProvisionResult) -> Result<()> {
    if !result.changed {
        return Ok(());
    }
    append(path, &provision_record(result)?)
}

/// Append an arbitrary command invocation to the change record
pub fn record_command(path: &str, cmd: &[String]) -> Result<()> {
    let record = json!({
        "action": "command",
        "command": connection_stripped(cmd),
    });
    append(path, &record)
}

fn append(path: &str, record: &Value) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    // serde_yaml starts every document with an explicit ---
    file.write_all(serde_yaml::to_string(record)?.as_bytes())?;
    file.write_all(b"\n")?;
    debug!("recorded change to {}", path);
    Ok(())
}
