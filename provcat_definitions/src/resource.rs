use serde_json::Value;

use super::Result;

/// A resource document as handed over the wire.
///
/// Resources stay dynamic trees rather than typed structs: the engine has
/// to carry arbitrary kinds (including CRDs it has never heard of) through
/// normalization without dropping unknown fields.
pub type Resource = Value;

/// Resource kind, or "" when missing
pub fn kind(resource: &Resource) -> &str {
    resource.get("kind").and_then(Value::as_str).unwrap_or("")
}

/// Resource name from metadata, or "" when missing
pub fn name(resource: &Resource) -> &str {
    resource
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// Namespace from metadata, when the document carries one
pub fn namespace(resource: &Resource) -> Option<&str> {
    resource
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .filter(|ns| !ns.is_empty())
}

/// Annotation lookup by full key
pub fn annotation<'a>(resource: &'a Resource, key: &str) -> Option<&'a str> {
    resource
        .pointer("/metadata/annotations")
        .and_then(|a| a.get(key))
        .and_then(Value::as_str)
}

/// Verify the request-boundary invariants before any engine work
///
/// Everything downstream (normalization, diffing, mutation) assumes these
/// hold, so they are checked exactly once at the edge.
pub fn validate(resource: &Resource) -> Result<()> {
    if !resource.is_object() {
        bail!("resource must be a mapping");
    }
    if kind(resource).is_empty() {
        bail!("resource must define kind");
    }
    match resource.get("metadata") {
        None => bail!("resource must include metadata"),
        Some(md) if !md.is_object() => bail!("resource metadata must be a mapping"),
        Some(_) => {}
    }
    if name(resource).is_empty() {
        bail!("resource metadata must include name");
    }
    Ok(())
}
