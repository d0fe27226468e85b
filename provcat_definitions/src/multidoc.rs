/// Splitting a yaml stream into a flat list of resource documents.
use serde_json::Value;

use super::Result;

/// Parse a multi-document yaml stream into resource documents
///
/// Empty documents are dropped and `kind: List` wrappers are flattened
/// into their items, so callers always see one document per resource.
pub fn resource_list(input: &str) -> Result<Vec<Value>> {
    let mut resources = Vec::new();
    for doc in input.split("\n---") {
        let doc = doc.trim();
        if doc.is_empty() || doc == "---" {
            continue;
        }
        let parsed: Value = serde_yaml::from_str(doc)?;
        if parsed.is_null() {
            continue;
        }
        if parsed.get("kind").and_then(Value::as_str) == Some("List") {
            if let Some(items) = parsed.get("items").and_then(Value::as_array) {
                resources.extend(items.iter().cloned());
            }
        } else {
            resources.push(parsed);
        }
    }
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::resource_list;

    #[test]
    fn splits_documents_and_flattens_lists() {
        let input = r#"---
kind: ConfigMap
metadata:
  name: one
---
kind: List
items:
- kind: Secret
  metadata:
    name: two
- kind: Service
  metadata:
    name: three
---
"#;
        let docs = resource_list(input).unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0]["kind"], json!("ConfigMap"));
        assert_eq!(docs[1]["metadata"]["name"], json!("two"));
        assert_eq!(docs[2]["kind"], json!("Service"));
    }

    #[test]
    fn empty_documents_are_dropped() {
        let docs = resource_list("---\n\n---\nkind: ConfigMap\nmetadata:\n  name: c\n").unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(resource_list("kind: [unclosed\n").is_err());
    }
}
