//! Failure responses encoded as `Status` objects.

use crate::error::ScopeError;
use crate::value::Object;
use serde_json::{json, Map, Value};

pub const STATUS_KIND: &str = "Status";
pub const STATUS_API_VERSION: &str = "v1";

/// Cause type reported for each contested field.
pub const CAUSE_FIELD_MANAGER_CONFLICT: &str = "FieldManagerConflict";

/// Builds the `Status` object describing `err`.
pub fn status_object(err: &ScopeError) -> Object {
    let class = err.status();

    let mut details = Map::new();
    if let Some(conflicts) = err.conflicts() {
        let causes: Vec<Value> = conflicts
            .iter()
            .map(|c| {
                json!({
                    "type": CAUSE_FIELD_MANAGER_CONFLICT,
                    "message": format!("conflict with {:?}", c.manager),
                    "field": c.path.to_string(),
                })
            })
            .collect();
        details.insert("causes".to_string(), Value::Array(causes));
    }
    if let Some(retry) = err.retry_after() {
        details.insert("retryAfterSeconds".to_string(), json!(retry.as_secs()));
    }

    let mut status = Map::new();
    status.insert("apiVersion".to_string(), json!(STATUS_API_VERSION));
    status.insert("kind".to_string(), json!(STATUS_KIND));
    status.insert("metadata".to_string(), json!({}));
    status.insert("status".to_string(), json!("Failure"));
    status.insert("message".to_string(), json!(err.to_string()));
    status.insert("reason".to_string(), json!(class.reason()));
    status.insert("code".to_string(), json!(class.code()));
    if !details.is_empty() {
        status.insert("details".to_string(), Value::Object(details));
    }
    Object::from_map(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldpath::FieldPath;
    use crate::merge::{Conflict, Conflicts};
    use crate::store::StoreError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_field_conflict_status() {
        let mut conflicts = Conflicts::new();
        conflicts.add(Conflict::new("kubectl", FieldPath::new("spec")));
        let status = status_object(&ScopeError::FieldConflict(conflicts));

        assert_eq!(status.kind(), Some("Status"));
        assert_eq!(status.get("code"), Some(&json!(409)));
        assert_eq!(status.get("reason"), Some(&json!("Conflict")));
        assert_eq!(
            status.get("details"),
            Some(&json!({"causes": [{
                "type": "FieldManagerConflict",
                "message": "conflict with \"kubectl\"",
                "field": ".spec",
            }]}))
        );
    }

    #[test]
    fn test_version_conflict_status_carries_retry() {
        let status = status_object(&ScopeError::Store(StoreError::VersionConflict {
            name: "ns/x".to_string(),
            expected: Some(1),
            actual: Some(2),
        }));
        assert_eq!(status.get("details"), Some(&json!({"retryAfterSeconds": 1})));
    }

    #[test]
    fn test_plain_status_has_no_details() {
        let status = status_object(&ScopeError::PayloadTooLarge { size: 10, limit: 5 });
        assert_eq!(status.get("code"), Some(&json!(413)));
        assert_eq!(status.get("reason"), Some(&json!("RequestEntityTooLarge")));
        assert!(status.get("details").is_none());
    }
}
