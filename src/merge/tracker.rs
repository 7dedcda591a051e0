//! Field ownership tracker for objects without a schema.

use crate::fieldpath::{
    APIVersion, FieldPath, FieldSet, ManagedFieldEntry, ManagedFieldSet, Operation, SerializeError,
};
use crate::value::{self, Object};
use super::{Conflict, Conflicts};
use chrono::{DateTime, SubsecRound, Utc};
use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::{debug, warn};

/// Top-level keys that are never owned by a manager.
pub static SYSTEM_MANAGED_FIELDS: Lazy<FieldSet> = Lazy::new(|| {
    [value::API_VERSION, value::KIND, value::METADATA]
        .into_iter()
        .collect()
});

/// Metadata keys that belong to the server rather than the writer.
const SERVER_METADATA: &[&str] = &[value::MANAGED_FIELDS, value::RESOURCE_VERSION];

/// OwnershipError is returned by the tracker.
#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error("apply failed with {n} conflict(s): {0}", n = .0.len())]
    Conflicts(Conflicts),

    #[error("failed to encode managed fields: {0}")]
    Serialize(#[from] SerializeError),
}

/// FieldOwnershipTracker computes the ownership record that results from a write.
///
/// Implementations never mutate their inputs: the returned object carries the
/// new record and is persisted by the caller in the same store write, so the
/// record is always recomputed from the committed state the caller read.
pub trait FieldOwnershipTracker: Send + Sync {
    /// Returns the fields a payload claims.
    fn compute_field_set(&self, payload: &Object) -> FieldSet;

    /// Full-replace write. Every field in `payload` is reassigned to `manager`;
    /// never reports conflicts.
    fn apply_update(
        &self,
        live: &Object,
        payload: &Object,
        manager: &str,
        version: &APIVersion,
        time: DateTime<Utc>,
    ) -> Result<Object, OwnershipError>;

    /// Partial write merged into `live`. Fields held by another applier are
    /// contested unless `force` is set.
    fn apply_patch(
        &self,
        live: &Object,
        payload: &Object,
        manager: &str,
        version: &APIVersion,
        time: DateTime<Utc>,
        force: bool,
    ) -> Result<Object, OwnershipError>;
}

/// TopLevelFieldManagerBuilder is a builder for creating a TopLevelFieldManager.
#[derive(Debug, Default)]
pub struct TopLevelFieldManagerBuilder {
    ignored_fields: FieldSet,
}

impl TopLevelFieldManagerBuilder {
    pub fn new() -> Self {
        TopLevelFieldManagerBuilder::default()
    }

    /// Excludes additional top-level keys from tracking.
    pub fn ignored_fields(mut self, fields: FieldSet) -> Self {
        self.ignored_fields = self.ignored_fields.union(&fields);
        self
    }

    pub fn build(self) -> TopLevelFieldManager {
        TopLevelFieldManager {
            ignored_fields: SYSTEM_MANAGED_FIELDS.union(&self.ignored_fields),
        }
    }
}

/// TopLevelFieldManager tracks ownership at top-level key granularity.
///
/// Nested documents are owned as a whole, so two managers writing different
/// leaves of the same top-level field contest the entire field.
#[derive(Debug, Clone)]
pub struct TopLevelFieldManager {
    ignored_fields: FieldSet,
}

impl Default for TopLevelFieldManager {
    fn default() -> Self {
        TopLevelFieldManager::builder().build()
    }
}

impl TopLevelFieldManager {
    pub fn builder() -> TopLevelFieldManagerBuilder {
        TopLevelFieldManagerBuilder::new()
    }

    /// Returns the keys excluded from tracking.
    pub fn ignored_fields(&self) -> &FieldSet {
        &self.ignored_fields
    }

    fn read_managers(&self, live: &Object) -> ManagedFieldSet {
        match ManagedFieldSet::from_object(live) {
            Ok(managers) => managers,
            Err(e) => {
                warn!(error = %e, "resetting unreadable managed fields");
                ManagedFieldSet::new()
            }
        }
    }

    /// Drops fields no longer present, removes empty entries and stores the record.
    fn finish(&self, mut obj: Object, mut managers: ManagedFieldSet) -> Result<Object, OwnershipError> {
        managers.retain_fields(&self.compute_field_set(&obj));
        managers.remove_empty();
        managers.write_to(&mut obj)?;
        Ok(obj)
    }
}

/// Copies the writer-supplied metadata of `payload` over `target`'s,
/// leaving server-owned keys alone.
fn merge_metadata(target: &mut Object, payload: &Object) {
    let Some(incoming) = payload.metadata() else {
        return;
    };
    let metadata = target.metadata_mut();
    for (k, v) in incoming {
        if !SERVER_METADATA.contains(&k.as_str()) {
            metadata.insert(k.clone(), v.clone());
        }
    }
}

impl FieldOwnershipTracker for TopLevelFieldManager {
    fn compute_field_set(&self, payload: &Object) -> FieldSet {
        payload
            .keys()
            .map(|k| FieldPath::new(k.as_str()))
            .filter(|p| !self.ignored_fields.has(p))
            .collect()
    }

    fn apply_update(
        &self,
        live: &Object,
        payload: &Object,
        manager: &str,
        version: &APIVersion,
        time: DateTime<Utc>,
    ) -> Result<Object, OwnershipError> {
        let mut managers = self.read_managers(live);
        let new_fields = self.compute_field_set(payload);

        let mut result = payload.clone();
        result.clear_managed_fields();

        managers.release_from_others(manager, &new_fields);
        managers.insert(ManagedFieldEntry {
            manager: manager.to_string(),
            api_version: version.clone(),
            fields: new_fields,
            time: time.trunc_subsecs(0),
            operation: Operation::Update,
        });

        debug!(manager, "recorded update ownership");
        self.finish(result, managers)
    }

    fn apply_patch(
        &self,
        live: &Object,
        payload: &Object,
        manager: &str,
        version: &APIVersion,
        time: DateTime<Utc>,
        force: bool,
    ) -> Result<Object, OwnershipError> {
        let mut managers = self.read_managers(live);
        let new_fields = self.compute_field_set(payload);

        let mut conflicts = Conflicts::new();
        for entry in managers.iter().filter(|e| e.manager != manager && e.applied()) {
            for path in entry.fields.intersection(&new_fields) {
                conflicts.add(Conflict::new(entry.manager.clone(), path));
            }
        }
        if !conflicts.is_empty() {
            if !force {
                return Err(OwnershipError::Conflicts(conflicts));
            }
            debug!(manager, contested = %conflicts.to_set(), "forcing ownership transfer");
        }

        // Merge the payload's top-level fields into the live object.
        let mut merged = live.clone();
        for (key, v) in payload.as_map() {
            if key == value::METADATA {
                continue;
            }
            merged.set(key.clone(), v.clone());
        }
        merge_metadata(&mut merged, payload);

        let previous = managers
            .get(manager)
            .filter(|e| e.applied())
            .map(|e| e.fields.clone())
            .unwrap_or_default();

        managers.release_from_others(manager, &new_fields);
        managers.insert(ManagedFieldEntry {
            manager: manager.to_string(),
            api_version: version.clone(),
            fields: new_fields.clone(),
            time: time.trunc_subsecs(0),
            operation: Operation::Apply,
        });

        // A field this manager stopped applying, and nobody else owns, is removed.
        for path in previous.difference(&new_fields) {
            if managers.owners_of(&path).all(|e| e.manager == manager) {
                debug!(manager, field = %path, "pruning released field");
                merged.remove(path.as_str());
            }
        }

        self.finish(merged, managers)
    }
}

/// Returns the fields of `obj` owned by `manager`, if any.
pub fn owned_fields(obj: &Object, manager: &str) -> Option<FieldSet> {
    ManagedFieldSet::from_object(obj)
        .ok()?
        .get(manager)
        .map(|e| e.fields.clone())
}

/// Returns true if the record on `obj` only names fields that exist on it.
pub fn ownership_is_consistent(obj: &Object) -> bool {
    let Ok(managers) = ManagedFieldSet::from_object(obj) else {
        return false;
    };
    let keys: FieldSet = obj.keys().map(|k| FieldPath::new(k.as_str())).collect();
    managers.all_fields().is_subset(&keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn obj(v: serde_json::Value) -> Object {
        Object::from_value(v).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_compute_field_set_skips_system_keys() {
        let tracker = TopLevelFieldManager::default();
        let payload = obj(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cm"},
            "data": {"k": "v"},
            "binaryData": {},
        }));
        assert_eq!(
            tracker.compute_field_set(&payload),
            ["binaryData", "data"].into_iter().collect()
        );
    }

    #[test]
    fn test_builder_ignored_fields() {
        let tracker = TopLevelFieldManager::builder()
            .ignored_fields(["status"].into_iter().collect())
            .build();
        let payload = obj(json!({"spec": 1, "status": 2}));
        assert_eq!(tracker.compute_field_set(&payload), ["spec"].into_iter().collect());
        assert!(tracker.ignored_fields().has(&FieldPath::new("metadata")));
    }

    #[test]
    fn test_update_simple() {
        let tracker = TopLevelFieldManager::default();
        let live = Object::new();
        let payload = obj(json!({"metadata": {"name": "n"}, "a": 1, "b": 2}));

        let result = tracker
            .apply_update(&live, &payload, "manager1", &APIVersion::new("v1"), t0())
            .unwrap();

        assert_eq!(owned_fields(&result, "manager1"), Some(["a", "b"].into_iter().collect()));
        assert!(ownership_is_consistent(&result));
    }

    #[test]
    fn test_apply_merges_into_live() {
        let tracker = TopLevelFieldManager::default();
        let live = obj(json!({"metadata": {"name": "n", "resourceVersion": "7"}, "a": 1}));
        let config = obj(json!({"metadata": {"name": "n", "labels": {"x": "y"}}, "b": 2}));

        let result = tracker
            .apply_patch(&live, &config, "m", &APIVersion::new("v1"), t0(), false)
            .unwrap();

        assert_eq!(result.get("a"), Some(&json!(1)));
        assert_eq!(result.get("b"), Some(&json!(2)));
        assert_eq!(result.resource_version(), Some("7"));
        assert_eq!(result.metadata().unwrap().get("labels"), Some(&json!({"x": "y"})));
        assert_eq!(owned_fields(&result, "m"), Some(["b"].into_iter().collect()));
    }

    #[test]
    fn test_apply_ignores_payload_managed_fields() {
        let tracker = TopLevelFieldManager::default();
        let config = obj(json!({
            "metadata": {"managedFields": [{"manager": "forged", "operation": "Apply",
                "time": "2024-01-01T00:00:00Z", "fieldsType": "FieldsV1", "fieldsV1": {"f:a": {}}}]},
            "a": 1,
        }));

        let result = tracker
            .apply_patch(&Object::new(), &config, "real", &APIVersion::new("v1"), t0(), false)
            .unwrap();

        let managers = ManagedFieldSet::from_object(&result).unwrap();
        assert_eq!(managers.managers().collect::<Vec<_>>(), vec!["real"]);
    }

    #[test]
    fn test_unreadable_live_record_is_reset() {
        let tracker = TopLevelFieldManager::default();
        let live = obj(json!({"metadata": {"managedFields": "garbage"}, "a": 1}));
        let result = tracker
            .apply_patch(&live, &obj(json!({"a": 2})), "m", &APIVersion::new("v1"), t0(), false)
            .unwrap();
        assert_eq!(owned_fields(&result, "m"), Some(["a"].into_iter().collect()));
    }
}
