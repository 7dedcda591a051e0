//! Field path module - Records which manager owns which top-level fields.
//!
//! An object's ownership record is a [`ManagedFieldSet`]: one
//! [`ManagedFieldEntry`] per manager, stored under `metadata.managedFields`.

mod path;
mod serialize;
mod set;

pub use path::*;
pub use serialize::*;
pub use set::*;

use crate::value::Object;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// APIVersion represents a version string for field ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct APIVersion(String);

impl APIVersion {
    /// Creates a new APIVersion.
    pub fn new(version: impl Into<String>) -> Self {
        APIVersion(version.into())
    }

    /// Returns the version string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for APIVersion {
    fn from(s: &str) -> Self {
        APIVersion(s.to_string())
    }
}

impl From<String> for APIVersion {
    fn from(s: String) -> Self {
        APIVersion(s)
    }
}

impl fmt::Display for APIVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation is the kind of write that produced an ownership claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Apply,
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Apply => write!(f, "Apply"),
            Operation::Update => write!(f, "Update"),
        }
    }
}

/// ManagedFieldEntry is the latest claim one manager made over an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedFieldEntry {
    pub manager: String,
    pub api_version: APIVersion,
    pub fields: FieldSet,
    pub time: DateTime<Utc>,
    pub operation: Operation,
}

impl ManagedFieldEntry {
    /// Returns true if this claim came from an Apply.
    pub fn applied(&self) -> bool {
        self.operation == Operation::Apply
    }
}

/// ManagedFieldSet tracks what each manager owns.
///
/// Entries keep their insertion order; a manager appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedFieldSet {
    entries: Vec<ManagedFieldEntry>,
}

impl ManagedFieldSet {
    /// Creates a new empty ManagedFieldSet.
    pub fn new() -> Self {
        ManagedFieldSet {
            entries: Vec::new(),
        }
    }

    /// Reads the ownership record attached to an object.
    ///
    /// An object without a record yields an empty set.
    pub fn from_object(obj: &Object) -> Result<ManagedFieldSet, SerializeError> {
        match obj.managed_fields_raw() {
            None | Some(serde_json::Value::Null) => Ok(ManagedFieldSet::new()),
            Some(raw) => ManagedFieldSet::from_value(raw),
        }
    }

    /// Stores this record on the object, dropping the key when empty.
    pub fn write_to(&self, obj: &mut Object) -> Result<(), SerializeError> {
        if self.is_empty() {
            obj.clear_managed_fields();
        } else {
            obj.set_managed_fields_raw(self.to_value()?);
        }
        Ok(())
    }

    /// Returns the number of managers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Gets the entry for a manager.
    pub fn get(&self, manager: &str) -> Option<&ManagedFieldEntry> {
        self.entries.iter().find(|e| e.manager == manager)
    }

    /// Inserts an entry, replacing any prior entry from the same manager in place.
    pub fn insert(&mut self, entry: ManagedFieldEntry) {
        match self.entries.iter_mut().find(|e| e.manager == entry.manager) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Removes a manager's entry.
    pub fn remove(&mut self, manager: &str) -> Option<ManagedFieldEntry> {
        let pos = self.entries.iter().position(|e| e.manager == manager)?;
        Some(self.entries.remove(pos))
    }

    pub fn contains(&self, manager: &str) -> bool {
        self.get(manager).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedFieldEntry> {
        self.entries.iter()
    }

    /// Returns an iterator over manager names.
    pub fn managers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.manager.as_str())
    }

    /// Returns the entries that claim the given field.
    pub fn owners_of<'a>(
        &'a self,
        path: &'a FieldPath,
    ) -> impl Iterator<Item = &'a ManagedFieldEntry> + 'a {
        self.entries.iter().filter(move |e| e.fields.has(path))
    }

    /// Returns every field claimed by any manager.
    pub fn all_fields(&self) -> FieldSet {
        self.entries
            .iter()
            .fold(FieldSet::new(), |acc, e| acc.union(&e.fields))
    }

    /// Removes the given fields from every entry except `keep`'s.
    pub fn release_from_others(&mut self, keep: &str, fields: &FieldSet) {
        for entry in self.entries.iter_mut().filter(|e| e.manager != keep) {
            entry.fields = entry.fields.difference(fields);
        }
    }

    /// Restricts every entry to fields in `live`.
    pub fn retain_fields(&mut self, live: &FieldSet) {
        for entry in self.entries.iter_mut() {
            entry.fields = entry.fields.intersection(live);
        }
    }

    /// Removes all managers with empty sets.
    pub fn remove_empty(&mut self) {
        self.entries.retain(|e| !e.fields.is_empty());
    }
}

impl fmt::Display for ManagedFieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.entries {
            writeln!(f, "{}:", e.manager)?;
            writeln!(f, "- Operation: {}", e.operation)?;
            writeln!(f, "- APIVersion: {}", e.api_version)?;
            writeln!(f, "- Fields: {}", e.fields)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn entry(manager: &str, fields: &[&str], operation: Operation) -> ManagedFieldEntry {
        ManagedFieldEntry {
            manager: manager.to_string(),
            api_version: APIVersion::new("v1"),
            fields: fields.iter().copied().collect(),
            time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            operation,
        }
    }

    #[test]
    fn test_insert_replaces_same_manager() {
        let mut mfs = ManagedFieldSet::new();
        mfs.insert(entry("a", &["x"], Operation::Apply));
        mfs.insert(entry("b", &["y"], Operation::Update));
        mfs.insert(entry("a", &["z"], Operation::Update));

        assert_eq!(mfs.len(), 2);
        assert_eq!(mfs.managers().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(!mfs.get("a").unwrap().applied());
        assert!(mfs.get("a").unwrap().fields.has(&FieldPath::from("z")));
    }

    #[test]
    fn test_release_and_remove_empty() {
        let mut mfs = ManagedFieldSet::new();
        mfs.insert(entry("a", &["x", "y"], Operation::Apply));
        mfs.insert(entry("b", &["x"], Operation::Update));

        mfs.release_from_others("a", &["x"].into_iter().collect());
        mfs.remove_empty();

        assert!(!mfs.contains("b"));
        assert_eq!(mfs.all_fields(), ["x", "y"].into_iter().collect());
        let x = FieldPath::from("x");
        assert_eq!(mfs.owners_of(&x).count(), 1);
    }

    #[test]
    fn test_object_round_trip() {
        let mut obj = Object::from_value(json!({"metadata": {"name": "n"}, "data": {}})).unwrap();
        assert!(ManagedFieldSet::from_object(&obj).unwrap().is_empty());

        let mut mfs = ManagedFieldSet::new();
        mfs.insert(entry("a", &["data"], Operation::Update));
        mfs.write_to(&mut obj).unwrap();
        assert_eq!(ManagedFieldSet::from_object(&obj).unwrap(), mfs);

        ManagedFieldSet::new().write_to(&mut obj).unwrap();
        assert!(obj.managed_fields_raw().is_none());
    }
}
