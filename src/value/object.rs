//! Opaque object handle over the canonical JSON representation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const API_VERSION: &str = "apiVersion";
pub const KIND: &str = "kind";
pub const METADATA: &str = "metadata";
pub const STATUS: &str = "status";

pub const NAME: &str = "name";
pub const NAMESPACE: &str = "namespace";
pub const RESOURCE_VERSION: &str = "resourceVersion";
pub const MANAGED_FIELDS: &str = "managedFields";

/// ObjectError is returned when raw data does not describe an object.
#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("expected an object, got {0}")]
    NotAnObject(&'static str),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Object is a type-erased resource: a map of top-level keys to values.
///
/// Nothing about the resource kind is compiled in. Identity and metadata are
/// read from the conventional `apiVersion`, `kind` and `metadata` keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Object {
    fields: Map<String, Value>,
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

impl Object {
    pub fn new() -> Self {
        Object { fields: Map::new() }
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Object { fields }
    }

    /// Wraps a JSON value, which must be a map.
    pub fn from_value(value: Value) -> Result<Self, ObjectError> {
        match value {
            Value::Object(fields) => Ok(Object { fields }),
            other => Err(ObjectError::NotAnObject(type_name(&other))),
        }
    }

    pub fn from_json(data: &[u8]) -> Result<Self, ObjectError> {
        let value: Value = serde_json::from_slice(data)?;
        Self::from_value(value)
    }

    pub fn from_yaml(data: &[u8]) -> Result<Self, ObjectError> {
        let value: Value = serde_yaml::from_slice(data)?;
        Self::from_value(value)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ObjectError> {
        Ok(serde_json::to_vec(&self.fields)?)
    }

    pub fn to_yaml(&self) -> Result<String, ObjectError> {
        Ok(serde_yaml::to_string(&self.fields)?)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Returns the top-level keys.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn api_version(&self) -> Option<&str> {
        self.str_field(API_VERSION)
    }

    pub fn kind(&self) -> Option<&str> {
        self.str_field(KIND)
    }

    pub fn set_api_version(&mut self, api_version: impl Into<String>) {
        self.set(API_VERSION, Value::String(api_version.into()));
    }

    pub fn set_kind(&mut self, kind: impl Into<String>) {
        self.set(KIND, Value::String(kind.into()));
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Returns the metadata map if present and well-formed.
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.fields.get(METADATA).and_then(Value::as_object)
    }

    /// Returns the metadata map, replacing a missing or malformed entry with
    /// an empty map.
    pub fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let entry = self
            .fields
            .entry(METADATA)
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(m) => m,
            _ => unreachable!("metadata was just normalized to a map"),
        }
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata_str(NAME)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata_str(NAMESPACE)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.metadata_mut().insert(NAME.to_string(), Value::String(name.into()));
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.metadata_mut()
            .insert(NAMESPACE.to_string(), Value::String(namespace.into()));
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata_str(RESOURCE_VERSION)
    }

    pub fn set_resource_version(&mut self, rv: impl Into<String>) {
        self.metadata_mut()
            .insert(RESOURCE_VERSION.to_string(), Value::String(rv.into()));
    }

    /// Returns the raw ownership record stored under `metadata.managedFields`.
    pub fn managed_fields_raw(&self) -> Option<&Value> {
        self.metadata().and_then(|m| m.get(MANAGED_FIELDS))
    }

    pub fn set_managed_fields_raw(&mut self, value: Value) {
        self.metadata_mut().insert(MANAGED_FIELDS.to_string(), value);
    }

    pub fn clear_managed_fields(&mut self) {
        if let Some(Value::Object(m)) = self.fields.get_mut(METADATA) {
            m.remove(MANAGED_FIELDS);
        }
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        obj.into_value()
    }
}

impl TryFrom<Value> for Object {
    type Error = ObjectError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Object::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_rejects_non_map() {
        let err = Object::from_value(json!([1, 2])).unwrap_err();
        assert!(format!("{}", err).contains("list"));
    }

    #[test]
    fn test_identity_accessors() {
        let obj = Object::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cm", "namespace": "default"},
        }))
        .unwrap();

        assert_eq!(obj.api_version(), Some("v1"));
        assert_eq!(obj.kind(), Some("ConfigMap"));
        assert_eq!(obj.name(), Some("cm"));
        assert_eq!(obj.namespace(), Some("default"));
        assert_eq!(obj.resource_version(), None);
    }

    #[test]
    fn test_empty_strings_read_as_missing() {
        let obj = Object::from_value(json!({"kind": "", "metadata": {"name": ""}})).unwrap();
        assert_eq!(obj.kind(), None);
        assert_eq!(obj.name(), None);
    }

    #[test]
    fn test_metadata_mut_replaces_malformed() {
        let mut obj = Object::from_value(json!({"metadata": "oops"})).unwrap();
        obj.set_name("fixed");
        assert_eq!(obj.name(), Some("fixed"));
    }

    #[test]
    fn test_yaml_and_json_agree() {
        let from_json = Object::from_json(br#"{"a": 1, "b": {"c": true}}"#).unwrap();
        let from_yaml = Object::from_yaml(b"a: 1\nb:\n  c: true\n").unwrap();
        assert_eq!(from_json, from_yaml);
    }
}
