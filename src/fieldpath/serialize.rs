//! Serialization for fieldpath types.
//!
//! Field sets use the `FieldsV1` shape: a JSON object keyed by `f:<name>`,
//! each value an object holding any nested claims. Nested claims written by a
//! schema-aware writer collapse onto their top-level field.

use super::path::FieldPath;
use super::set::FieldSet;
use super::{APIVersion, ManagedFieldEntry, ManagedFieldSet, Operation};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub const FIELDS_TYPE_V1: &str = "FieldsV1";

const FIELD_PREFIX: &str = "f:";
const SELF_KEY: &str = ".";

/// Error type for serialization/deserialization.
#[derive(Debug, Clone)]
pub struct SerializeError {
    pub message: String,
}

impl SerializeError {
    pub fn new(message: impl Into<String>) -> Self {
        SerializeError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SerializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SerializeError {}

/// Serializes a FieldPath to its `f:` key.
pub fn serialize_field_path(path: &FieldPath) -> String {
    format!("{}{}", FIELD_PREFIX, path.as_str())
}

/// Deserializes a FieldPath from its `f:` key.
pub fn deserialize_field_path(s: &str) -> Result<FieldPath, SerializeError> {
    match s.strip_prefix(FIELD_PREFIX) {
        Some("") => Err(SerializeError::new("empty field name")),
        Some(name) => Ok(FieldPath::new(name)),
        None => Err(SerializeError::new(format!(
            "top-level key must be a field name, got: {}",
            s
        ))),
    }
}

impl FieldSet {
    /// Converts the set to a `FieldsV1` JSON value.
    pub fn to_fields_v1(&self) -> Value {
        let obj: Map<String, Value> = self
            .iter()
            .map(|p| (serialize_field_path(p), Value::Object(Map::new())))
            .collect();
        Value::Object(obj)
    }

    /// Reads a set from a `FieldsV1` JSON value.
    pub fn from_fields_v1(value: &Value) -> Result<FieldSet, SerializeError> {
        let obj = value
            .as_object()
            .ok_or_else(|| SerializeError::new("expected JSON object for fieldsV1"))?;

        let mut set = FieldSet::new();
        for (key, child) in obj {
            if key == SELF_KEY {
                continue;
            }
            if !child.is_object() {
                return Err(SerializeError::new(format!(
                    "expected object value for key: {}",
                    key
                )));
            }
            set.insert(deserialize_field_path(key)?);
        }
        Ok(set)
    }

    /// Serializes the set to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, SerializeError> {
        serde_json::to_vec(&self.to_fields_v1())
            .map_err(|e| SerializeError::new(format!("JSON error: {}", e)))
    }

    /// Deserializes a set from JSON bytes.
    pub fn from_json(data: &[u8]) -> Result<FieldSet, SerializeError> {
        let value: Value = serde_json::from_slice(data)
            .map_err(|e| SerializeError::new(format!("JSON parse error: {}", e)))?;
        Self::from_fields_v1(&value)
    }
}

fn serialize_time<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn deserialize_time<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

/// Wire form of one `metadata.managedFields` item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedFieldsEntryWire {
    manager: String,
    operation: Operation,
    #[serde(default)]
    api_version: String,
    #[serde(serialize_with = "serialize_time", deserialize_with = "deserialize_time")]
    time: DateTime<Utc>,
    #[serde(default = "default_fields_type")]
    fields_type: String,
    #[serde(default, rename = "fieldsV1")]
    fields_v1: Value,
}

fn default_fields_type() -> String {
    FIELDS_TYPE_V1.to_string()
}

impl ManagedFieldSet {
    /// Encodes the set as the `metadata.managedFields` list.
    pub fn to_value(&self) -> Result<Value, SerializeError> {
        let wire: Vec<ManagedFieldsEntryWire> = self
            .iter()
            .map(|e| ManagedFieldsEntryWire {
                manager: e.manager.clone(),
                operation: e.operation,
                api_version: e.api_version.to_string(),
                time: e.time,
                fields_type: default_fields_type(),
                fields_v1: e.fields.to_fields_v1(),
            })
            .collect();
        serde_json::to_value(wire).map_err(|e| SerializeError::new(format!("JSON error: {}", e)))
    }

    /// Decodes a `metadata.managedFields` list.
    pub fn from_value(value: &Value) -> Result<ManagedFieldSet, SerializeError> {
        let wire: Vec<ManagedFieldsEntryWire> = serde_json::from_value(value.clone())
            .map_err(|e| SerializeError::new(format!("invalid managedFields: {}", e)))?;

        let mut set = ManagedFieldSet::new();
        for w in wire {
            if w.manager.is_empty() {
                return Err(SerializeError::new("managedFields entry without a manager"));
            }
            if w.fields_type != FIELDS_TYPE_V1 {
                return Err(SerializeError::new(format!(
                    "unsupported fieldsType: {}",
                    w.fields_type
                )));
            }
            let fields = if w.fields_v1.is_null() {
                FieldSet::new()
            } else {
                FieldSet::from_fields_v1(&w.fields_v1)?
            };
            set.insert(ManagedFieldEntry {
                manager: w.manager,
                api_version: APIVersion::new(w.api_version),
                fields,
                time: w.time,
                operation: w.operation,
            });
        }
        Ok(set)
    }
}
