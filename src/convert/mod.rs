//! Convert module - Normalization to the single stored representation.
//!
//! The node stores one representation per resource, so conversion is the
//! identity and defaulting only establishes a few structural invariants.
//! Both must be idempotent.

use crate::identity::GroupVersion;
use crate::value::{self, Object};
use serde_json::{Map, Value};

/// ObjectConverter converts an object to the version a handler works in.
pub trait ObjectConverter: Send + Sync {
    fn convert(&self, obj: Object, target: &GroupVersion) -> Object;
}

/// ObjectDefaulter fills in invariant defaults.
pub trait ObjectDefaulter: Send + Sync {
    fn apply_defaults(&self, obj: &mut Object);
}

/// NoopConverter returns objects unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConverter;

impl ObjectConverter for NoopConverter {
    fn convert(&self, obj: Object, _target: &GroupVersion) -> Object {
        obj
    }
}

/// NoopDefaulter leaves objects unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDefaulter;

impl ObjectDefaulter for NoopDefaulter {
    fn apply_defaults(&self, _obj: &mut Object) {}
}

/// InvariantDefaulter guarantees a `metadata` map and, optionally, a `status` map.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvariantDefaulter {
    pub init_status: bool,
}

impl InvariantDefaulter {
    pub fn new(init_status: bool) -> Self {
        InvariantDefaulter { init_status }
    }
}

impl ObjectDefaulter for InvariantDefaulter {
    fn apply_defaults(&self, obj: &mut Object) {
        obj.metadata_mut();
        if self.init_status && !obj.get(value::STATUS).is_some_and(Value::is_object) {
            obj.set(value::STATUS, Value::Object(Map::new()));
        }
    }
}

/// Converts then defaults `obj`.
pub fn normalize(
    converter: &dyn ObjectConverter,
    defaulter: &dyn ObjectDefaulter,
    obj: Object,
    declared: &GroupVersion,
) -> Object {
    let mut obj = converter.convert(obj, declared);
    defaulter.apply_defaults(&mut obj);
    obj
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn samples() -> Vec<Object> {
        [
            json!({}),
            json!({"metadata": "broken", "status": 3}),
            json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "p"}, "spec": {}}),
            json!({"status": {"phase": "Running"}}),
        ]
        .into_iter()
        .map(|v| Object::from_value(v).unwrap())
        .collect()
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let gv = GroupVersion::new("", "v1");
        for init_status in [false, true] {
            let defaulter = InvariantDefaulter::new(init_status);
            for x in samples() {
                let once = normalize(&NoopConverter, &defaulter, x, &gv);
                let twice = normalize(&NoopConverter, &defaulter, once.clone(), &gv);
                assert_eq!(once, twice);
            }
        }
    }

    #[test]
    fn test_invariant_defaults() {
        let gv = GroupVersion::new("", "v1");
        let obj = normalize(&NoopConverter, &InvariantDefaulter::new(true), Object::new(), &gv);
        assert_eq!(obj.get("metadata"), Some(&json!({})));
        assert_eq!(obj.get("status"), Some(&json!({})));

        let running = Object::from_value(json!({"status": {"phase": "Running"}})).unwrap();
        let obj = normalize(&NoopConverter, &InvariantDefaulter::new(true), running, &gv);
        assert_eq!(obj.get("status"), Some(&json!({"phase": "Running"})));
    }

    #[test]
    fn test_noop_defaulter_is_identity() {
        let gv = GroupVersion::new("", "v1");
        for x in samples() {
            assert_eq!(normalize(&NoopConverter, &NoopDefaulter, x.clone(), &gv), x);
        }
    }
}
