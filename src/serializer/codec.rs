//! Built-in codecs for the canonical object representation.

use crate::value::{Object, ObjectError};
use thiserror::Error;

pub const MEDIA_TYPE_JSON: &str = "application/json";
pub const MEDIA_TYPE_YAML: &str = "application/yaml";

/// CodecError is returned when a payload cannot be encoded or decoded.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode {media_type}: {source}")]
    Decode {
        media_type: String,
        #[source]
        source: ObjectError,
    },

    #[error("failed to encode {media_type}: {source}")]
    Encode {
        media_type: String,
        #[source]
        source: ObjectError,
    },
}

/// Serializer encodes and decodes objects for one media type.
///
/// Decoders accept only the canonical representation: a single map.
pub trait Serializer: Send + Sync {
    fn media_type(&self) -> &str;

    fn encode(&self, obj: &Object) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, data: &[u8]) -> Result<Object, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn media_type(&self) -> &str {
        MEDIA_TYPE_JSON
    }

    fn encode(&self, obj: &Object) -> Result<Vec<u8>, CodecError> {
        obj.to_json().map_err(|source| CodecError::Encode {
            media_type: MEDIA_TYPE_JSON.to_string(),
            source,
        })
    }

    fn decode(&self, data: &[u8]) -> Result<Object, CodecError> {
        Object::from_json(data).map_err(|source| CodecError::Decode {
            media_type: MEDIA_TYPE_JSON.to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlSerializer;

impl Serializer for YamlSerializer {
    fn media_type(&self) -> &str {
        MEDIA_TYPE_YAML
    }

    fn encode(&self, obj: &Object) -> Result<Vec<u8>, CodecError> {
        obj.to_yaml()
            .map(String::into_bytes)
            .map_err(|source| CodecError::Encode {
                media_type: MEDIA_TYPE_YAML.to_string(),
                source,
            })
    }

    fn decode(&self, data: &[u8]) -> Result<Object, CodecError> {
        Object::from_yaml(data).map_err(|source| CodecError::Decode {
            media_type: MEDIA_TYPE_YAML.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_codec() {
        let codec = JsonSerializer;
        let obj = Object::from_value(json!({"kind": "ConfigMap", "data": {"a": "b"}})).unwrap();
        let bytes = codec.encode(&obj).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), obj);
    }

    #[test]
    fn test_decoders_reject_non_objects() {
        assert!(JsonSerializer.decode(b"[1,2,3]").is_err());
        assert!(JsonSerializer.decode(b"{not json").is_err());
        assert!(YamlSerializer.decode(b"- a\n- b\n").is_err());
    }

    #[test]
    fn test_yaml_codec_reads_json_shaped_objects() {
        let obj = YamlSerializer.decode(b"kind: Pod\nspec:\n  containers: []\n").unwrap();
        assert_eq!(obj.kind(), Some("Pod"));
        let text = String::from_utf8(YamlSerializer.encode(&obj).unwrap()).unwrap();
        assert!(text.contains("kind: Pod"));
    }
}
