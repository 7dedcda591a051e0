//! Media type negotiation over a fixed set of registered serializers.

use super::codec::{JsonSerializer, Serializer, YamlSerializer, MEDIA_TYPE_JSON, MEDIA_TYPE_YAML};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Serializers known without registration, by media type.
static BUILTIN: Lazy<HashMap<&'static str, Arc<dyn Serializer>>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, Arc<dyn Serializer>> = HashMap::new();
    m.insert(MEDIA_TYPE_JSON, Arc::new(JsonSerializer));
    m.insert(MEDIA_TYPE_YAML, Arc::new(YamlSerializer));
    m
});

/// NegotiationError is returned when no serializer fits a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("none of the accepted media types {accepted:?} are supported, supported: {supported:?}")]
    NotAcceptable {
        accepted: Vec<String>,
        supported: Vec<String>,
    },

    #[error("unsupported media type {content_type:?}, supported: {supported:?}")]
    UnsupportedMediaType {
        content_type: String,
        supported: Vec<String>,
    },

    #[error("invalid media type {0:?}")]
    Invalid(String),

    #[error("no built-in serializer for media type {0:?}")]
    Unknown(String),

    #[error("media type {0:?} registered twice")]
    Duplicate(String),
}

/// MediaType is a `type/subtype` pair with parameters stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    pub type_: String,
    pub subtype: String,
}

impl MediaType {
    /// Parses `type/subtype[; params]`, lowercasing both parts.
    pub fn parse(s: &str) -> Result<MediaType, NegotiationError> {
        let essence = s.split(';').next().unwrap_or_default().trim();
        match essence.split_once('/') {
            Some((t, st)) if !t.is_empty() && !st.is_empty() && !st.contains('/') => Ok(MediaType {
                type_: t.to_ascii_lowercase(),
                subtype: st.to_ascii_lowercase(),
            }),
            _ => Err(NegotiationError::Invalid(s.to_string())),
        }
    }

    fn is_wildcard(&self) -> bool {
        self.subtype == "*"
    }

    /// Returns true if this (possibly wildcard) type accepts `concrete`.
    pub fn accepts(&self, concrete: &MediaType) -> bool {
        (self.type_ == "*" || self.type_ == concrete.type_)
            && (self.subtype == "*" || self.subtype == concrete.subtype)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)
    }
}

/// Negotiated is the encoder/decoder pair chosen for one request.
#[derive(Clone)]
pub struct Negotiated {
    pub encoder: Arc<dyn Serializer>,
    pub decoder: Arc<dyn Serializer>,
}

impl fmt::Debug for Negotiated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiated")
            .field("encoder", &self.encoder.media_type())
            .field("decoder", &self.decoder.media_type())
            .finish()
    }
}

/// NegotiatedSerializer chooses serializers by media type.
pub trait NegotiatedSerializer: Send + Sync {
    /// Returns the supported media types in registration order.
    fn supported_media_types(&self) -> Vec<String>;

    /// Picks the encoder from `accepted` and the decoder from `content_type`.
    fn resolve(&self, accepted: &[String], content_type: &str) -> Result<Negotiated, NegotiationError>;
}

/// SerializerRegistry holds the serializers registered at startup.
///
/// It is read-only once built and can be shared across requests without locking.
#[derive(Clone, Default)]
pub struct SerializerRegistry {
    entries: Vec<(MediaType, Arc<dyn Serializer>)>,
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(mt, _)| mt.to_string()))
            .finish()
    }
}

impl SerializerRegistry {
    pub fn new() -> Self {
        SerializerRegistry::default()
    }

    /// Builds a registry from built-in serializers, in the given order.
    pub fn from_media_types<S: AsRef<str>>(media_types: &[S]) -> Result<Self, NegotiationError> {
        let mut registry = SerializerRegistry::new();
        for mt in media_types {
            let parsed = MediaType::parse(mt.as_ref())?;
            let key = parsed.to_string();
            let serializer = BUILTIN
                .get(key.as_str())
                .cloned()
                .ok_or_else(|| NegotiationError::Unknown(key.clone()))?;
            registry.register(serializer)?;
        }
        Ok(registry)
    }

    /// Registers a serializer under its own media type.
    pub fn register(&mut self, serializer: Arc<dyn Serializer>) -> Result<(), NegotiationError> {
        let mt = MediaType::parse(serializer.media_type())?;
        if mt.is_wildcard() || mt.type_ == "*" {
            return Err(NegotiationError::Invalid(mt.to_string()));
        }
        if self.entries.iter().any(|(existing, _)| *existing == mt) {
            return Err(NegotiationError::Duplicate(mt.to_string()));
        }
        self.entries.push((mt, serializer));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, mt: &MediaType) -> Option<&Arc<dyn Serializer>> {
        self.entries.iter().find(|(m, _)| m.accepts(mt)).map(|(_, s)| s)
    }

    /// Returns the first registered serializer `accepted` allows.
    fn first_acceptable(&self, accepted: &MediaType) -> Option<&Arc<dyn Serializer>> {
        self.entries
            .iter()
            .find(|(m, _)| accepted.accepts(m))
            .map(|(_, s)| s)
    }
}

impl NegotiatedSerializer for SerializerRegistry {
    fn supported_media_types(&self) -> Vec<String> {
        self.entries.iter().map(|(m, _)| m.to_string()).collect()
    }

    fn resolve(&self, accepted: &[String], content_type: &str) -> Result<Negotiated, NegotiationError> {
        let not_acceptable = || NegotiationError::NotAcceptable {
            accepted: accepted.to_vec(),
            supported: self.supported_media_types(),
        };

        // Client preference first; registration order breaks ties for wildcards.
        let encoder = if accepted.iter().all(|a| a.trim().is_empty()) {
            self.entries.first().map(|(_, s)| s.clone())
        } else {
            accepted
                .iter()
                .filter_map(|a| MediaType::parse(a).ok())
                .find_map(|a| self.first_acceptable(&a).cloned())
        };
        let encoder = encoder.ok_or_else(not_acceptable)?;

        let decoder = if content_type.trim().is_empty() {
            encoder.clone()
        } else {
            let unsupported = || NegotiationError::UnsupportedMediaType {
                content_type: content_type.to_string(),
                supported: self.supported_media_types(),
            };
            let mt = MediaType::parse(content_type).map_err(|_| unsupported())?;
            if mt.is_wildcard() || mt.type_ == "*" {
                return Err(unsupported());
            }
            self.lookup(&mt).cloned().ok_or_else(unsupported)?
        };

        debug!(
            encoder = encoder.media_type(),
            decoder = decoder.media_type(),
            "negotiated serializers"
        );
        Ok(Negotiated { encoder, decoder })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::CodecError;
    use crate::value::Object;

    /// A serializer that only exists to have a distinct media type.
    struct Named(&'static str);

    impl Serializer for Named {
        fn media_type(&self) -> &str {
            self.0
        }
        fn encode(&self, _obj: &Object) -> Result<Vec<u8>, CodecError> {
            Ok(self.0.as_bytes().to_vec())
        }
        fn decode(&self, _data: &[u8]) -> Result<Object, CodecError> {
            Ok(Object::new())
        }
    }

    fn registry(types: &[&'static str]) -> SerializerRegistry {
        let mut r = SerializerRegistry::new();
        for t in types {
            r.register(Arc::new(Named(t))).unwrap();
        }
        r
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_client_preference_wins() {
        let r = registry(&["app/x", "app/z"]);
        let n = r.resolve(&strings(&["app/y", "app/x"]), "").unwrap();
        assert_eq!(n.encoder.media_type(), "app/x");
        assert_eq!(n.decoder.media_type(), "app/x");
    }

    #[test]
    fn test_client_order_over_server_order() {
        let r = registry(&["app/x", "app/z"]);
        let n = r.resolve(&strings(&["app/z", "app/x"]), "").unwrap();
        assert_eq!(n.encoder.media_type(), "app/z");
    }

    #[test]
    fn test_wildcards_use_registration_order() {
        let r = registry(&["app/x", "app/z", "text/plain"]);
        assert_eq!(r.resolve(&strings(&["*/*"]), "").unwrap().encoder.media_type(), "app/x");
        assert_eq!(r.resolve(&strings(&["text/*"]), "").unwrap().encoder.media_type(), "text/plain");
        assert_eq!(r.resolve(&[], "").unwrap().encoder.media_type(), "app/x");
    }

    #[test]
    fn test_parameters_and_case_ignored() {
        let r = SerializerRegistry::from_media_types(&["application/json", "application/yaml"]).unwrap();
        let n = r
            .resolve(&strings(&["Application/YAML; q=0.9"]), "application/json; charset=utf-8")
            .unwrap();
        assert_eq!(n.encoder.media_type(), MEDIA_TYPE_YAML);
        assert_eq!(n.decoder.media_type(), MEDIA_TYPE_JSON);
    }

    #[test]
    fn test_no_overlap_is_not_acceptable() {
        let r = registry(&["app/x"]);
        let err = r.resolve(&strings(&["app/y", "garbage"]), "").unwrap_err();
        assert_eq!(
            err,
            NegotiationError::NotAcceptable {
                accepted: strings(&["app/y", "garbage"]),
                supported: strings(&["app/x"]),
            }
        );
    }

    #[test]
    fn test_unknown_content_type() {
        let r = registry(&["app/x"]);
        let err = r.resolve(&strings(&["app/x"]), "app/q").unwrap_err();
        assert!(matches!(err, NegotiationError::UnsupportedMediaType { .. }));
        let err = r.resolve(&strings(&["app/x"]), "*/*").unwrap_err();
        assert!(matches!(err, NegotiationError::UnsupportedMediaType { .. }));
    }

    #[test]
    fn test_registration_errors() {
        let mut r = registry(&["app/x"]);
        assert_eq!(
            r.register(Arc::new(Named("app/x"))),
            Err(NegotiationError::Duplicate("app/x".to_string()))
        );
        assert!(r.register(Arc::new(Named("app/*"))).is_err());
        assert!(matches!(
            SerializerRegistry::from_media_types(&["application/protobuf"]),
            Err(NegotiationError::Unknown(_))
        ));
        assert!(matches!(MediaType::parse("json"), Err(NegotiationError::Invalid(_))));
    }
}
