//! Typer module - Determines an object's kind from its embedded type metadata.

use crate::identity::{GroupVersion, GroupVersionKind};
use crate::value::Object;
use thiserror::Error;

/// TypeError is returned when an object's type cannot be determined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("object has no {0} and the route declares no default")]
    AmbiguousType(&'static str),

    #[error("invalid apiVersion {0:?}")]
    InvalidApiVersion(String),
}

/// ObjectTyper reads the group, version and kind of a decoded payload.
pub trait ObjectTyper: Send + Sync {
    fn type_of(&self, obj: &Object) -> Result<GroupVersionKind, TypeError>;

    /// Returns true if objects with no type metadata can still be typed.
    fn recognizes_untyped(&self) -> bool;
}

/// UnstructuredObjectTyper types objects from their `apiVersion` and `kind`.
///
/// Kinds need no registration; anything carrying identity metadata is
/// accepted. Missing metadata falls back to the route default when one is set.
#[derive(Debug, Clone, Default)]
pub struct UnstructuredObjectTyper {
    default_kind: Option<GroupVersionKind>,
}

impl UnstructuredObjectTyper {
    pub fn new() -> Self {
        UnstructuredObjectTyper::default()
    }

    pub fn with_default(default_kind: GroupVersionKind) -> Self {
        UnstructuredObjectTyper {
            default_kind: Some(default_kind),
        }
    }
}

impl ObjectTyper for UnstructuredObjectTyper {
    fn type_of(&self, obj: &Object) -> Result<GroupVersionKind, TypeError> {
        let group_version = match obj.api_version() {
            Some(av) => Some(
                GroupVersion::parse(av).ok_or_else(|| TypeError::InvalidApiVersion(av.to_string()))?,
            ),
            None => None,
        };

        match (group_version, obj.kind(), &self.default_kind) {
            (Some(gv), Some(kind), _) => Ok(GroupVersionKind::new(gv.group, gv.version, kind)),
            (None, Some(kind), Some(d)) => Ok(GroupVersionKind::new(d.group.clone(), d.version.clone(), kind)),
            (Some(gv), None, Some(d)) => Ok(GroupVersionKind::new(gv.group, gv.version, d.kind.clone())),
            (None, None, Some(d)) => Ok(d.clone()),
            (None, _, None) => Err(TypeError::AmbiguousType("apiVersion")),
            (_, None, None) => Err(TypeError::AmbiguousType("kind")),
        }
    }

    fn recognizes_untyped(&self) -> bool {
        self.default_kind.is_some()
    }
}
