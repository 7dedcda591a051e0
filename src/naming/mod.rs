//! Naming module - Resolves where an object lives from its generic metadata.

use crate::value::Object;
use thiserror::Error;

/// IdentityError reports a malformed object identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("name is required")]
    MissingName,

    #[error("namespace is required for a namespaced resource")]
    MissingNamespace,

    #[error("the namespace of the provided object ({object}) does not match the namespace sent on the request ({request})")]
    NamespaceMismatch { object: String, request: String },

    #[error("the name of the object ({object}) does not match the name on the URL ({request})")]
    NameMismatch { object: String, request: String },

    #[error("cluster-scoped resources may not carry a namespace ({0})")]
    NamespaceOnClusterScoped(String),
}

/// ObjectName is where an object lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectName {
    pub namespace: Option<String>,
    pub name: String,
    pub cluster_scoped: bool,
}

/// RequestPath carries the namespace and name a request was routed with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPath {
    pub namespace: Option<String>,
    pub name: Option<String>,
}

/// Namer resolves the namespace and name of an object without knowing its type.
pub trait Namer: Send + Sync {
    /// Returns true if the route serves cluster-scoped resources.
    fn cluster_scoped(&self) -> bool;

    /// Resolves the namespace a request addresses, for reads and lists.
    fn namespace(&self, path: &RequestPath) -> Result<Option<String>, IdentityError>;

    /// Resolves the namespace and name of a request without a body.
    fn name(&self, path: &RequestPath) -> Result<ObjectName, IdentityError>;

    /// Resolves where `obj` lives, reconciling its metadata with the request path.
    fn object_name(&self, path: &RequestPath, obj: &Object) -> Result<ObjectName, IdentityError>;
}

/// ContextBasedNaming takes the namespace from the request and the name from
/// either the request or the object metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBasedNaming {
    pub cluster_scoped: bool,
}

impl ContextBasedNaming {
    pub fn new(cluster_scoped: bool) -> Self {
        ContextBasedNaming { cluster_scoped }
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

impl Namer for ContextBasedNaming {
    fn cluster_scoped(&self) -> bool {
        self.cluster_scoped
    }

    fn namespace(&self, path: &RequestPath) -> Result<Option<String>, IdentityError> {
        match (self.cluster_scoped, non_empty(&path.namespace)) {
            (true, Some(ns)) => Err(IdentityError::NamespaceOnClusterScoped(ns.to_string())),
            (true, None) => Ok(None),
            (false, ns) => Ok(ns.map(str::to_string)),
        }
    }

    fn name(&self, path: &RequestPath) -> Result<ObjectName, IdentityError> {
        let namespace = self.namespace(path)?;
        if !self.cluster_scoped && namespace.is_none() {
            return Err(IdentityError::MissingNamespace);
        }
        let name = non_empty(&path.name).ok_or(IdentityError::MissingName)?;
        Ok(ObjectName {
            namespace,
            name: name.to_string(),
            cluster_scoped: self.cluster_scoped,
        })
    }

    fn object_name(&self, path: &RequestPath, obj: &Object) -> Result<ObjectName, IdentityError> {
        let request_ns = self.namespace(path)?;

        let namespace = if self.cluster_scoped {
            if let Some(ns) = obj.namespace() {
                return Err(IdentityError::NamespaceOnClusterScoped(ns.to_string()));
            }
            None
        } else {
            match (obj.namespace(), request_ns) {
                (Some(o), Some(r)) if o != r => {
                    return Err(IdentityError::NamespaceMismatch {
                        object: o.to_string(),
                        request: r,
                    })
                }
                (_, Some(r)) => Some(r),
                (Some(o), None) => Some(o.to_string()),
                (None, None) => return Err(IdentityError::MissingNamespace),
            }
        };

        let name = match (obj.name(), non_empty(&path.name)) {
            (Some(o), Some(r)) if o != r => {
                return Err(IdentityError::NameMismatch {
                    object: o.to_string(),
                    request: r.to_string(),
                })
            }
            (Some(o), _) => o.to_string(),
            (None, Some(r)) => r.to_string(),
            (None, None) => return Err(IdentityError::MissingName),
        };

        Ok(ObjectName {
            namespace,
            name,
            cluster_scoped: self.cluster_scoped,
        })
    }
}
