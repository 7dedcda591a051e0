//! Store module - The object store boundary the pipeline reads and writes.
//!
//! The store owns ordering: a write only succeeds when the caller's expected
//! resource version matches the committed one, so two writers that computed
//! ownership from the same stale object cannot both win.

mod memory;

pub use memory::*;

use crate::identity::ResourceIdentity;
use crate::value::Object;
use thiserror::Error;

/// ResourceVersion is the store's per-object commit counter.
pub type ResourceVersion = u64;

/// StoreError is returned by store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{name} not found")]
    NotFound { name: String },

    #[error("{name} already exists")]
    AlreadyExists { name: String },

    #[error("the object {name} has been modified; expected resource version {expected:?}, found {actual:?}")]
    VersionConflict {
        name: String,
        expected: Option<ResourceVersion>,
        actual: Option<ResourceVersion>,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// StoredObject is an object together with the version it was committed at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub object: Object,
    pub resource_version: ResourceVersion,
}

/// ObjectStore is a single-object compare-and-swap store.
pub trait ObjectStore: Send + Sync {
    fn get(
        &self,
        identity: &ResourceIdentity,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<StoredObject>, StoreError>;

    /// Lists objects, across all namespaces when `namespace` is `None`.
    fn list(
        &self,
        identity: &ResourceIdentity,
        namespace: Option<&str>,
    ) -> Result<Vec<StoredObject>, StoreError>;

    /// Writes `obj` if the committed version equals `expected`.
    ///
    /// `expected == None` creates the object and fails if it already exists.
    fn write_if_version(
        &self,
        identity: &ResourceIdentity,
        namespace: Option<&str>,
        name: &str,
        obj: Object,
        expected: Option<ResourceVersion>,
    ) -> Result<ResourceVersion, StoreError>;
}

/// Formats `namespace/name` for messages.
pub fn qualified_name(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{}/{}", ns, name),
        None => name.to_string(),
    }
}
