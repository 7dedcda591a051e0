//! In-memory object store.

use super::{qualified_name, ObjectStore, ResourceVersion, StoreError, StoredObject};
use crate::identity::ResourceIdentity;
use crate::value::Object;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ObjectKey {
    identity: ResourceIdentity,
    namespace: Option<String>,
    name: String,
}

#[derive(Debug, Default)]
struct Inner {
    last_version: ResourceVersion,
    objects: HashMap<ObjectKey, StoredObject>,
}

/// MemoryStore keeps objects in a map behind one lock.
///
/// Versions come from a single store-wide counter, and every committed object
/// carries its version in `metadata.resourceVersion`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key(identity: &ResourceIdentity, namespace: Option<&str>, name: &str) -> ObjectKey {
    ObjectKey {
        identity: identity.clone(),
        namespace: namespace.map(str::to_string),
        name: name.to_string(),
    }
}

impl ObjectStore for MemoryStore {
    fn get(
        &self,
        identity: &ResourceIdentity,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<StoredObject>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.objects.get(&key(identity, namespace, name)).cloned())
    }

    fn list(
        &self,
        identity: &ResourceIdentity,
        namespace: Option<&str>,
    ) -> Result<Vec<StoredObject>, StoreError> {
        let inner = self.lock()?;
        let mut items: Vec<(&ObjectKey, &StoredObject)> = inner
            .objects
            .iter()
            .filter(|(k, _)| k.identity == *identity)
            .filter(|(k, _)| namespace.is_none() || k.namespace.as_deref() == namespace)
            .collect();
        items.sort_by(|(a, _), (b, _)| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        Ok(items.into_iter().map(|(_, v)| v.clone()).collect())
    }

    fn write_if_version(
        &self,
        identity: &ResourceIdentity,
        namespace: Option<&str>,
        name: &str,
        mut obj: Object,
        expected: Option<ResourceVersion>,
    ) -> Result<ResourceVersion, StoreError> {
        let mut inner = self.lock()?;
        let k = key(identity, namespace, name);
        let actual = inner.objects.get(&k).map(|s| s.resource_version);

        match (expected, actual) {
            (None, Some(_)) => {
                return Err(StoreError::AlreadyExists {
                    name: qualified_name(namespace, name),
                })
            }
            (Some(e), a) if a != Some(e) => {
                return Err(StoreError::VersionConflict {
                    name: qualified_name(namespace, name),
                    expected,
                    actual: a,
                })
            }
            _ => {}
        }

        inner.last_version += 1;
        let version = inner.last_version;
        obj.set_resource_version(version.to_string());
        inner.objects.insert(
            k,
            StoredObject {
                object: obj,
                resource_version: version,
            },
        );
        debug!(object = %qualified_name(namespace, name), version, "committed object");
        Ok(version)
    }
}
