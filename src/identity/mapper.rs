//! Mapping of equivalent resource identities to the one the node stores.

use super::{GroupVersionKind, ResourceIdentity};
use std::collections::HashMap;
use thiserror::Error;

/// MapperError reports an inconsistent equivalence registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapperError {
    #[error("{alias} is already registered as equivalent to {existing}")]
    Conflicting {
        alias: ResourceIdentity,
        existing: ResourceIdentity,
    },

    #[error("{alias} names a different resource than {canonical}")]
    DifferentResource {
        alias: ResourceIdentity,
        canonical: ResourceIdentity,
    },
}

/// ResourceIdentityMapper maps a requested identity to its canonical form.
pub trait ResourceIdentityMapper: Send + Sync {
    /// Returns the identity the node serves for `identity`. Unknown identities
    /// map to themselves.
    fn canonicalize(&self, identity: &ResourceIdentity) -> ResourceIdentity;

    /// Returns true if both identities denote the same canonical resource.
    fn equivalent(&self, a: &ResourceIdentity, b: &ResourceIdentity) -> bool {
        self.canonicalize(a) == self.canonicalize(b)
    }

    /// Returns true if a payload of kind `gvk` may be stored under `route`.
    fn accepts_kind(&self, route: &ResourceIdentity, gvk: &GroupVersionKind) -> bool;
}

/// EquivalentResourceRegistry maps alias identities onto canonical ones.
///
/// With nothing registered every identity is its own canonical form.
#[derive(Debug, Clone, Default)]
pub struct EquivalentResourceRegistry {
    canonical: HashMap<ResourceIdentity, ResourceIdentity>,
}

impl EquivalentResourceRegistry {
    pub fn new() -> Self {
        EquivalentResourceRegistry::default()
    }

    /// Registers `alias` as equivalent to `canonical`.
    ///
    /// Registering the same pair twice is allowed; mapping an alias to two
    /// different canonical identities is not. Only the group and version may
    /// differ between an alias and its canonical identity.
    pub fn register(
        &mut self,
        alias: ResourceIdentity,
        canonical: ResourceIdentity,
    ) -> Result<(), MapperError> {
        let canonical = self.canonicalize(&canonical);
        if alias.kind != canonical.kind
            || alias.resource != canonical.resource
            || alias.subresource != canonical.subresource
        {
            return Err(MapperError::DifferentResource { alias, canonical });
        }
        if let Some(existing) = self.canonical.get(&alias) {
            if *existing != canonical {
                return Err(MapperError::Conflicting {
                    alias,
                    existing: existing.clone(),
                });
            }
            return Ok(());
        }
        if alias != canonical {
            self.canonical.insert(alias, canonical);
        }
        Ok(())
    }

    /// Returns the number of registered aliases.
    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}

impl ResourceIdentityMapper for EquivalentResourceRegistry {
    fn canonicalize(&self, identity: &ResourceIdentity) -> ResourceIdentity {
        self.canonical
            .get(identity)
            .cloned()
            .unwrap_or_else(|| identity.clone())
    }

    fn accepts_kind(&self, route: &ResourceIdentity, gvk: &GroupVersionKind) -> bool {
        let canonical = self.canonicalize(route);
        if route.matches_kind(gvk) || canonical.matches_kind(gvk) {
            return true;
        }
        self.canonical
            .iter()
            .any(|(alias, target)| *target == canonical && alias.matches_kind(gvk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deploy(group: &str, version: &str) -> ResourceIdentity {
        ResourceIdentity::new(group, version, "Deployment", "deployments")
    }

    #[test]
    fn test_empty_registry_is_identity() {
        let registry = EquivalentResourceRegistry::new();
        let id = deploy("apps", "v1");
        assert_eq!(registry.canonicalize(&id), id);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_alias_maps_to_canonical() {
        let mut registry = EquivalentResourceRegistry::new();
        registry.register(deploy("apps", "v1beta1"), deploy("apps", "v1")).unwrap();
        registry.register(deploy("extensions", "v1beta1"), deploy("apps", "v1")).unwrap();

        assert_eq!(registry.canonicalize(&deploy("extensions", "v1beta1")), deploy("apps", "v1"));
        assert!(registry.equivalent(&deploy("apps", "v1beta1"), &deploy("extensions", "v1beta1")));
        assert!(registry.accepts_kind(
            &deploy("apps", "v1"),
            &GroupVersionKind::new("apps", "v1beta1", "Deployment")
        ));
        assert!(!registry.accepts_kind(
            &deploy("apps", "v1"),
            &GroupVersionKind::new("apps", "v1beta2", "Deployment")
        ));
    }

    #[test]
    fn test_chained_registration_resolves_to_root() {
        let mut registry = EquivalentResourceRegistry::new();
        registry.register(deploy("apps", "v1beta1"), deploy("apps", "v1")).unwrap();
        registry.register(deploy("apps", "v1alpha1"), deploy("apps", "v1beta1")).unwrap();
        assert_eq!(registry.canonicalize(&deploy("apps", "v1alpha1")), deploy("apps", "v1"));
    }

    #[test]
    fn test_conflicting_registration_rejected() {
        let mut registry = EquivalentResourceRegistry::new();
        registry.register(deploy("apps", "v1beta1"), deploy("apps", "v1")).unwrap();
        registry.register(deploy("apps", "v1beta1"), deploy("apps", "v1")).unwrap();

        let err = registry
            .register(deploy("apps", "v1beta1"), deploy("apps", "v2"))
            .unwrap_err();
        assert!(matches!(err, MapperError::Conflicting { .. }));
    }

    #[test]
    fn test_alias_of_other_resource_rejected() {
        let mut registry = EquivalentResourceRegistry::new();
        let err = registry
            .register(ResourceIdentity::new("", "v1", "Secret", "secrets"), deploy("apps", "v1"))
            .unwrap_err();
        assert!(matches!(err, MapperError::DifferentResource { .. }));
        assert!(registry.is_empty());
        assert!(!registry.accepts_kind(&deploy("apps", "v1"), &GroupVersionKind::new("", "v1", "Secret")));
    }
}
