//! Identity module - Resource identities and their canonical mapping.

mod mapper;

pub use mapper::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// GroupVersion names an API group at one version. The core group is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersion {
    #[serde(default)]
    pub group: String,
    pub version: String,
}

impl GroupVersion {
    pub fn new(group: impl Into<String>, version: impl Into<String>) -> Self {
        GroupVersion {
            group: group.into(),
            version: version.into(),
        }
    }

    /// Parses an `apiVersion` string: `v1` or `apps/v1`.
    pub fn parse(api_version: &str) -> Option<Self> {
        match api_version.split_once('/') {
            None if !api_version.is_empty() => Some(GroupVersion::new("", api_version)),
            Some((group, version))
                if !group.is_empty() && !version.is_empty() && !version.contains('/') =>
            {
                Some(GroupVersion::new(group, version))
            }
            _ => None,
        }
    }

    /// Returns the `apiVersion` string form.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.api_version())
    }
}

/// GroupVersionKind identifies a resource type as it appears in a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        GroupVersionKind {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    pub fn group_version(&self) -> GroupVersion {
        GroupVersion::new(self.group.clone(), self.version.clone())
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.group_version(), self.kind)
    }
}

/// ResourceIdentity selects the route a request addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentity {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subresource: String,
}

impl ResourceIdentity {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        ResourceIdentity {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            resource: resource.into(),
            subresource: String::new(),
        }
    }

    /// Returns a copy addressing the given subresource.
    pub fn with_subresource(mut self, subresource: impl Into<String>) -> Self {
        self.subresource = subresource.into();
        self
    }

    pub fn group_version(&self) -> GroupVersion {
        GroupVersion::new(self.group.clone(), self.version.clone())
    }

    pub fn group_version_kind(&self) -> GroupVersionKind {
        GroupVersionKind::new(self.group.clone(), self.version.clone(), self.kind.clone())
    }

    /// Returns true if this identity names the same group, version and kind.
    pub fn matches_kind(&self, gvk: &GroupVersionKind) -> bool {
        self.group == gvk.group && self.version == gvk.version && self.kind == gvk.kind
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)?;
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)?;
        }
        if !self.subresource.is_empty() {
            write!(f, "/{}", self.subresource)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group_version() {
        assert_eq!(GroupVersion::parse("v1"), Some(GroupVersion::new("", "v1")));
        assert_eq!(GroupVersion::parse("apps/v1"), Some(GroupVersion::new("apps", "v1")));
        assert_eq!(GroupVersion::parse(""), None);
        assert_eq!(GroupVersion::parse("/v1"), None);
        assert_eq!(GroupVersion::parse("a/b/c"), None);
    }

    #[test]
    fn test_api_version_round_trip() {
        for s in ["v1", "apps/v1", "devices.kubeedge.io/v1beta1"] {
            assert_eq!(GroupVersion::parse(s).unwrap().api_version(), s);
        }
    }

    #[test]
    fn test_resource_identity_display() {
        let core = ResourceIdentity::new("", "v1", "Pod", "pods").with_subresource("status");
        assert_eq!(format!("{}", core), "v1/pods/status");
        let apps = ResourceIdentity::new("apps", "v1", "Deployment", "deployments");
        assert_eq!(format!("{}", apps), "apps/v1/deployments");
    }

    #[test]
    fn test_identity_deserializes_camel_case() {
        let id: ResourceIdentity = serde_yaml::from_str(
            "group: apps\nversion: v1\nkind: Deployment\nresource: deployments\nsubresource: scale\n",
        )
        .unwrap();
        assert_eq!(id.subresource, "scale");
        assert!(id.matches_kind(&GroupVersionKind::new("apps", "v1", "Deployment")));
    }
}
