//! Auth module - The authorization decision point.

use crate::identity::ResourceIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Verb is the action a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Patch,
}

impl Verb {
    /// Returns true if the verb writes to the store.
    pub fn is_write(&self) -> bool {
        matches!(self, Verb::Create | Verb::Update | Verb::Patch)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verb::Get => "get",
            Verb::List => "list",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Patch => "patch",
        };
        write!(f, "{}", s)
    }
}

/// UserInfo is the caller identity handed over by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl UserInfo {
    pub fn new(name: impl Into<String>) -> Self {
        UserInfo {
            name: name.into(),
            groups: Vec::new(),
        }
    }
}

/// Attributes is everything a policy engine may decide on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub user: UserInfo,
    pub verb: Verb,
    pub resource: ResourceIdentity,
    pub namespace: Option<String>,
    pub name: Option<String>,
}

/// Decision is the outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

/// Authorizer decides whether a request may proceed.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, attrs: &Attributes) -> Decision;
}

/// AlwaysAllowAuthorizer admits every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAllowAuthorizer;

impl Authorizer for AlwaysAllowAuthorizer {
    fn authorize(&self, _attrs: &Attributes) -> Decision {
        Decision::Allow
    }
}

/// AlwaysDenyAuthorizer rejects every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDenyAuthorizer;

impl Authorizer for AlwaysDenyAuthorizer {
    fn authorize(&self, attrs: &Attributes) -> Decision {
        Decision::Deny(format!(
            "user {:?} may not {} {}",
            attrs.user.name, attrs.verb, attrs.resource
        ))
    }
}

/// AuthorizationMode selects the authorizer a route is assembled with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationMode {
    #[default]
    AlwaysAllow,
    Delegate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(verb: Verb) -> Attributes {
        Attributes {
            user: UserInfo::new("edge"),
            verb,
            resource: ResourceIdentity::new("", "v1", "Pod", "pods"),
            namespace: Some("default".to_string()),
            name: None,
        }
    }

    #[test]
    fn test_always_allow() {
        for verb in [Verb::Get, Verb::List, Verb::Create, Verb::Update, Verb::Patch] {
            assert_eq!(AlwaysAllowAuthorizer.authorize(&attrs(verb)), Decision::Allow);
        }
    }

    #[test]
    fn test_always_deny_reason() {
        match AlwaysDenyAuthorizer.authorize(&attrs(Verb::Create)) {
            Decision::Deny(reason) => assert_eq!(reason, "user \"edge\" may not create v1/pods"),
            Decision::Allow => panic!("expected deny"),
        }
    }

    #[test]
    fn test_mode_deserializes() {
        let mode: AuthorizationMode = serde_yaml::from_str("Delegate").unwrap();
        assert_eq!(mode, AuthorizationMode::Delegate);
        assert!(Verb::Patch.is_write());
        assert!(!Verb::List.is_write());
    }
}
