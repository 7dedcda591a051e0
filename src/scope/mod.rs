//! Scope module - Assembles the per-route request context.
//!
//! A [`RequestScope`] owns one instance of every capability a generic handler
//! needs. It is built once when a route is registered and is read-only after
//! that, so it is shared across concurrent requests without locking.

use crate::auth::{AlwaysAllowAuthorizer, AuthorizationMode, Authorizer};
use crate::convert::{InvariantDefaulter, NoopConverter, ObjectConverter, ObjectDefaulter};
use crate::error::ScopeError;
use crate::fieldpath::FieldSet;
use crate::identity::{EquivalentResourceRegistry, ResourceIdentity, ResourceIdentityMapper};
use crate::merge::{FieldOwnershipTracker, TopLevelFieldManager};
use crate::naming::{ContextBasedNaming, Namer};
use crate::serializer::{NegotiatedSerializer, SerializerRegistry, MEDIA_TYPE_JSON, MEDIA_TYPE_YAML};
use crate::typer::{ObjectTyper, UnstructuredObjectTyper};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Default request body limit, 3 MiB.
pub const DEFAULT_MAX_REQUEST_BODY_BYTES: usize = 3 * 1024 * 1024;

fn default_media_types() -> Vec<String> {
    vec![MEDIA_TYPE_JSON.to_string(), MEDIA_TYPE_YAML.to_string()]
}

fn default_max_request_body_bytes() -> usize {
    DEFAULT_MAX_REQUEST_BODY_BYTES
}

/// RouteConfig is the static configuration of one served resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    pub identity: ResourceIdentity,
    /// Identities served as aliases of `identity`.
    #[serde(default)]
    pub equivalent_identities: Vec<ResourceIdentity>,
    #[serde(default)]
    pub cluster_scoped: bool,
    /// Supported media types in server preference order.
    #[serde(default = "default_media_types")]
    pub media_types: Vec<String>,
    #[serde(default)]
    pub authorization_mode: AuthorizationMode,
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
    #[serde(default)]
    pub init_status: bool,
    /// Extra top-level keys excluded from ownership tracking.
    #[serde(default)]
    pub ignored_fields: Vec<String>,
}

impl RouteConfig {
    pub fn new(identity: ResourceIdentity) -> Self {
        RouteConfig {
            identity,
            equivalent_identities: Vec::new(),
            cluster_scoped: false,
            media_types: default_media_types(),
            authorization_mode: AuthorizationMode::default(),
            max_request_body_bytes: DEFAULT_MAX_REQUEST_BODY_BYTES,
            init_status: false,
            ignored_fields: Vec::new(),
        }
    }

    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    fn validate(&self) -> Result<(), ScopeError> {
        let id = &self.identity;
        for (field, value) in [("version", &id.version), ("kind", &id.kind), ("resource", &id.resource)] {
            if value.is_empty() {
                return Err(ScopeError::InvalidRoute(format!("identity {} is empty", field)));
            }
        }
        for alias in &self.equivalent_identities {
            if *alias == *id {
                return Err(ScopeError::InvalidRoute(format!(
                    "{} is listed as equivalent to itself",
                    alias
                )));
            }
            if alias.kind != id.kind || alias.resource != id.resource || alias.subresource != id.subresource {
                return Err(ScopeError::InvalidRoute(format!(
                    "{} cannot be served as an alias of {}",
                    alias, id
                )));
            }
        }
        if self.media_types.is_empty() {
            return Err(ScopeError::InvalidRoute("no media types".to_string()));
        }
        if self.max_request_body_bytes == 0 {
            return Err(ScopeError::InvalidRoute(
                "maxRequestBodyBytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// RequestScopeBuilder assembles a RequestScope from a route configuration,
/// with optional capability overrides.
pub struct RequestScopeBuilder {
    route: RouteConfig,
    namer: Option<Arc<dyn Namer>>,
    serializer: Option<Arc<dyn NegotiatedSerializer>>,
    converter: Option<Arc<dyn ObjectConverter>>,
    defaulter: Option<Arc<dyn ObjectDefaulter>>,
    typer: Option<Arc<dyn ObjectTyper>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    mapper: Option<Arc<dyn ResourceIdentityMapper>>,
    tracker: Option<Arc<dyn FieldOwnershipTracker>>,
}

impl RequestScopeBuilder {
    pub fn new(route: RouteConfig) -> Self {
        RequestScopeBuilder {
            route,
            namer: None,
            serializer: None,
            converter: None,
            defaulter: None,
            typer: None,
            authorizer: None,
            mapper: None,
            tracker: None,
        }
    }

    pub fn namer(mut self, namer: Arc<dyn Namer>) -> Self {
        self.namer = Some(namer);
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn NegotiatedSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn converter(mut self, converter: Arc<dyn ObjectConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn defaulter(mut self, defaulter: Arc<dyn ObjectDefaulter>) -> Self {
        self.defaulter = Some(defaulter);
        self
    }

    pub fn typer(mut self, typer: Arc<dyn ObjectTyper>) -> Self {
        self.typer = Some(typer);
        self
    }

    /// Sets the policy engine consulted in `Delegate` mode.
    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn mapper(mut self, mapper: Arc<dyn ResourceIdentityMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn tracker(mut self, tracker: Arc<dyn FieldOwnershipTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Builds the scope. Fails only on invalid route configuration.
    pub fn build(self) -> Result<RequestScope, ScopeError> {
        let route = self.route;
        route.validate()?;

        let serializer: Arc<dyn NegotiatedSerializer> = match self.serializer {
            Some(s) => s,
            None => Arc::new(
                SerializerRegistry::from_media_types(&route.media_types)
                    .map_err(|e| ScopeError::InvalidRoute(e.to_string()))?,
            ),
        };

        let mapper: Arc<dyn ResourceIdentityMapper> = match self.mapper {
            Some(m) => m,
            None => {
                let mut registry = EquivalentResourceRegistry::new();
                for alias in &route.equivalent_identities {
                    registry
                        .register(alias.clone(), route.identity.clone())
                        .map_err(|e| ScopeError::InvalidRoute(e.to_string()))?;
                }
                Arc::new(registry)
            }
        };

        let authorizer: Arc<dyn Authorizer> = match (route.authorization_mode, self.authorizer) {
            (AuthorizationMode::AlwaysAllow, _) => Arc::new(AlwaysAllowAuthorizer),
            (AuthorizationMode::Delegate, Some(a)) => a,
            (AuthorizationMode::Delegate, None) => {
                return Err(ScopeError::InvalidRoute(
                    "delegate authorization requires an authorizer".to_string(),
                ))
            }
        };

        let tracker: Arc<dyn FieldOwnershipTracker> = self.tracker.unwrap_or_else(|| {
            let ignored: FieldSet = route.ignored_fields.iter().map(String::as_str).collect();
            Arc::new(TopLevelFieldManager::builder().ignored_fields(ignored).build())
        });

        let storage_identity = mapper.canonicalize(&route.identity);

        let scope = RequestScope {
            namer: self
                .namer
                .unwrap_or_else(|| Arc::new(ContextBasedNaming::new(route.cluster_scoped))),
            serializer,
            converter: self.converter.unwrap_or_else(|| Arc::new(NoopConverter)),
            defaulter: self
                .defaulter
                .unwrap_or_else(|| Arc::new(InvariantDefaulter::new(route.init_status))),
            typer: self.typer.unwrap_or_else(|| {
                Arc::new(UnstructuredObjectTyper::with_default(
                    route.identity.group_version_kind(),
                ))
            }),
            authorizer,
            mapper,
            tracker,
            max_request_body_bytes: route.max_request_body_bytes,
            identity: route.identity,
            storage_identity,
        };

        info!(
            route = %scope.identity,
            storage = %scope.storage_identity,
            media_types = ?scope.serializer.supported_media_types(),
            "assembled request scope"
        );
        Ok(scope)
    }
}

/// RequestScope is the immutable per-route context handed to handlers.
pub struct RequestScope {
    namer: Arc<dyn Namer>,
    serializer: Arc<dyn NegotiatedSerializer>,
    converter: Arc<dyn ObjectConverter>,
    defaulter: Arc<dyn ObjectDefaulter>,
    typer: Arc<dyn ObjectTyper>,
    authorizer: Arc<dyn Authorizer>,
    mapper: Arc<dyn ResourceIdentityMapper>,
    tracker: Arc<dyn FieldOwnershipTracker>,
    max_request_body_bytes: usize,
    identity: ResourceIdentity,
    storage_identity: ResourceIdentity,
}

impl RequestScope {
    pub fn builder(route: RouteConfig) -> RequestScopeBuilder {
        RequestScopeBuilder::new(route)
    }

    /// Builds a scope with every capability taken from `route`.
    pub fn build(route: RouteConfig) -> Result<RequestScope, ScopeError> {
        RequestScopeBuilder::new(route).build()
    }

    pub fn namer(&self) -> &dyn Namer {
        self.namer.as_ref()
    }

    pub fn serializer(&self) -> &dyn NegotiatedSerializer {
        self.serializer.as_ref()
    }

    pub fn converter(&self) -> &dyn ObjectConverter {
        self.converter.as_ref()
    }

    pub fn defaulter(&self) -> &dyn ObjectDefaulter {
        self.defaulter.as_ref()
    }

    pub fn typer(&self) -> &dyn ObjectTyper {
        self.typer.as_ref()
    }

    pub fn authorizer(&self) -> &dyn Authorizer {
        self.authorizer.as_ref()
    }

    pub fn mapper(&self) -> &dyn ResourceIdentityMapper {
        self.mapper.as_ref()
    }

    pub fn tracker(&self) -> &dyn FieldOwnershipTracker {
        self.tracker.as_ref()
    }

    pub fn max_request_body_bytes(&self) -> usize {
        self.max_request_body_bytes
    }

    /// Returns the identity the route was registered with.
    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// Returns the canonical identity objects are stored under.
    pub fn storage_identity(&self) -> &ResourceIdentity {
        &self.storage_identity
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("identity", &self.identity)
            .field("storage_identity", &self.storage_identity)
            .field("cluster_scoped", &self.namer.cluster_scoped())
            .field("media_types", &self.serializer.supported_media_types())
            .field("max_request_body_bytes", &self.max_request_body_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AlwaysDenyAuthorizer, Attributes, Decision, UserInfo, Verb};
    use crate::fieldpath::FieldPath;
    use crate::identity::GroupVersionKind;
    use crate::value::Object;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pods() -> ResourceIdentity {
        ResourceIdentity::new("", "v1", "Pod", "pods")
    }

    #[test]
    fn test_route_config_yaml_defaults() {
        let route = RouteConfig::from_yaml(
            "identity:\n  version: v1\n  kind: ConfigMap\n  resource: configmaps\n",
        )
        .unwrap();
        assert_eq!(
            route,
            RouteConfig::new(ResourceIdentity::new("", "v1", "ConfigMap", "configmaps"))
        );
        assert_eq!(route.max_request_body_bytes, 3 * 1024 * 1024);
        assert_eq!(route.media_types, vec!["application/json", "application/yaml"]);

        let again = RouteConfig::from_yaml(&route.to_yaml().unwrap()).unwrap();
        assert_eq!(again, route);
    }

    #[test]
    fn test_build_defaults() {
        let scope = RequestScope::build(RouteConfig::new(pods())).unwrap();
        assert_eq!(scope.identity(), &pods());
        assert_eq!(scope.storage_identity(), &pods());
        assert_eq!(scope.max_request_body_bytes(), DEFAULT_MAX_REQUEST_BODY_BYTES);
        assert!(!scope.namer().cluster_scoped());
        assert!(scope.typer().recognizes_untyped());
        assert_eq!(
            scope.serializer().supported_media_types(),
            vec!["application/json", "application/yaml"]
        );

        let attrs = Attributes {
            user: UserInfo::new("edge"),
            verb: Verb::Create,
            resource: pods(),
            namespace: None,
            name: None,
        };
        assert_eq!(scope.authorizer().authorize(&attrs), Decision::Allow);
    }

    #[test]
    fn test_equivalent_identities_store_under_canonical() {
        let canonical = ResourceIdentity::new("apps", "v1", "Deployment", "deployments");
        let mut registry = EquivalentResourceRegistry::new();
        registry
            .register(
                ResourceIdentity::new("apps", "v1beta1", "Deployment", "deployments"),
                canonical.clone(),
            )
            .unwrap();
        let scope = RequestScope::builder(RouteConfig::new(ResourceIdentity::new(
            "apps", "v1beta1", "Deployment", "deployments",
        )))
        .mapper(Arc::new(registry))
        .build()
        .unwrap();
        assert_eq!(scope.storage_identity(), &canonical);
    }

    #[test]
    fn test_aliases_registered_from_route() {
        let mut route = RouteConfig::new(ResourceIdentity::new("apps", "v1", "Deployment", "deployments"));
        route.equivalent_identities = vec![ResourceIdentity::new("apps", "v1beta1", "Deployment", "deployments")];
        let scope = RequestScope::build(route).unwrap();
        assert!(scope.mapper().equivalent(
            &ResourceIdentity::new("apps", "v1beta1", "Deployment", "deployments"),
            scope.identity()
        ));
    }

    #[test]
    fn test_invalid_routes_rejected() {
        let mut no_kind = RouteConfig::new(pods());
        no_kind.identity.kind.clear();

        let mut no_media = RouteConfig::new(pods());
        no_media.media_types.clear();

        let mut unknown_media = RouteConfig::new(pods());
        unknown_media.media_types = vec!["application/vnd.kubernetes.protobuf".to_string()];

        let mut zero_limit = RouteConfig::new(pods());
        zero_limit.max_request_body_bytes = 0;

        let mut delegate = RouteConfig::new(pods());
        delegate.authorization_mode = AuthorizationMode::Delegate;

        for route in [no_kind, no_media, unknown_media, zero_limit, delegate] {
            let err = RequestScope::build(route).unwrap_err();
            assert!(matches!(err, ScopeError::InvalidRoute(_)), "{}", err);
        }
    }

    #[test]
    fn test_conflicting_aliases_rejected() {
        let configmaps = ResourceIdentity::new("", "v1", "ConfigMap", "configmaps");
        let aliases = [
            ResourceIdentity::new("", "v1", "Secret", "secrets"),
            configmaps.clone(),
            ResourceIdentity::new("", "v1beta1", "ConfigMap", "configmapz"),
            ResourceIdentity::new("", "v1beta1", "ConfigMap", "configmaps").with_subresource("status"),
        ];
        for alias in aliases {
            let mut route = RouteConfig::new(configmaps.clone());
            route.equivalent_identities = vec![alias.clone()];
            let err = RequestScope::build(route).unwrap_err();
            assert!(matches!(err, ScopeError::InvalidRoute(_)), "{}: {}", alias, err);
        }

        let mut route = RouteConfig::new(configmaps.clone());
        route.equivalent_identities = vec![ResourceIdentity::new("", "v1beta1", "ConfigMap", "configmaps")];
        let scope = RequestScope::build(route).unwrap();
        assert!(!scope
            .mapper()
            .accepts_kind(scope.identity(), &GroupVersionKind::new("", "v1", "Secret")));
    }

    #[test]
    fn test_delegate_uses_supplied_authorizer() {
        let mut route = RouteConfig::new(pods());
        route.authorization_mode = AuthorizationMode::Delegate;
        let scope = RequestScope::builder(route)
            .authorizer(Arc::new(AlwaysDenyAuthorizer))
            .build()
            .unwrap();

        let attrs = Attributes {
            user: UserInfo::new("edge"),
            verb: Verb::Get,
            resource: pods(),
            namespace: None,
            name: None,
        };
        assert!(matches!(scope.authorizer().authorize(&attrs), Decision::Deny(_)));
    }

    #[test]
    fn test_route_ignored_fields_reach_tracker() {
        let mut route = RouteConfig::new(pods());
        route.ignored_fields = vec!["status".to_string()];
        let scope = RequestScope::build(route).unwrap();

        let payload = Object::from_value(json!({"spec": {}, "status": {}})).unwrap();
        let fields = scope.tracker().compute_field_set(&payload);
        assert!(fields.has(&FieldPath::new("spec")));
        assert!(!fields.has(&FieldPath::new("status")));
    }
}
