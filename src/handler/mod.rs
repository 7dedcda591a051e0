//! Handler module - The generic request pipeline.
//!
//! One [`Handler`] serves every verb of a route. The stages always run in the
//! same order: authorize, check the body size, negotiate, decode, resolve the
//! type, normalize, name, record field ownership, then write to the store.

mod status;


pub use status::*;

use crate::auth::{Attributes, Decision, UserInfo, Verb};
use crate::convert::normalize;
use crate::error::{ScopeError, StatusClass};
use crate::fieldpath::APIVersion;
use crate::naming::{ObjectName, RequestPath};
use crate::scope::RequestScope;
use crate::serializer::{JsonSerializer, Serializer, MEDIA_TYPE_JSON};
use crate::store::{qualified_name, ObjectStore, ResourceVersion, StoreError, StoredObject};
use crate::value::{self, Object};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Manager recorded for updates that name neither a field manager nor a user.
pub const DEFAULT_UPDATE_MANAGER: &str = "unknown";

/// Request is what the transport hands to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub verb: Verb,
    pub path: RequestPath,
    /// Accepted media types in client preference order.
    pub accept: Vec<String>,
    pub content_type: String,
    pub body: Vec<u8>,
    pub user: UserInfo,
    pub field_manager: Option<String>,
    /// Take ownership of contested fields on apply.
    pub force: bool,
}

impl Request {
    pub fn new(verb: Verb) -> Self {
        Request {
            verb,
            path: RequestPath::default(),
            accept: Vec::new(),
            content_type: String::new(),
            body: Vec::new(),
            user: UserInfo::default(),
            field_manager: None,
            force: false,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.path.namespace = Some(namespace.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.path.name = Some(name.into());
        self
    }

    pub fn accept(mut self, media_type: impl Into<String>) -> Self {
        self.accept.push(media_type.into());
        self
    }

    pub fn body(mut self, content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.content_type = content_type.into();
        self.body = body.into();
        self
    }

    pub fn user(mut self, user: UserInfo) -> Self {
        self.user = user;
        self
    }

    pub fn field_manager(mut self, manager: impl Into<String>) -> Self {
        self.field_manager = Some(manager.into());
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    fn manager(&self) -> Option<&str> {
        self.field_manager.as_deref().filter(|m| !m.is_empty())
    }
}

/// Response is what the pipeline hands back to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusClass,
    pub content_type: String,
    pub body: Vec<u8>,
    pub retry_after: Option<Duration>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        matches!(self.status, StatusClass::Ok | StatusClass::Created)
    }
}

/// Handler runs requests for one route against a store.
#[derive(Clone)]
pub struct Handler {
    scope: Arc<RequestScope>,
    store: Arc<dyn ObjectStore>,
}

impl Handler {
    pub fn new(scope: Arc<RequestScope>, store: Arc<dyn ObjectStore>) -> Self {
        Handler { scope, store }
    }

    pub fn scope(&self) -> &RequestScope {
        &self.scope
    }

    /// Serves `req`, stamping ownership records with the current time.
    pub fn handle(&self, req: &Request) -> Response {
        self.handle_at(req, Utc::now())
    }

    /// Serves `req` with ownership records stamped at `now`.
    pub fn handle_at(&self, req: &Request, now: DateTime<Utc>) -> Response {
        match self.serve(req, now) {
            Ok((status, obj, encoder)) => match encoder.encode(&obj) {
                Ok(body) => Response {
                    status,
                    content_type: encoder.media_type().to_string(),
                    body,
                    retry_after: None,
                },
                Err(e) => self.failure(req, ScopeError::Internal(format!("encoding response: {}", e))),
            },
            Err(err) => self.failure(req, err),
        }
    }

    fn failure(&self, req: &Request, err: ScopeError) -> Response {
        let status = err.status();
        match status {
            StatusClass::InternalError => warn!(verb = %req.verb, error = %err, "request failed"),
            _ => debug!(verb = %req.verb, status = %status, error = %err, "request rejected"),
        }

        // Failures are reported in the client's format when one can be negotiated.
        let encoder: Arc<dyn Serializer> = self
            .scope
            .serializer()
            .resolve(&req.accept, "")
            .map(|n| n.encoder)
            .unwrap_or_else(|_| Arc::new(JsonSerializer));
        let status_obj = status_object(&err);
        let (content_type, body) = match encoder.encode(&status_obj) {
            Ok(body) => (encoder.media_type().to_string(), body),
            Err(_) => (MEDIA_TYPE_JSON.to_string(), err.to_string().into_bytes()),
        };
        Response {
            status,
            content_type,
            body,
            retry_after: err.retry_after(),
        }
    }

    fn serve(
        &self,
        req: &Request,
        now: DateTime<Utc>,
    ) -> Result<(StatusClass, Object, Arc<dyn Serializer>), ScopeError> {
        self.authorize(req)?;

        let limit = self.scope.max_request_body_bytes();
        if req.body.len() > limit {
            warn!(size = req.body.len(), limit, "rejecting oversized request body");
            return Err(ScopeError::PayloadTooLarge {
                size: req.body.len(),
                limit,
            });
        }

        // Body-less verbs decode nothing, so their content type is not negotiated.
        let content_type = if req.verb.is_write() { req.content_type.as_str() } else { "" };
        let negotiated = self.scope.serializer().resolve(&req.accept, content_type)?;
        let encoder = negotiated.encoder.clone();

        let (status, obj) = match req.verb {
            Verb::Get => (StatusClass::Ok, self.get(req)?),
            Verb::List => (StatusClass::Ok, self.list(req)?),
            Verb::Create => {
                let obj = self.decode(req, negotiated.decoder.as_ref(), true)?;
                (StatusClass::Created, self.create(req, obj, now)?)
            }
            Verb::Update => {
                let obj = self.decode(req, negotiated.decoder.as_ref(), true)?;
                (StatusClass::Ok, self.update(req, obj, now)?)
            }
            Verb::Patch => {
                let obj = self.decode(req, negotiated.decoder.as_ref(), false)?;
                self.apply(req, obj, now)?
            }
        };
        Ok((status, obj, encoder))
    }

    fn authorize(&self, req: &Request) -> Result<(), ScopeError> {
        let attrs = Attributes {
            user: req.user.clone(),
            verb: req.verb,
            resource: self.scope.identity().clone(),
            namespace: req.path.namespace.clone(),
            name: req.path.name.clone(),
        };
        match self.scope.authorizer().authorize(&attrs) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                warn!(user = %req.user.name, verb = %req.verb, %reason, "request denied");
                Err(ScopeError::Forbidden(reason))
            }
        }
    }

    /// Decodes, types and converts the request body, defaulting it when
    /// `defaults` is set.
    fn decode(&self, req: &Request, decoder: &dyn Serializer, defaults: bool) -> Result<Object, ScopeError> {
        let obj = decoder.decode(&req.body)?;
        debug!(media_type = decoder.media_type(), "decoded request body");

        let gvk = self.scope.typer().type_of(&obj)?;
        if !self.scope.mapper().accepts_kind(self.scope.identity(), &gvk) {
            return Err(ScopeError::KindMismatch {
                kind: gvk.to_string(),
                route: self.scope.identity().to_string(),
            });
        }
        debug!(kind = %gvk, "resolved object type");

        let gv = gvk.group_version();
        let mut obj = if defaults {
            normalize(self.scope.converter(), self.scope.defaulter(), obj, &gv)
        } else {
            self.scope.converter().convert(obj, &gv)
        };
        if obj.api_version().is_none() {
            obj.set_api_version(gv.api_version());
        }
        if obj.kind().is_none() {
            obj.set_kind(gvk.kind);
        }
        Ok(obj)
    }

    fn object_name(&self, req: &Request, obj: &mut Object) -> Result<ObjectName, ScopeError> {
        let name = self.scope.namer().object_name(&req.path, obj)?;
        obj.set_name(name.name.clone());
        if let Some(ns) = &name.namespace {
            obj.set_namespace(ns.clone());
        }
        debug!(object = %qualified_name(name.namespace.as_deref(), &name.name), "resolved object name");
        Ok(name)
    }

    fn fetch(&self, name: &ObjectName) -> Result<Option<StoredObject>, ScopeError> {
        Ok(self.store.get(
            self.scope.storage_identity(),
            name.namespace.as_deref(),
            &name.name,
        )?)
    }

    fn write(
        &self,
        name: &ObjectName,
        mut obj: Object,
        expected: Option<ResourceVersion>,
    ) -> Result<Object, ScopeError> {
        let version = self.store.write_if_version(
            self.scope.storage_identity(),
            name.namespace.as_deref(),
            &name.name,
            obj.clone(),
            expected,
        )?;
        obj.set_resource_version(version.to_string());
        Ok(obj)
    }

    fn get(&self, req: &Request) -> Result<Object, ScopeError> {
        let name = self.scope.namer().name(&req.path)?;
        self.fetch(&name)?.map(|s| s.object).ok_or_else(|| {
            ScopeError::Store(StoreError::NotFound {
                name: qualified_name(name.namespace.as_deref(), &name.name),
            })
        })
    }

    fn list(&self, req: &Request) -> Result<Object, ScopeError> {
        let namespace = self.scope.namer().namespace(&req.path)?;
        let items = self
            .store
            .list(self.scope.storage_identity(), namespace.as_deref())?;
        let latest = items.iter().map(|s| s.resource_version).max().unwrap_or(0);
        let identity = self.scope.identity();

        let list = json!({
            "apiVersion": identity.group_version().api_version(),
            "kind": format!("{}List", identity.kind),
            "metadata": {"resourceVersion": latest.to_string()},
            "items": items.into_iter().map(|s| s.object.into_value()).collect::<Vec<Value>>(),
        });
        Object::from_value(list).map_err(|e| ScopeError::Internal(format!("assembling list: {}", e)))
    }

    /// Returns the manager recorded for a create or update.
    fn update_manager<'a>(&self, req: &'a Request) -> &'a str {
        req.manager().unwrap_or_else(|| {
            if req.user.name.is_empty() {
                DEFAULT_UPDATE_MANAGER
            } else {
                req.user.name.as_str()
            }
        })
    }

    fn create(&self, req: &Request, mut obj: Object, now: DateTime<Utc>) -> Result<Object, ScopeError> {
        let name = self.object_name(req, &mut obj)?;
        obj.metadata_mut().remove(value::RESOURCE_VERSION);

        let version = manager_version(&obj);
        let result = self.scope.tracker().apply_update(
            &Object::new(),
            &obj,
            self.update_manager(req),
            &version,
            now,
        )?;
        self.write(&name, result, None)
    }

    fn update(&self, req: &Request, mut obj: Object, now: DateTime<Utc>) -> Result<Object, ScopeError> {
        let name = self.object_name(req, &mut obj)?;
        let live = self.fetch(&name)?.ok_or_else(|| {
            ScopeError::Store(StoreError::NotFound {
                name: qualified_name(name.namespace.as_deref(), &name.name),
            })
        })?;

        // A resourceVersion in the body is a precondition on the committed object.
        let expected = match obj.resource_version() {
            Some(rv) => rv
                .parse::<ResourceVersion>()
                .map_err(|_| ScopeError::InvalidResourceVersion(rv.to_string()))?,
            None => live.resource_version,
        };

        let version = manager_version(&obj);
        let result = self.scope.tracker().apply_update(
            &live.object,
            &obj,
            self.update_manager(req),
            &version,
            now,
        )?;
        self.write(&name, result, Some(expected))
    }

    fn apply(
        &self,
        req: &Request,
        mut obj: Object,
        now: DateTime<Utc>,
    ) -> Result<(StatusClass, Object), ScopeError> {
        let manager = req.manager().ok_or(ScopeError::MissingFieldManager)?;
        let name = self.object_name(req, &mut obj)?;

        let (live, expected, status) = match self.fetch(&name)? {
            Some(s) => (s.object, Some(s.resource_version), StatusClass::Ok),
            None => (Object::new(), None, StatusClass::Created),
        };

        // An applier claims exactly what it sent; defaults go on the merged object.
        let version = manager_version(&obj);
        let mut result = self
            .scope
            .tracker()
            .apply_patch(&live, &obj, manager, &version, now, req.force)
            .map_err(|e| {
                let err = ScopeError::from(e);
                if let Some(conflicts) = err.conflicts() {
                    warn!(manager, managers = ?conflicts.managers(), "apply conflicts with other managers");
                }
                err
            })?;
        self.scope.defaulter().apply_defaults(&mut result);
        // Losing a create race is a concurrent modification, not a duplicate create.
        let committed = self.write(&name, result, expected).map_err(|e| match e {
            ScopeError::Store(StoreError::AlreadyExists { name }) => {
                ScopeError::Store(StoreError::VersionConflict {
                    name,
                    expected: None,
                    actual: None,
                })
            }
            other => other,
        })?;
        Ok((status, committed))
    }
}

/// Returns the version a writer's claim is recorded under.
fn manager_version(obj: &Object) -> APIVersion {
    APIVersion::new(obj.api_version().unwrap_or_default())
}
