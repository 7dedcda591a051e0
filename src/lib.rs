//! # Metaserver Scope
//!
//! A capability-scoped request context for serving arbitrary resource kinds
//! from a node-local object store.
//!
//! A route is assembled once into a [`RequestScope`] holding one instance of
//! each capability (naming, negotiation, typing, conversion, defaulting,
//! authorization, identity mapping, field ownership). The generic
//! [`Handler`] runs every request through those capabilities in a fixed
//! order. Field ownership is tracked per top-level key, without a schema.
//!
//! ## Modules
//!
//! - [`value`] - Schema-less object handle over a JSON map
//! - [`fieldpath`] - Field paths, field sets and the `managedFields` record
//! - [`merge`] - The top-level field ownership tracker and apply conflicts
//! - [`identity`] - Resource identities and equivalence mapping
//! - [`naming`] - Namespace and name resolution from generic metadata
//! - [`serializer`] - Codecs and media type negotiation
//! - [`typer`] - Kind resolution from embedded type metadata
//! - [`convert`] - Conversion and defaulting to the stored representation
//! - [`auth`] - The authorization decision point
//! - [`scope`] - Route configuration and request scope assembly
//! - [`store`] - The compare-and-swap object store boundary
//! - [`handler`] - The request pipeline
//! - [`config`] - Node configuration factories

pub mod auth;
pub mod config;
pub mod convert;
pub mod error;
pub mod fieldpath;
pub mod handler;
pub mod identity;
pub mod merge;
pub mod naming;
pub mod scope;
pub mod serializer;
pub mod store;
pub mod typer;
pub mod value;

pub use error::{ScopeError, StatusClass};
pub use fieldpath::{APIVersion, FieldPath, FieldSet, ManagedFieldEntry, ManagedFieldSet, Operation};
pub use handler::{Handler, Request, Response};
pub use identity::ResourceIdentity;
pub use merge::{Conflict, Conflicts, FieldOwnershipTracker, TopLevelFieldManager};
pub use scope::{RequestScope, RouteConfig};
pub use store::{MemoryStore, ObjectStore};
pub use value::Object;
