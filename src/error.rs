//! Request-level error taxonomy.

use crate::merge::{Conflicts, OwnershipError};
use crate::naming::IdentityError;
use crate::serializer::{CodecError, NegotiationError};
use crate::store::StoreError;
use crate::typer::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Delay suggested to clients that lost an optimistic-concurrency race.
pub const VERSION_CONFLICT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// StatusClass is the outcome class reported to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusClass {
    Ok,
    Created,
    BadRequest,
    Forbidden,
    NotFound,
    Conflict,
    NotAcceptable,
    PayloadTooLarge,
    UnsupportedMediaType,
    InternalError,
}

impl StatusClass {
    /// Returns the HTTP status code for this class.
    pub fn code(&self) -> u16 {
        match self {
            StatusClass::Ok => 200,
            StatusClass::Created => 201,
            StatusClass::BadRequest => 400,
            StatusClass::Forbidden => 403,
            StatusClass::NotFound => 404,
            StatusClass::Conflict => 409,
            StatusClass::NotAcceptable => 406,
            StatusClass::PayloadTooLarge => 413,
            StatusClass::UnsupportedMediaType => 415,
            StatusClass::InternalError => 500,
        }
    }

    /// Returns the machine-readable reason used in `Status` objects.
    pub fn reason(&self) -> &'static str {
        match self {
            StatusClass::Ok | StatusClass::Created => "",
            StatusClass::BadRequest => "BadRequest",
            StatusClass::Forbidden => "Forbidden",
            StatusClass::NotFound => "NotFound",
            StatusClass::Conflict => "Conflict",
            StatusClass::NotAcceptable => "NotAcceptable",
            StatusClass::PayloadTooLarge => "RequestEntityTooLarge",
            StatusClass::UnsupportedMediaType => "UnsupportedMediaType",
            StatusClass::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.code(), self)
    }
}

/// ScopeError is any failure of the request pipeline.
///
/// None of these are retried internally.
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("invalid object identity: {0}")]
    Identity(#[from] IdentityError),

    #[error("{0}")]
    Negotiation(#[from] NegotiationError),

    #[error("{0}")]
    Decode(#[from] CodecError),

    #[error("cannot determine object type: {0}")]
    Type(#[from] TypeError),

    #[error("kind {kind} is not served by route {route}")]
    KindMismatch { kind: String, route: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("request body of {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("{0}")]
    FieldConflict(Conflicts),

    #[error("field manager is required for apply")]
    MissingFieldManager,

    #[error("invalid resourceVersion {0:?}")]
    InvalidResourceVersion(String),

    #[error("invalid route configuration: {0}")]
    InvalidRoute(String),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ScopeError {
    /// Maps the error to the status class the transport reports.
    pub fn status(&self) -> StatusClass {
        match self {
            ScopeError::Identity(_)
            | ScopeError::Decode(_)
            | ScopeError::Type(_)
            | ScopeError::KindMismatch { .. }
            | ScopeError::MissingFieldManager
            | ScopeError::InvalidResourceVersion(_) => StatusClass::BadRequest,
            ScopeError::Negotiation(NegotiationError::UnsupportedMediaType { .. }) => {
                StatusClass::UnsupportedMediaType
            }
            ScopeError::Negotiation(NegotiationError::NotAcceptable { .. }) => StatusClass::NotAcceptable,
            ScopeError::Negotiation(_) => StatusClass::BadRequest,
            ScopeError::Forbidden(_) => StatusClass::Forbidden,
            ScopeError::PayloadTooLarge { .. } => StatusClass::PayloadTooLarge,
            ScopeError::FieldConflict(_) => StatusClass::Conflict,
            ScopeError::Store(StoreError::NotFound { .. }) => StatusClass::NotFound,
            ScopeError::Store(StoreError::AlreadyExists { .. })
            | ScopeError::Store(StoreError::VersionConflict { .. }) => StatusClass::Conflict,
            ScopeError::Store(StoreError::Unavailable(_))
            | ScopeError::InvalidRoute(_)
            | ScopeError::Internal(_) => StatusClass::InternalError,
        }
    }

    /// Returns the Retry-After hint, set only for version conflicts.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ScopeError::Store(StoreError::VersionConflict { .. }) => Some(VERSION_CONFLICT_RETRY_AFTER),
            _ => None,
        }
    }

    /// Returns the contested fields of a field conflict.
    pub fn conflicts(&self) -> Option<&Conflicts> {
        match self {
            ScopeError::FieldConflict(c) => Some(c),
            _ => None,
        }
    }
}

impl From<OwnershipError> for ScopeError {
    fn from(err: OwnershipError) -> Self {
        match err {
            OwnershipError::Conflicts(conflicts) => ScopeError::FieldConflict(conflicts),
            OwnershipError::Serialize(e) => ScopeError::Internal(format!("recording managed fields: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldpath::FieldPath;
    use crate::merge::Conflict;

    #[test]
    fn test_status_mapping() {
        let mut conflicts = Conflicts::new();
        conflicts.add(Conflict::new("m", FieldPath::new("x")));

        let cases = vec![
            (ScopeError::Identity(IdentityError::MissingName), StatusClass::BadRequest),
            (ScopeError::Type(TypeError::AmbiguousType("kind")), StatusClass::BadRequest),
            (ScopeError::PayloadTooLarge { size: 2, limit: 1 }, StatusClass::PayloadTooLarge),
            (ScopeError::FieldConflict(conflicts), StatusClass::Conflict),
            (
                ScopeError::Negotiation(NegotiationError::NotAcceptable {
                    accepted: vec![],
                    supported: vec![],
                }),
                StatusClass::NotAcceptable,
            ),
            (
                ScopeError::Store(StoreError::VersionConflict {
                    name: "n".to_string(),
                    expected: Some(1),
                    actual: Some(2),
                }),
                StatusClass::Conflict,
            ),
            (ScopeError::Forbidden("no".to_string()), StatusClass::Forbidden),
            (ScopeError::InvalidResourceVersion("x".to_string()), StatusClass::BadRequest),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{}", err);
        }
    }

    #[test]
    fn test_retry_after_only_for_version_conflicts() {
        let vc = ScopeError::Store(StoreError::VersionConflict {
            name: "n".to_string(),
            expected: Some(1),
            actual: Some(2),
        });
        assert_eq!(vc.retry_after(), Some(VERSION_CONFLICT_RETRY_AFTER));
        assert_eq!(ScopeError::FieldConflict(Conflicts::new()).retry_after(), None);
    }

    #[test]
    fn test_ownership_conflicts_become_field_conflict() {
        let mut conflicts = Conflicts::new();
        conflicts.add(Conflict::new("m", FieldPath::new("x")));
        let err = ScopeError::from(OwnershipError::Conflicts(conflicts));
        assert_eq!(err.status(), StatusClass::Conflict);
        assert_eq!(err.conflicts().map(|c| c.len()), Some(1));
    }

    #[test]
    fn test_messages() {
        let mut conflicts = Conflicts::new();
        conflicts.add(Conflict::new("m", FieldPath::new("x")));
        let msg = OwnershipError::Conflicts(conflicts).to_string();
        assert!(msg.starts_with("apply failed with 1 conflict(s): "), "{}", msg);

        let err = ScopeError::Internal("encoding response: broken".to_string());
        assert_eq!(err.to_string(), "internal error: encoding response: broken");
        assert_eq!(err.status(), StatusClass::InternalError);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(StatusClass::PayloadTooLarge.code(), 413);
        assert_eq!(format!("{}", StatusClass::Conflict), "409 Conflict");
    }
}
