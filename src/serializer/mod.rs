//! Serializer module - Content negotiation for type-erased payloads.
//!
//! Serializers are registered once when a route is assembled. Each request
//! then resolves an encoder from its accepted media types and a decoder from
//! its content type.

mod codec;
mod negotiation;

pub use codec::*;
pub use negotiation::*;
