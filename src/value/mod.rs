//! Value module - Type-erased objects in their canonical JSON form.
//!
//! Resources are handled as plain maps; kind-specific knowledge comes only from
//! the identity metadata each object carries.

mod object;

pub use object::*;
