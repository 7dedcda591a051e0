//! Merge module - Ownership bookkeeping for Apply and Update writes.
//!
//! This module tracks which manager last supplied each top-level field.

mod conflict;
mod tracker;


pub use conflict::*;
pub use tracker::*;
