//! Field path type.

use std::fmt;

/// FieldPath names one top-level property of an object's payload.
///
/// Without a schema there is no way to tell an atomic nested value from a
/// granular one, so paths stop at the first level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(String);

impl FieldPath {
    /// Creates a new field path.
    pub fn new(name: impl Into<String>) -> Self {
        FieldPath(name.into())
    }

    /// Returns the field name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldPath {
    fn from(s: &str) -> Self {
        FieldPath(s.to_string())
    }
}

impl From<String> for FieldPath {
    fn from(s: String) -> Self {
        FieldPath(s)
    }
}

impl AsRef<str> for FieldPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_path_display() {
        assert_eq!(format!("{}", FieldPath::new("spec")), ".spec");
    }

    #[test]
    fn test_field_path_ordering() {
        assert!(FieldPath::from("a") < FieldPath::from("b"));
        assert_eq!(FieldPath::from("x"), FieldPath::new(String::from("x")));
    }
}
