//! Conflict types for apply operations.

use crate::fieldpath::{FieldPath, FieldSet};
use std::fmt;

/// Conflict represents a single contested field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The manager that owns the conflicting field.
    pub manager: String,
    /// The contested field.
    pub path: FieldPath,
}

impl Conflict {
    /// Creates a new conflict.
    pub fn new(manager: impl Into<String>, path: FieldPath) -> Self {
        Conflict {
            manager: manager.into(),
            path,
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conflict with manager '{}' at {}", self.manager, self.path)
    }
}

impl std::error::Error for Conflict {}

/// Conflicts is a collection of conflicts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conflicts {
    conflicts: Vec<Conflict>,
}

impl Conflicts {
    /// Creates a new empty Conflicts collection.
    pub fn new() -> Self {
        Conflicts {
            conflicts: Vec::new(),
        }
    }

    /// Adds a conflict.
    pub fn add(&mut self, conflict: Conflict) {
        self.conflicts.push(conflict);
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    /// Returns an iterator over the conflicts.
    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter()
    }

    /// Converts the conflicts to the set of contested paths.
    pub fn to_set(&self) -> FieldSet {
        self.conflicts.iter().map(|c| c.path.clone()).collect()
    }

    /// Returns the distinct managers involved.
    pub fn managers(&self) -> Vec<&str> {
        let mut managers: Vec<&str> = self.conflicts.iter().map(|c| c.manager.as_str()).collect();
        managers.sort_unstable();
        managers.dedup();
        managers
    }
}

impl IntoIterator for Conflicts {
    type Item = Conflict;
    type IntoIter = std::vec::IntoIter<Conflict>;

    fn into_iter(self) -> Self::IntoIter {
        self.conflicts.into_iter()
    }
}

impl fmt::Display for Conflicts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, conflict) in self.conflicts.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", conflict)?;
        }
        Ok(())
    }
}

impl std::error::Error for Conflicts {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_display() {
        let conflict = Conflict::new("manager1", FieldPath::new("spec"));
        assert_eq!(
            format!("{}", conflict),
            "conflict with manager 'manager1' at .spec"
        );
    }

    #[test]
    fn test_conflicts_collection() {
        let mut conflicts = Conflicts::new();
        assert!(conflicts.is_empty());

        conflicts.add(Conflict::new("m2", FieldPath::new("b")));
        conflicts.add(Conflict::new("m1", FieldPath::new("a")));
        conflicts.add(Conflict::new("m1", FieldPath::new("b")));
        assert_eq!(conflicts.len(), 3);
        assert_eq!(conflicts.managers(), vec!["m1", "m2"]);
        assert_eq!(conflicts.to_set(), ["a", "b"].into_iter().collect());
    }
}
