//! Set type for field ownership tracking.

use super::path::FieldPath;
use std::collections::BTreeSet;
use std::fmt;

/// FieldSet is a sorted set of top-level field paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    members: BTreeSet<FieldPath>,
}

impl FieldSet {
    /// Creates a new empty set.
    pub fn new() -> Self {
        FieldSet {
            members: BTreeSet::new(),
        }
    }

    /// Returns the number of fields in the set.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns true if the set contains the given path.
    pub fn has(&self, path: &FieldPath) -> bool {
        self.members.contains(path)
    }

    /// Inserts a path, returning false if it was already present.
    pub fn insert(&mut self, path: impl Into<FieldPath>) -> bool {
        self.members.insert(path.into())
    }

    /// Removes a path, returning true if it was present.
    pub fn remove(&mut self, path: &FieldPath) -> bool {
        self.members.remove(path)
    }

    /// Returns an iterator over the paths in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldPath> {
        self.members.iter()
    }

    /// Returns the union of two sets.
    pub fn union(&self, other: &FieldSet) -> FieldSet {
        FieldSet {
            members: self.members.union(&other.members).cloned().collect(),
        }
    }

    /// Returns the intersection of two sets.
    pub fn intersection(&self, other: &FieldSet) -> FieldSet {
        FieldSet {
            members: self.members.intersection(&other.members).cloned().collect(),
        }
    }

    /// Returns the difference of two sets (self - other).
    pub fn difference(&self, other: &FieldSet) -> FieldSet {
        FieldSet {
            members: self.members.difference(&other.members).cloned().collect(),
        }
    }

    /// Returns true if every path in self is also in other.
    pub fn is_subset(&self, other: &FieldSet) -> bool {
        self.members.is_subset(&other.members)
    }
}

impl<P: Into<FieldPath>> FromIterator<P> for FieldSet {
    fn from_iter<T: IntoIterator<Item = P>>(iter: T) -> Self {
        FieldSet {
            members: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl IntoIterator for FieldSet {
    type Item = FieldPath;
    type IntoIter = std::collections::btree_set::IntoIter<FieldPath>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_iter()
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = &'a FieldPath;
    type IntoIter = std::collections::btree_set::Iter<'a, FieldPath>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

impl fmt::Display for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, path) in self.members.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", path)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> FieldSet {
        names.iter().copied().collect()
    }

    #[test]
    fn test_set_operations() {
        let ab = set(&["a", "b"]);
        let bc = set(&["b", "c"]);

        assert_eq!(ab.union(&bc), set(&["a", "b", "c"]));
        assert_eq!(ab.intersection(&bc), set(&["b"]));
        assert_eq!(ab.difference(&bc), set(&["a"]));
        assert!(set(&["b"]).is_subset(&ab));
        assert!(!ab.is_subset(&bc));
    }

    #[test]
    fn test_insert_dedups() {
        let mut s = FieldSet::new();
        assert!(s.insert("x"));
        assert!(!s.insert("x"));
        assert_eq!(s.len(), 1);
        assert!(s.remove(&FieldPath::from("x")));
        assert!(s.is_empty());
    }

    #[test]
    fn test_display_sorted() {
        assert_eq!(format!("{}", set(&["spec", "data"])), "{.data, .spec}");
    }
}
