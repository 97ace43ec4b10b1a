//! Index paths for addressing items in a sectioned collection.
//!
//! An [`IndexPath`] is a plain `(section, item)` coordinate. It carries no
//! identity: after structural edits, a previously obtained index path may
//! point at a different logical row. Use [`crate::CellHandle`] for identity.

use std::collections::BTreeSet;
use std::fmt;

/// A `(section, item)` coordinate in the collection.
///
/// Index paths order by section first, then item.
///
/// # Example
///
/// ```
/// use horizon_lattice_collection::IndexPath;
///
/// let a = IndexPath::new(0, 5);
/// let b = IndexPath::new(1, 0);
/// assert!(a < b);
/// assert_eq!(a.to_string(), "[0, 5]");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct IndexPath {
    /// The section containing the item.
    pub section: usize,
    /// The item within its section.
    pub item: usize,
}

impl IndexPath {
    /// Create a new index path.
    #[inline]
    pub const fn new(section: usize, item: usize) -> Self {
        Self { section, item }
    }

    /// Returns a copy of this index path in another section.
    #[inline]
    pub const fn with_section(self, section: usize) -> Self {
        Self {
            section,
            item: self.item,
        }
    }

    /// Returns a copy of this index path at another item position.
    #[inline]
    pub const fn with_item(self, item: usize) -> Self {
        Self {
            section: self.section,
            item,
        }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.section, self.item)
    }
}

impl From<(usize, usize)> for IndexPath {
    fn from((section, item): (usize, usize)) -> Self {
        Self { section, item }
    }
}

/// An ordered, de-duplicated set of section indices.
pub type SectionSet = BTreeSet<usize>;

/// Build a [`SectionSet`] from any iterator of section indices.
pub fn section_set(sections: impl IntoIterator<Item = usize>) -> SectionSet {
    sections.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_section_major() {
        let mut paths = vec![
            IndexPath::new(1, 0),
            IndexPath::new(0, 3),
            IndexPath::new(0, 1),
        ];
        paths.sort();
        assert_eq!(
            paths,
            vec![
                IndexPath::new(0, 1),
                IndexPath::new(0, 3),
                IndexPath::new(1, 0)
            ]
        );
    }

    #[test]
    fn test_with_accessors() {
        let path = IndexPath::new(2, 7);
        assert_eq!(path.with_section(0), IndexPath::new(0, 7));
        assert_eq!(path.with_item(1), IndexPath::new(2, 1));
    }

    #[test]
    fn test_section_set_dedups() {
        let set = section_set([3, 1, 3, 2]);
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
