//! Stable cell identity across structural edits.
//!
//! The [`IdentityMap`] mirrors the data source's shape (items per section) and
//! records, for every slot, the [`CellHandle`] of the materialized cell (if
//! any). Handles keep their identity when edits elsewhere renumber their
//! coordinate; [`IdentityMap::apply_transition`] rewrites every handle's
//! coordinate from one snapshot, so a partially remapped map is never
//! observable.

use slotmap::{new_key_type, SlotMap};

use crate::edit::{Changeset, StructuralEdit, Transition};
use crate::error::Result;
use crate::geometry::Size;
use crate::index_path::IndexPath;
use crate::native::Cell;

new_key_type! {
    /// Opaque identity of a constructed cell.
    ///
    /// A handle is created when a construction completes and stays valid
    /// until the cell is evicted (deleted, reloaded, or dropped by a full
    /// reload). Its recorded coordinate follows inserts, deletes and moves.
    pub struct CellHandle;
}

/// Item counts per section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionShape {
    sections: Vec<usize>,
}

impl CollectionShape {
    /// Create a shape from per-section item counts.
    pub fn new(sections: Vec<usize>) -> Self {
        Self { sections }
    }

    /// The number of sections.
    #[inline]
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// The number of items in `section`, or 0 if the section does not exist.
    #[inline]
    pub fn item_count(&self, section: usize) -> usize {
        self.sections.get(section).copied().unwrap_or(0)
    }

    /// Total number of items across all sections.
    pub fn total_items(&self) -> usize {
        self.sections.iter().sum()
    }

    /// Whether `index_path` addresses an existing item.
    #[inline]
    pub fn contains(&self, index_path: IndexPath) -> bool {
        index_path.item < self.item_count(index_path.section)
    }

    /// Per-section item counts.
    pub fn counts(&self) -> &[usize] {
        &self.sections
    }

    /// Iterate every index path in section-major order.
    pub fn index_paths(&self) -> impl Iterator<Item = IndexPath> + '_ {
        self.sections
            .iter()
            .enumerate()
            .flat_map(|(section, &count)| (0..count).map(move |item| IndexPath::new(section, item)))
    }
}

/// A constructed cell owned by the identity map.
#[derive(Clone)]
pub struct CellRecord {
    cell: Cell,
    index_path: IndexPath,
    size: Size,
}

impl CellRecord {
    /// The constructed cell.
    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    /// The coordinate this cell currently occupies.
    pub fn index_path(&self) -> IndexPath {
        self.index_path
    }

    /// The size measured right after construction.
    pub fn size(&self) -> Size {
        self.size
    }
}

impl std::fmt::Debug for CellRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellRecord")
            .field("index_path", &self.index_path)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// The coordinate change of a single handle produced by one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleRemap {
    pub handle: CellHandle,
    pub from: IndexPath,
    /// `None` when the handle was evicted (deleted or reloaded).
    pub to: Option<IndexPath>,
}

/// Every handle's fate after a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Remapping {
    entries: Vec<HandleRemap>,
}

impl Remapping {
    /// All entries, including unchanged handles.
    pub fn entries(&self) -> &[HandleRemap] {
        &self.entries
    }

    /// Handles whose coordinate changed but which survived.
    pub fn moved(&self) -> impl Iterator<Item = &HandleRemap> {
        self.entries
            .iter()
            .filter(|entry| entry.to.is_some_and(|to| to != entry.from))
    }

    /// Handles that were evicted.
    pub fn removed(&self) -> impl Iterator<Item = &HandleRemap> {
        self.entries.iter().filter(|entry| entry.to.is_none())
    }

    /// The new coordinate of `handle`, if it survived.
    pub fn destination(&self, handle: CellHandle) -> Option<IndexPath> {
        self.entries
            .iter()
            .find(|entry| entry.handle == handle)
            .and_then(|entry| entry.to)
    }
}

/// Mapping between index paths and constructed cell handles.
#[derive(Default)]
pub struct IdentityMap {
    slots: Vec<Vec<Option<CellHandle>>>,
    records: SlotMap<CellHandle, CellRecord>,
}

impl IdentityMap {
    /// Create an empty map for `shape`.
    pub fn new(shape: &CollectionShape) -> Self {
        let mut map = Self::default();
        map.reset(shape);
        map
    }

    /// Drop every cell and mirror `shape` with empty slots.
    pub fn reset(&mut self, shape: &CollectionShape) {
        self.records.clear();
        self.slots = shape.counts().iter().map(|&count| vec![None; count]).collect();
    }

    /// The mirrored shape.
    pub fn shape(&self) -> CollectionShape {
        CollectionShape::new(self.slots.iter().map(Vec::len).collect())
    }

    /// Whether `index_path` addresses a mirrored slot.
    pub fn contains(&self, index_path: IndexPath) -> bool {
        self.slots
            .get(index_path.section)
            .is_some_and(|items| index_path.item < items.len())
    }

    /// The handle materialized at `index_path`, if any.
    pub fn resolve(&self, index_path: IndexPath) -> Option<CellHandle> {
        self.slots
            .get(index_path.section)
            .and_then(|items| items.get(index_path.item))
            .copied()
            .flatten()
    }

    /// The record behind `handle`.
    pub fn get(&self, handle: CellHandle) -> Option<&CellRecord> {
        self.records.get(handle)
    }

    /// The record materialized at `index_path`, if any.
    pub fn record_at(&self, index_path: IndexPath) -> Option<&CellRecord> {
        self.resolve(index_path).and_then(|handle| self.records.get(handle))
    }

    /// Number of materialized cells.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate all handles with their records.
    pub fn iter(&self) -> impl Iterator<Item = (CellHandle, &CellRecord)> {
        self.records.iter()
    }

    /// Take ownership of a freshly constructed cell and assign it to
    /// `index_path`.
    ///
    /// Returns `None` if the coordinate is not part of the mirrored shape, in
    /// which case the cell is dropped.
    pub fn insert(&mut self, index_path: IndexPath, cell: Cell, size: Size) -> Option<CellHandle> {
        if !self.contains(index_path) {
            return None;
        }
        let handle = self.records.insert(CellRecord {
            cell,
            index_path,
            size,
        });
        self.assign(index_path, handle);
        Some(handle)
    }

    /// Place an existing handle at `index_path`.
    ///
    /// A different handle already occupying the slot is evicted; the handle's
    /// previous slot (if any) is cleared. Returns `false` when either the
    /// handle is unknown or the coordinate is not mirrored.
    pub fn assign(&mut self, index_path: IndexPath, handle: CellHandle) -> bool {
        if !self.contains(index_path) {
            return false;
        }
        let Some(previous) = self.records.get(handle).map(CellRecord::index_path) else {
            return false;
        };
        if previous != index_path && self.resolve(previous) == Some(handle) {
            self.slots[previous.section][previous.item] = None;
        }
        if let Some(occupant) = self.slots[index_path.section][index_path.item].replace(handle) {
            if occupant != handle {
                self.records.remove(occupant);
            }
        }
        if let Some(record) = self.records.get_mut(handle) {
            record.index_path = index_path;
        }
        true
    }

    /// Evict the cell at `index_path`, leaving the slot empty.
    pub fn evict(&mut self, index_path: IndexPath) -> Option<CellRecord> {
        let handle = self
            .slots
            .get_mut(index_path.section)
            .and_then(|items| items.get_mut(index_path.item))
            .and_then(Option::take)?;
        self.records.remove(handle)
    }

    /// Apply a single edit against the data source's current shape.
    ///
    /// Convenience for one-edit flushes; the coordinator batches edits with
    /// [`Changeset`] and calls [`apply_transition`](Self::apply_transition).
    pub fn apply_edit(
        &mut self,
        edit: StructuralEdit,
        current: &CollectionShape,
    ) -> Result<Remapping> {
        let mut changeset = Changeset::default();
        changeset.push(edit);
        let transition = changeset.resolve(&self.shape(), current)?;
        Ok(self.apply_transition(&transition))
    }

    /// Rebuild the slots for the transition's post-edit shape and move every
    /// handle to its new coordinate.
    ///
    /// Handles whose coordinate was deleted or reloaded are evicted; their new
    /// slot (for reloads) stays empty so the cell is constructed again.
    pub fn apply_transition(&mut self, transition: &Transition) -> Remapping {
        let mut slots: Vec<Vec<Option<CellHandle>>> = transition
            .new_shape()
            .counts()
            .iter()
            .map(|&count| vec![None; count])
            .collect();

        let mut entries = Vec::with_capacity(self.records.len());
        let mut evicted = Vec::new();

        for (handle, record) in self.records.iter_mut() {
            let from = record.index_path;
            let to = transition.map(from).filter(|to| {
                slots
                    .get(to.section)
                    .is_some_and(|items| to.item < items.len())
            });
            match to {
                Some(to) => {
                    slots[to.section][to.item] = Some(handle);
                    record.index_path = to;
                }
                None => evicted.push(handle),
            }
            entries.push(HandleRemap { handle, from, to });
        }

        for handle in evicted {
            self.records.remove(handle);
        }
        self.slots = slots;
        entries.sort_by_key(|entry| entry.from);
        Remapping { entries }
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("shape", &self.shape())
            .field("cells", &self.records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::index_path::section_set;
    use crate::native::CellNode;

    struct Label(&'static str);

    impl CellNode for Label {
        fn measure(&self, constrained: Size) -> Size {
            Size::new(constrained.width, 20.0)
        }
    }

    fn cell(name: &'static str) -> Cell {
        Arc::new(Label(name))
    }

    fn filled(counts: Vec<usize>) -> (IdentityMap, Vec<CellHandle>) {
        let shape = CollectionShape::new(counts);
        let mut map = IdentityMap::new(&shape);
        let handles = shape
            .index_paths()
            .collect::<Vec<_>>()
            .into_iter()
            .map(|path| map.insert(path, cell("row"), Size::ZERO).unwrap())
            .collect();
        (map, handles)
    }

    #[test]
    fn test_insert_and_resolve() {
        let mut map = IdentityMap::new(&CollectionShape::new(vec![3]));
        let handle = map.insert(IndexPath::new(0, 1), cell("a"), Size::new(10.0, 20.0)).unwrap();
        assert_eq!(map.resolve(IndexPath::new(0, 1)), Some(handle));
        assert_eq!(map.resolve(IndexPath::new(0, 0)), None);
        assert_eq!(map.get(handle).unwrap().size(), Size::new(10.0, 20.0));
        assert!(map.insert(IndexPath::new(1, 0), cell("b"), Size::ZERO).is_none());
    }

    #[test]
    fn test_assign_moves_handle_and_evicts_occupant() {
        let (mut map, handles) = filled(vec![3]);
        assert!(map.assign(IndexPath::new(0, 2), handles[0]));
        assert_eq!(map.resolve(IndexPath::new(0, 0)), None);
        assert_eq!(map.resolve(IndexPath::new(0, 2)), Some(handles[0]));
        assert!(map.get(handles[2]).is_none());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_insert_at_head_shifts_every_handle() {
        let (mut map, handles) = filled(vec![10]);
        let remap = map
            .apply_edit(
                StructuralEdit::InsertItems(vec![IndexPath::new(0, 0)]),
                &CollectionShape::new(vec![11]),
            )
            .unwrap();

        assert_eq!(map.shape(), CollectionShape::new(vec![11]));
        assert_eq!(map.resolve(IndexPath::new(0, 0)), None);
        for (item, handle) in handles.iter().enumerate() {
            assert_eq!(map.resolve(IndexPath::new(0, item + 1)), Some(*handle));
            assert_eq!(remap.destination(*handle), Some(IndexPath::new(0, item + 1)));
        }
        assert_eq!(remap.moved().count(), 10);
    }

    #[test]
    fn test_reload_discards_handle() {
        let (mut map, handles) = filled(vec![3]);
        let remap = map
            .apply_edit(
                StructuralEdit::ReloadItems(vec![IndexPath::new(0, 1)]),
                &CollectionShape::new(vec![3]),
            )
            .unwrap();
        assert_eq!(map.resolve(IndexPath::new(0, 1)), None);
        assert!(map.get(handles[1]).is_none());
        assert_eq!(remap.removed().count(), 1);
        assert_eq!(map.resolve(IndexPath::new(0, 2)), Some(handles[2]));
    }

    #[test]
    fn test_delete_section_shifts_following_sections() {
        let (mut map, handles) = filled(vec![1, 1, 1]);
        map.apply_edit(
            StructuralEdit::DeleteSections(section_set([0])),
            &CollectionShape::new(vec![1, 1]),
        )
        .unwrap();
        assert_eq!(map.resolve(IndexPath::new(0, 0)), Some(handles[1]));
        assert_eq!(map.resolve(IndexPath::new(1, 0)), Some(handles[2]));
        assert!(map.get(handles[0]).is_none());
    }

    #[test]
    fn test_failed_edit_leaves_map_untouched() {
        let (mut map, handles) = filled(vec![2]);
        let result = map.apply_edit(
            StructuralEdit::DeleteItems(vec![IndexPath::new(0, 0)]),
            &CollectionShape::new(vec![2]),
        );
        assert!(result.unwrap_err().is_inconsistent_update());
        assert_eq!(map.resolve(IndexPath::new(0, 0)), Some(handles[0]));
        assert_eq!(map.len(), 2);
    }
}
