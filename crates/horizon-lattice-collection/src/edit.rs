//! Structural edits and their resolution into a coordinate transition.
//!
//! Edits collected between two flushes form a [`Changeset`]. Deletes,
//! reloads and move sources address *pre-update* coordinates; inserts and
//! move destinations address *post-update* coordinates. Resolving a
//! changeset against the data source's current shape validates it and yields
//! a [`Transition`]: a total map from every pre-update coordinate to its
//! post-update coordinate (or removal).

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{CollectionError, Result};
use crate::identity::CollectionShape;
use crate::index_path::{IndexPath, SectionSet};

/// A single structural edit submitted by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralEdit {
    InsertSections(SectionSet),
    DeleteSections(SectionSet),
    ReloadSections(SectionSet),
    MoveSection { from: usize, to: usize },
    InsertItems(Vec<IndexPath>),
    DeleteItems(Vec<IndexPath>),
    ReloadItems(Vec<IndexPath>),
    MoveItem { from: IndexPath, to: IndexPath },
}

impl StructuralEdit {
    /// Check the edit's pre-update coordinates against the mirrored shape.
    ///
    /// Inserts and move destinations refer to the post-update shape, which is
    /// only known at flush time, so they are not checked here.
    pub fn validate_against(&self, shape: &CollectionShape) -> Result<()> {
        match self {
            Self::DeleteSections(sections) | Self::ReloadSections(sections) => {
                sections.iter().try_for_each(|&section| check_section(shape, section))
            }
            Self::MoveSection { from, .. } => check_section(shape, *from),
            Self::DeleteItems(paths) | Self::ReloadItems(paths) => {
                paths.iter().try_for_each(|&path| check_item(shape, path))
            }
            Self::MoveItem { from, .. } => check_item(shape, *from),
            Self::InsertSections(_) | Self::InsertItems(_) => Ok(()),
        }
    }

    /// Whether the edit carries no coordinates.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::InsertSections(sections)
            | Self::DeleteSections(sections)
            | Self::ReloadSections(sections) => sections.is_empty(),
            Self::InsertItems(paths) | Self::DeleteItems(paths) | Self::ReloadItems(paths) => {
                paths.is_empty()
            }
            Self::MoveSection { .. } | Self::MoveItem { .. } => false,
        }
    }
}

fn check_section(shape: &CollectionShape, section: usize) -> Result<()> {
    if section < shape.section_count() {
        Ok(())
    } else {
        Err(CollectionError::SectionOutOfBounds {
            section,
            count: shape.section_count(),
        })
    }
}

fn check_item(shape: &CollectionShape, index_path: IndexPath) -> Result<()> {
    check_section(shape, index_path.section)?;
    if shape.contains(index_path) {
        Ok(())
    } else {
        Err(CollectionError::IndexOutOfBounds {
            index_path,
            count: shape.item_count(index_path.section),
        })
    }
}

/// The ordered list of edits handed to the native widget in one call.
///
/// Sections come before items; within each level the order is always
/// deletes, inserts, moves, reloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateBatch {
    edits: Vec<StructuralEdit>,
}

impl UpdateBatch {
    pub fn edits(&self) -> &[StructuralEdit] {
        &self.edits
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

/// Edits accumulated between two flushes.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    delete_sections: BTreeSet<usize>,
    insert_sections: BTreeSet<usize>,
    reload_sections: BTreeSet<usize>,
    move_sections: Vec<(usize, usize)>,
    delete_items: BTreeSet<IndexPath>,
    insert_items: BTreeSet<IndexPath>,
    reload_items: BTreeSet<IndexPath>,
    move_items: Vec<(IndexPath, IndexPath)>,
    submitted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionOrigin {
    Inserted,
    Existing(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOrigin {
    Inserted,
    Existing(IndexPath),
}

impl Changeset {
    /// Add an edit in submission order.
    pub fn push(&mut self, edit: StructuralEdit) {
        self.submitted += 1;
        match edit {
            StructuralEdit::InsertSections(sections) => self.insert_sections.extend(sections),
            StructuralEdit::DeleteSections(sections) => self.delete_sections.extend(sections),
            StructuralEdit::ReloadSections(sections) => self.reload_sections.extend(sections),
            StructuralEdit::MoveSection { from, to } => self.move_sections.push((from, to)),
            StructuralEdit::InsertItems(paths) => self.insert_items.extend(paths),
            StructuralEdit::DeleteItems(paths) => self.delete_items.extend(paths),
            StructuralEdit::ReloadItems(paths) => self.reload_items.extend(paths),
            StructuralEdit::MoveItem { from, to } => self.move_items.push((from, to)),
        }
    }

    /// Number of edits submitted into this changeset.
    pub fn len(&self) -> usize {
        self.submitted
    }

    pub fn is_empty(&self) -> bool {
        self.submitted == 0
    }

    /// The native update call for this changeset, in the fixed
    /// delete, insert, move, reload order per level.
    pub fn native_updates(&self) -> UpdateBatch {
        let mut edits = Vec::new();
        if !self.delete_sections.is_empty() {
            edits.push(StructuralEdit::DeleteSections(self.delete_sections.clone()));
        }
        if !self.insert_sections.is_empty() {
            edits.push(StructuralEdit::InsertSections(self.insert_sections.clone()));
        }
        edits.extend(
            self.move_sections
                .iter()
                .map(|&(from, to)| StructuralEdit::MoveSection { from, to }),
        );
        if !self.reload_sections.is_empty() {
            edits.push(StructuralEdit::ReloadSections(self.reload_sections.clone()));
        }
        if !self.delete_items.is_empty() {
            edits.push(StructuralEdit::DeleteItems(
                self.delete_items.iter().copied().collect(),
            ));
        }
        if !self.insert_items.is_empty() {
            edits.push(StructuralEdit::InsertItems(
                self.insert_items.iter().copied().collect(),
            ));
        }
        edits.extend(
            self.move_items
                .iter()
                .map(|&(from, to)| StructuralEdit::MoveItem { from, to }),
        );
        if !self.reload_items.is_empty() {
            edits.push(StructuralEdit::ReloadItems(
                self.reload_items.iter().copied().collect(),
            ));
        }
        UpdateBatch { edits }
    }

    /// Validate the changeset and compute the coordinate transition.
    ///
    /// `old` is the mirrored shape the edits were submitted against and
    /// `current` the shape the data source reports now. Any mismatch between
    /// `old` plus the edits and `current` is a precondition violation.
    pub fn resolve(&self, old: &CollectionShape, current: &CollectionShape) -> Result<Transition> {
        self.check_pre_update_bounds(old)?;

        let old_sections = old.section_count();
        let move_sources: HashSet<usize> =
            self.move_sections.iter().map(|&(from, _)| from).collect();

        let mut claimed = HashSet::new();
        for &section in self
            .delete_sections
            .iter()
            .chain(&self.reload_sections)
            .chain(self.move_sections.iter().map(|(from, _)| from))
        {
            if !claimed.insert(section) {
                return Err(CollectionError::conflict(format!(
                    "section {section} is deleted, reloaded or moved more than once"
                )));
            }
        }

        // Section order after the update.
        let survivors: Vec<usize> = (0..old_sections)
            .filter(|section| {
                !self.delete_sections.contains(section) && !move_sources.contains(section)
            })
            .collect();
        let new_count = survivors.len() + self.insert_sections.len() + self.move_sections.len();
        if new_count != current.section_count() {
            return Err(CollectionError::InconsistentSectionCount {
                expected: new_count,
                actual: current.section_count(),
            });
        }

        let mut order: Vec<Option<SectionOrigin>> = vec![None; new_count];
        let placements = self
            .insert_sections
            .iter()
            .map(|&section| (section, SectionOrigin::Inserted))
            .chain(
                self.move_sections
                    .iter()
                    .map(|&(from, to)| (to, SectionOrigin::Existing(from))),
            );
        for (section, origin) in placements {
            let slot = order.get_mut(section).ok_or(CollectionError::SectionOutOfBounds {
                section,
                count: new_count,
            })?;
            if slot.replace(origin).is_some() {
                return Err(CollectionError::conflict(format!(
                    "section {section} is the destination of more than one insert or move"
                )));
            }
        }
        let mut remaining = survivors.into_iter();
        let order: Vec<SectionOrigin> = order
            .into_iter()
            .map(|slot| slot.or_else(|| remaining.next().map(SectionOrigin::Existing)))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| CollectionError::conflict("section placement left a gap"))?;

        let fresh: Vec<bool> = order
            .iter()
            .map(|origin| match origin {
                SectionOrigin::Inserted => true,
                SectionOrigin::Existing(old) => self.reload_sections.contains(old),
            })
            .collect();

        // Item edits addressing pre-update coordinates.
        let mut claimed_items = HashSet::new();
        let item_sources = self
            .delete_items
            .iter()
            .chain(&self.reload_items)
            .chain(self.move_items.iter().map(|(from, _)| from));
        for &path in item_sources {
            if self.delete_sections.contains(&path.section)
                || self.reload_sections.contains(&path.section)
            {
                return Err(CollectionError::conflict(format!(
                    "item {path} lies in a section that is deleted or reloaded in the same update"
                )));
            }
            if !claimed_items.insert(path) {
                return Err(CollectionError::conflict(format!(
                    "item {path} is deleted, reloaded or moved more than once"
                )));
            }
        }
        let item_move_sources: HashSet<IndexPath> =
            self.move_items.iter().map(|&(from, _)| from).collect();

        // Items arriving at post-update coordinates, grouped by new section.
        let mut incoming: BTreeMap<usize, Vec<(usize, ItemOrigin)>> = BTreeMap::new();
        let arrivals = self
            .insert_items
            .iter()
            .map(|&path| (path, ItemOrigin::Inserted))
            .chain(
                self.move_items
                    .iter()
                    .map(|&(from, to)| (to, ItemOrigin::Existing(from))),
            );
        for (path, origin) in arrivals {
            if path.section >= new_count {
                return Err(CollectionError::SectionOutOfBounds {
                    section: path.section,
                    count: new_count,
                });
            }
            if fresh[path.section] {
                return Err(CollectionError::conflict(format!(
                    "item {path} targets section {} which is inserted or reloaded in the same update",
                    path.section
                )));
            }
            incoming.entry(path.section).or_default().push((path.item, origin));
        }

        let mut map: Vec<Vec<Option<IndexPath>>> =
            old.counts().iter().map(|&count| vec![None; count]).collect();

        for (new_section, origin) in order.iter().enumerate() {
            let SectionOrigin::Existing(old_section) = *origin else {
                continue;
            };
            if fresh[new_section] {
                continue;
            }

            let survivors: Vec<IndexPath> = (0..old.item_count(old_section))
                .map(|item| IndexPath::new(old_section, item))
                .filter(|path| {
                    !self.delete_items.contains(path) && !item_move_sources.contains(path)
                })
                .collect();
            let arrivals = incoming.remove(&new_section).unwrap_or_default();
            let len = survivors.len() + arrivals.len();
            let actual = current.item_count(new_section);
            if len != actual {
                return Err(CollectionError::InconsistentUpdate {
                    section: new_section,
                    expected: len,
                    actual,
                });
            }

            let mut slots: Vec<Option<ItemOrigin>> = vec![None; len];
            for (item, origin) in arrivals {
                let slot = slots.get_mut(item).ok_or(CollectionError::IndexOutOfBounds {
                    index_path: IndexPath::new(new_section, item),
                    count: len,
                })?;
                if slot.replace(origin).is_some() {
                    return Err(CollectionError::conflict(format!(
                        "item {} is the destination of more than one insert or move",
                        IndexPath::new(new_section, item)
                    )));
                }
            }
            let mut remaining = survivors.into_iter();
            for (item, slot) in slots.iter().enumerate() {
                let origin = match slot {
                    Some(origin) => *origin,
                    None => match remaining.next() {
                        Some(path) => ItemOrigin::Existing(path),
                        None => continue,
                    },
                };
                if let ItemOrigin::Existing(from) = origin {
                    if !self.reload_items.contains(&from) {
                        map[from.section][from.item] = Some(IndexPath::new(new_section, item));
                    }
                }
            }
        }

        Ok(Transition {
            map,
            new_shape: current.clone(),
        })
    }

    fn check_pre_update_bounds(&self, old: &CollectionShape) -> Result<()> {
        for &section in self
            .delete_sections
            .iter()
            .chain(&self.reload_sections)
            .chain(self.move_sections.iter().map(|(from, _)| from))
        {
            check_section(old, section)?;
        }
        for &path in self
            .delete_items
            .iter()
            .chain(&self.reload_items)
            .chain(self.move_items.iter().map(|(from, _)| from))
        {
            check_item(old, path)?;
        }
        Ok(())
    }
}

/// A total map from pre-update to post-update coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    map: Vec<Vec<Option<IndexPath>>>,
    new_shape: CollectionShape,
}

impl Transition {
    /// The post-update coordinate of `from`, or `None` if the item was
    /// deleted, reloaded, or never existed.
    pub fn map(&self, from: IndexPath) -> Option<IndexPath> {
        self.map
            .get(from.section)
            .and_then(|items| items.get(from.item))
            .copied()
            .flatten()
    }

    /// The shape after the update.
    pub fn new_shape(&self) -> &CollectionShape {
        &self.new_shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_path::section_set;

    fn shape(counts: &[usize]) -> CollectionShape {
        CollectionShape::new(counts.to_vec())
    }

    fn resolve(edits: Vec<StructuralEdit>, old: &[usize], current: &[usize]) -> Result<Transition> {
        let mut changeset = Changeset::default();
        for edit in edits {
            changeset.push(edit);
        }
        changeset.resolve(&shape(old), &shape(current))
    }

    #[test]
    fn test_delete_and_insert_resolve_against_different_snapshots() {
        // Delete (0,1) in pre-update coordinates, insert (0,0) post-update.
        let transition = resolve(
            vec![
                StructuralEdit::DeleteItems(vec![IndexPath::new(0, 1)]),
                StructuralEdit::InsertItems(vec![IndexPath::new(0, 0)]),
            ],
            &[3],
            &[3],
        )
        .unwrap();
        assert_eq!(transition.map(IndexPath::new(0, 0)), Some(IndexPath::new(0, 1)));
        assert_eq!(transition.map(IndexPath::new(0, 1)), None);
        assert_eq!(transition.map(IndexPath::new(0, 2)), Some(IndexPath::new(0, 2)));
    }

    #[test]
    fn test_delete_then_insert_same_section_acts_as_reload() {
        let transition = resolve(
            vec![
                StructuralEdit::DeleteSections(section_set([1])),
                StructuralEdit::InsertSections(section_set([1])),
            ],
            &[2, 2, 2],
            &[2, 5, 2],
        )
        .unwrap();
        assert_eq!(transition.map(IndexPath::new(1, 0)), None);
        assert_eq!(transition.map(IndexPath::new(2, 1)), Some(IndexPath::new(2, 1)));
        assert_eq!(transition.new_shape().item_count(1), 5);
    }

    #[test]
    fn test_move_item_across_sections() {
        let transition = resolve(
            vec![StructuralEdit::MoveItem {
                from: IndexPath::new(0, 0),
                to: IndexPath::new(1, 2),
            }],
            &[2, 2],
            &[1, 3],
        )
        .unwrap();
        assert_eq!(transition.map(IndexPath::new(0, 0)), Some(IndexPath::new(1, 2)));
        assert_eq!(transition.map(IndexPath::new(0, 1)), Some(IndexPath::new(0, 0)));
        assert_eq!(transition.map(IndexPath::new(1, 1)), Some(IndexPath::new(1, 1)));
    }

    #[test]
    fn test_move_section() {
        let transition = resolve(
            vec![StructuralEdit::MoveSection { from: 0, to: 2 }],
            &[1, 2, 3],
            &[2, 3, 1],
        )
        .unwrap();
        assert_eq!(transition.map(IndexPath::new(0, 0)), Some(IndexPath::new(2, 0)));
        assert_eq!(transition.map(IndexPath::new(1, 1)), Some(IndexPath::new(0, 1)));
        assert_eq!(transition.map(IndexPath::new(2, 2)), Some(IndexPath::new(1, 2)));
    }

    #[test]
    fn test_inconsistent_item_count_is_reported() {
        let err = resolve(
            vec![StructuralEdit::InsertItems(vec![IndexPath::new(0, 0)])],
            &[10],
            &[12],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CollectionError::InconsistentUpdate {
                section: 0,
                expected: 11,
                actual: 12
            }
        ));
    }

    #[test]
    fn test_inconsistent_section_count_is_reported() {
        let err = resolve(
            vec![StructuralEdit::DeleteSections(section_set([0]))],
            &[1, 1],
            &[1, 1],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CollectionError::InconsistentSectionCount { expected: 1, actual: 2 }
        ));
    }

    #[test]
    fn test_item_edit_inside_deleted_section_conflicts() {
        let err = resolve(
            vec![
                StructuralEdit::DeleteSections(section_set([0])),
                StructuralEdit::DeleteItems(vec![IndexPath::new(0, 0)]),
            ],
            &[2, 2],
            &[2],
        )
        .unwrap_err();
        assert!(matches!(err, CollectionError::ConflictingEdit(_)));
    }

    #[test]
    fn test_pre_update_bounds_checked() {
        let err = StructuralEdit::DeleteItems(vec![IndexPath::new(0, 4)])
            .validate_against(&shape(&[3]))
            .unwrap_err();
        assert!(matches!(err, CollectionError::IndexOutOfBounds { count: 3, .. }));
        assert!(StructuralEdit::InsertItems(vec![IndexPath::new(0, 9)])
            .validate_against(&shape(&[3]))
            .is_ok());
    }

    #[test]
    fn test_native_updates_fixed_order() {
        let mut changeset = Changeset::default();
        changeset.push(StructuralEdit::ReloadItems(vec![IndexPath::new(0, 0)]));
        changeset.push(StructuralEdit::InsertSections(section_set([2])));
        changeset.push(StructuralEdit::DeleteItems(vec![IndexPath::new(0, 1)]));
        changeset.push(StructuralEdit::DeleteSections(section_set([1])));

        let batch = changeset.native_updates();
        assert_eq!(
            batch.edits(),
            &[
                StructuralEdit::DeleteSections(section_set([1])),
                StructuralEdit::InsertSections(section_set([2])),
                StructuralEdit::DeleteItems(vec![IndexPath::new(0, 1)]),
                StructuralEdit::ReloadItems(vec![IndexPath::new(0, 0)]),
            ]
        );
        assert_eq!(changeset.len(), 4);
    }
}
