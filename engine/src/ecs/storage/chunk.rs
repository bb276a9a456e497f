use std::{
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use super::{ChunkId, column::Column};
use crate::ecs::{
    Trait,
    fingerprint::{AtomicFlagmark, Bitmask, Flag, Flagmark},
    mechanism::Query,
    registry::{TraitId, TraitInfo, TypeRegistry},
    status::{Error, Outcome, Status},
    subject::SubjectId,
    traits::ErasedTrait,
};

/// Per-slot metadata: the owning subject and its authoritative flagmark.
#[derive(Debug)]
pub struct Slot {
    subject: SubjectId,
    flagmark: AtomicFlagmark,
}

impl Slot {
    /// The subject occupying the slot. Invalid for free slots.
    #[inline]
    pub fn subject(&self) -> SubjectId {
        self.subject
    }

    #[inline]
    pub fn flagmark(&self) -> &AtomicFlagmark {
        &self.flagmark
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        !self.subject.is_valid()
    }

    #[inline]
    pub fn is_stale(&self) -> bool {
        self.flagmark.load().contains(Flag::Stale)
    }

    /// Occupied by a subject that has not been released.
    #[inline]
    pub fn is_live(&self) -> bool {
        !self.is_free() && !self.is_stale()
    }
}

/// Struct-of-arrays storage for subjects sharing the same traits and enabled details.
///
/// Rows never move: releasing a subject either marks its slot stale (soft) or resets it and puts it
/// on the free list (hard), and appends reuse free slots before growing. A `(chunk, slot)` pair
/// therefore stays valid for the subject for as long as it lives in the chunk.
///
/// While any concurrent iteration runs over the chunk it is *solid*: appends and releases fail with
/// [`Error::InvalidState`], while trait values may still be mutated in place.
pub struct Chunk {
    id: ChunkId,
    traits: Bitmask,
    details: Bitmask,
    /// Sorted, parallel to `columns`.
    trait_ids: Vec<TraitId>,
    columns: Vec<Column>,
    slots: Vec<Slot>,
    free_slots: Vec<usize>,
    stale_slots: Vec<usize>,
    live: usize,
    solid: AtomicUsize,
}

impl Chunk {
    pub fn new(id: ChunkId, details: Bitmask, mut infos: Vec<TraitInfo>) -> Self {
        infos.sort_by_key(|info| info.id());
        infos.dedup_by_key(|info| info.id());
        let traits = infos.iter().map(|info| info.id().index()).collect();
        Self {
            id,
            traits,
            details,
            trait_ids: infos.iter().map(|info| info.id()).collect(),
            columns: infos.into_iter().map(Column::new).collect(),
            slots: Vec::new(),
            free_slots: Vec::new(),
            stale_slots: Vec::new(),
            live: 0,
            solid: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> ChunkId {
        self.id
    }

    #[inline]
    pub fn traits(&self) -> &Bitmask {
        &self.traits
    }

    #[inline]
    pub fn details(&self) -> &Bitmask {
        &self.details
    }

    #[inline]
    pub fn trait_ids(&self) -> &[TraitId] {
        &self.trait_ids
    }

    /// The number of live subjects.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// The number of slots, including free and stale ones.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    #[inline]
    pub fn slot(&self, row: usize) -> Option<&Slot> {
        self.slots.get(row)
    }

    #[inline]
    pub fn stale_count(&self) -> usize {
        self.stale_slots.len()
    }

    #[inline]
    pub fn is_solid(&self) -> bool {
        self.solid.load(Ordering::Acquire) > 0
    }

    /// Enter a concurrent iteration scope. Scopes nest.
    #[inline]
    pub(crate) fn solidify(&self) {
        self.solid.fetch_add(1, Ordering::AcqRel);
    }

    /// Leave a concurrent iteration scope.
    #[inline]
    pub(crate) fn liquefy(&self) {
        let previous = self.solid.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "chunk liquefied more times than solidified");
    }

    #[inline]
    pub fn has_trait(&self, id: TraitId) -> bool {
        self.traits.contains(id.index())
    }

    #[inline]
    pub fn column_index(&self, id: TraitId) -> Option<usize> {
        self.trait_ids.binary_search(&id).ok()
    }

    #[inline]
    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    fn ensure_fluid(&self) -> Outcome<()> {
        if self.is_solid() {
            log::warn!("structural change attempted on solid chunk {:?}", self.id);
            return Err(Error::InvalidState);
        }
        Ok(())
    }

    /// Place a subject, reusing a free slot when one exists. The row's traits start default.
    pub fn append(&mut self, subject: SubjectId, flagmark: Flagmark) -> Outcome<usize> {
        self.ensure_fluid()?;
        let flagmark = flagmark.without(Flag::Stale);
        let row = match self.free_slots.pop() {
            Some(row) => {
                let slot = &mut self.slots[row];
                slot.subject = subject;
                slot.flagmark.store(flagmark);
                row
            }
            None => {
                for column in &mut self.columns {
                    column.push_default();
                }
                self.slots.push(Slot {
                    subject,
                    flagmark: AtomicFlagmark::new(flagmark),
                });
                self.slots.len() - 1
            }
        };
        self.live += 1;
        Ok(row)
    }

    /// Release a subject's slot.
    ///
    /// A soft release only marks the slot stale so it is skipped by iteration; the slot is reclaimed
    /// by [`Chunk::reclaim_stale`]. A hard release resets the row's traits immediately and makes the
    /// slot available for reuse.
    pub fn release(&mut self, row: usize, hard: bool) -> Outcome {
        self.ensure_fluid()?;
        let Some(slot) = self.slots.get(row) else {
            return Err(Error::InvalidArgument);
        };
        if slot.is_free() {
            return Ok(Status::Noop);
        }
        let stale = slot.is_stale();
        if !hard {
            if stale {
                return Ok(Status::Noop);
            }
            slot.flagmark.set(Flag::Stale, true);
            self.stale_slots.push(row);
            self.live -= 1;
            return Ok(Status::Success);
        }
        if stale {
            self.stale_slots.retain(|stale_row| *stale_row != row);
        } else {
            self.live -= 1;
        }
        self.clear_row(row);
        Ok(Status::Success)
    }

    /// Reset every stale slot and make it available for reuse. Returns the number reclaimed.
    pub fn reclaim_stale(&mut self) -> Outcome<usize> {
        self.ensure_fluid()?;
        let stale = std::mem::take(&mut self.stale_slots);
        let count = stale.len();
        for row in stale {
            self.clear_row(row);
        }
        Ok(count)
    }

    fn clear_row(&mut self, row: usize) {
        for column in &mut self.columns {
            column.reset(row);
        }
        let slot = &mut self.slots[row];
        slot.subject = SubjectId::INVALID;
        slot.flagmark.store(Flagmark::NONE);
        self.free_slots.push(row);
    }

    /// Move a live subject's row into `target`, carrying over the traits both chunks share and the
    /// flagmark. Traits only this chunk has are dropped; traits only the target has start default.
    pub fn transfer(&mut self, row: usize, target: &mut Chunk) -> Outcome<usize> {
        self.ensure_fluid()?;
        let Some(slot) = self.slots.get(row).filter(|slot| slot.is_live()) else {
            return Err(Error::InvalidArgument);
        };
        let subject = slot.subject;
        let flagmark = slot.flagmark.load();
        let target_row = target.append(subject, flagmark)?;
        for (index, id) in self.trait_ids.iter().enumerate() {
            if let Some(target_index) = target.column_index(*id) {
                // SAFETY: Columns with the same trait id store the same type.
                unsafe {
                    self.columns[index].move_into(
                        row,
                        &mut target.columns[target_index],
                        target_row,
                    )
                };
            }
        }
        self.release(row, true)?;
        Ok(target_row)
    }

    /// `None` while the chunk is solid, since a worker may hold the row mutably.
    pub fn get_trait<T: Trait>(&self, id: TraitId, row: usize) -> Option<&T> {
        if self.is_solid() {
            return None;
        }
        let index = self.column_index(id)?;
        self.columns[index].get::<T>(row)
    }

    pub fn get_trait_mut<T: Trait>(&mut self, id: TraitId, row: usize) -> Option<&mut T> {
        let index = self.column_index(id)?;
        self.columns[index].get_mut::<T>(row)
    }

    /// Pointer to a trait value, usable from a concurrent scope. Dereferencing it is the caller's
    /// responsibility.
    pub fn trait_ptr<T: Trait>(&self, id: TraitId, row: usize) -> Option<NonNull<T>> {
        let index = self.column_index(id)?;
        let column = &self.columns[index];
        column.ensure_type::<T>();
        (row < column.len()).then(|| column.ptr_at(row).cast::<T>())
    }

    /// The whole column of trait `T`, indexed by slot. Free and stale slots hold default or
    /// leftover values; consult [`Chunk::slots`] for liveness. `None` while the chunk is solid.
    pub fn get_trait_column<T: Trait>(&self, id: TraitId) -> Option<&[T]> {
        if self.is_solid() {
            return None;
        }
        let index = self.column_index(id)?;
        Some(self.columns[index].as_slice::<T>())
    }

    /// The traits requested by `Q` for one live row.
    pub fn get_trait_row<Q: Query>(
        &mut self,
        registry: &TypeRegistry,
        row: usize,
    ) -> Option<Q::Item<'_>> {
        if !self.slots.get(row)?.is_live() {
            return None;
        }
        let state = Q::prepare(self, registry)?;
        // SAFETY: `&mut self` guarantees exclusive access to the row, and `prepare` validated the
        // columns.
        Some(unsafe { Q::fetch(self, &state, row) })
    }

    /// Replace a trait value with an erased value.
    pub fn set_erased(&mut self, row: usize, value: ErasedTrait) -> Outcome {
        let Some(index) = self.column_index(value.id()) else {
            return Err(Error::Missing);
        };
        if row >= self.slots.len() {
            return Err(Error::InvalidArgument);
        }
        // SAFETY: The column was looked up by the value's trait id.
        unsafe { self.columns[index].replace_erased(row, value) };
        Ok(Status::Success)
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("id", &self.id)
            .field("traits", &self.traits)
            .field("details", &self.details)
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::subject::MechanismId;

    #[derive(Trait, Default, Debug, Clone, Copy, PartialEq)]
    struct Position(f32);

    #[derive(Trait, Default, Debug, Clone, Copy, PartialEq)]
    struct Velocity(f32);

    fn subject(place: u32) -> SubjectId {
        SubjectId::new(MechanismId::new(1), place)
    }

    fn chunk(registry: &TypeRegistry) -> Chunk {
        Chunk::new(
            ChunkId::new(0),
            Bitmask::new(),
            vec![
                registry.trait_info::<Velocity>(),
                registry.trait_info::<Position>(),
            ],
        )
    }

    #[test]
    fn append_defaults_and_counts() {
        // Given
        let registry = TypeRegistry::new();
        let mut chunk = chunk(&registry);
        let position = registry.trait_id::<Position>();

        // When
        let first = chunk.append(subject(1), Flagmark::NONE).unwrap();
        let second = chunk.append(subject(2), Flag::A.mask()).unwrap();

        // Then
        assert_eq!((first, second), (0, 1));
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.get_trait::<Position>(position, 1), Some(&Position(0.0)));
        assert_eq!(chunk.slots()[1].flagmark().load(), Flag::A.mask());
        assert!(chunk.trait_ids().windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn hard_release_resets_and_recycles() {
        // Given
        let registry = TypeRegistry::new();
        let mut chunk = chunk(&registry);
        let position = registry.trait_id::<Position>();
        let row = chunk.append(subject(1), Flagmark::NONE).unwrap();
        chunk.get_trait_mut::<Position>(position, row).unwrap().0 = 9.0;

        // When
        let status = chunk.release(row, true).unwrap();
        let reused = chunk.append(subject(2), Flagmark::NONE).unwrap();

        // Then
        assert_eq!(status, Status::Success);
        assert_eq!(reused, row);
        assert_eq!(chunk.slot_count(), 1);
        assert_eq!(chunk.get_trait::<Position>(position, reused), Some(&Position(0.0)));
    }

    #[test]
    fn soft_release_marks_stale_until_reclaimed() {
        // Given
        let registry = TypeRegistry::new();
        let mut chunk = chunk(&registry);
        let row = chunk.append(subject(1), Flagmark::NONE).unwrap();

        // When
        chunk.release(row, false).unwrap();

        // Then
        assert!(chunk.slots()[row].is_stale());
        assert_eq!(chunk.len(), 0);
        assert_eq!(chunk.release(row, false).unwrap(), Status::Noop);
        assert_eq!(chunk.append(subject(2), Flagmark::NONE).unwrap(), 1);

        // When
        let reclaimed = chunk.reclaim_stale().unwrap();

        // Then
        assert_eq!(reclaimed, 1);
        assert!(chunk.slots()[row].is_free());
        assert_eq!(chunk.append(subject(3), Flagmark::NONE).unwrap(), row);
    }

    #[test]
    fn solid_chunk_rejects_structural_changes() {
        // Given
        let registry = TypeRegistry::new();
        let mut chunk = chunk(&registry);
        let position = registry.trait_id::<Position>();
        let row = chunk.append(subject(1), Flagmark::NONE).unwrap();

        // When
        chunk.solidify();

        // Then
        assert_eq!(chunk.append(subject(2), Flagmark::NONE), Err(Error::InvalidState));
        assert_eq!(chunk.release(row, true), Err(Error::InvalidState));
        assert_eq!(chunk.len(), 1);
        chunk.get_trait_mut::<Position>(position, row).unwrap().0 = 3.0;

        // When
        chunk.liquefy();

        // Then
        assert_eq!(chunk.get_trait::<Position>(position, row), Some(&Position(3.0)));
        assert!(chunk.release(row, true).is_ok());
    }

    #[test]
    fn transfer_keeps_shared_traits_and_flags() {
        // Given
        let registry = TypeRegistry::new();
        let position = registry.trait_id::<Position>();
        let velocity = registry.trait_id::<Velocity>();
        let mut source = chunk(&registry);
        let mut target = Chunk::new(
            ChunkId::new(1),
            Bitmask::new(),
            vec![registry.trait_info::<Position>()],
        );
        let row = source.append(subject(1), Flag::B.mask()).unwrap();
        source.get_trait_mut::<Position>(position, row).unwrap().0 = 5.0;
        source.get_trait_mut::<Velocity>(velocity, row).unwrap().0 = 6.0;

        // When
        let moved = source.transfer(row, &mut target).unwrap();

        // Then
        assert_eq!(target.get_trait::<Position>(position, moved), Some(&Position(5.0)));
        assert_eq!(target.slots()[moved].flagmark().load(), Flag::B.mask());
        assert_eq!(target.slots()[moved].subject(), subject(1));
        assert!(source.slots()[row].is_free());
        assert_eq!(source.len(), 0);
    }

    #[test]
    fn trait_column_and_row_views() {
        // Given
        let registry = TypeRegistry::new();
        let position = registry.trait_id::<Position>();
        let mut chunk = chunk(&registry);
        for place in 1..=3 {
            let row = chunk.append(subject(place), Flagmark::NONE).unwrap();
            chunk.get_trait_mut::<Position>(position, row).unwrap().0 = place as f32;
        }

        // When
        let column = chunk.get_trait_column::<Position>(position).unwrap().to_vec();
        let (p, v) = chunk
            .get_trait_row::<(&mut Position, &Velocity)>(&registry, 2)
            .unwrap();
        p.0 += v.0 + 1.0;

        // Then
        assert_eq!(column, vec![Position(1.0), Position(2.0), Position(3.0)]);
        assert_eq!(chunk.get_trait::<Position>(position, 2), Some(&Position(4.0)));
    }

    #[test]
    fn shared_views_are_withheld_while_solid() {
        // Given
        let registry = TypeRegistry::new();
        let position = registry.trait_id::<Position>();
        let mut chunk = chunk(&registry);
        chunk.append(subject(1), Flagmark::NONE).unwrap();

        // When
        chunk.solidify();
        let during = (
            chunk.get_trait::<Position>(position, 0).is_some(),
            chunk.get_trait_column::<Position>(position).is_some(),
        );
        chunk.liquefy();

        // Then
        assert_eq!(during, (false, false));
        assert!(chunk.get_trait::<Position>(position, 0).is_some());
        assert!(chunk.get_trait_column::<Position>(position).is_some());
    }
}
