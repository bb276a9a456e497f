use std::sync::{
    Weak,
    atomic::{AtomicU32, Ordering},
};

use log::trace;

use crate::ecs::{
    detail::DetailSet,
    status::{Error, Outcome},
    storage::ChunkId,
};

use super::{
    Capability, Handle, MechanismId, PLACES_PER_MECHANISM_MAX, SubjectHandle, SubjectId,
    Subjective,
};

/// Where a subject's slot lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub chunk: ChunkId,
    pub row: usize,
}

/// Book-keeping for one place of the pool.
pub struct SubjectInfo {
    id: SubjectId,
    generation: AtomicU32,
    placement: Option<Placement>,
    details: DetailSet,
    subjective: Option<Weak<dyn Subjective>>,
}

impl SubjectInfo {
    fn new(id: SubjectId) -> Self {
        Self {
            id,
            generation: AtomicU32::new(0),
            placement: None,
            details: DetailSet::default(),
            subjective: None,
        }
    }

    /// The id while the place is allocated, [`SubjectId::INVALID`] while it is free.
    #[inline]
    pub fn id(&self) -> SubjectId {
        self.id
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.id.is_valid()
    }

    /// A mutable handle for the current generation.
    #[inline]
    pub fn handle(&self) -> SubjectHandle {
        Handle::new(self.id, self.generation())
    }

    #[inline]
    pub fn placement(&self) -> Option<Placement> {
        self.placement
    }

    #[inline]
    pub(crate) fn set_placement(&mut self, placement: Option<Placement>) {
        self.placement = placement;
    }

    #[inline]
    pub fn details(&self) -> &DetailSet {
        &self.details
    }

    #[inline]
    pub(crate) fn details_mut(&mut self) -> &mut DetailSet {
        &mut self.details
    }

    #[inline]
    pub fn subjective(&self) -> Option<&Weak<dyn Subjective>> {
        self.subjective.as_ref()
    }

    #[inline]
    pub(crate) fn set_subjective(&mut self, subjective: Option<Weak<dyn Subjective>>) {
        self.subjective = subjective;
    }
}

/// Dense table of subject places for one mechanism.
///
/// Free places are reused last-in first-out. Place `0` is a dummy that is never allocated.
pub struct SubjectPool {
    mechanism: MechanismId,
    infos: Vec<SubjectInfo>,
    free_places: Vec<u32>,
    live: usize,
}

impl SubjectPool {
    pub fn new(mechanism: MechanismId) -> Self {
        Self {
            mechanism,
            infos: vec![SubjectInfo::new(SubjectId::INVALID)],
            free_places: Vec::new(),
            live: 0,
        }
    }

    #[inline]
    pub fn mechanism(&self) -> MechanismId {
        self.mechanism
    }

    /// Number of allocated places.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of places ever created, the dummy excluded.
    #[inline]
    pub fn places(&self) -> usize {
        self.infos.len() - 1
    }

    /// Allocate a place, reusing the most recently released one if any.
    pub fn allocate(&mut self) -> Outcome<&mut SubjectInfo> {
        let place = match self.free_places.pop() {
            Some(place) => place,
            None => {
                let place = self.infos.len() as u32;
                if place > PLACES_PER_MECHANISM_MAX {
                    return Err(Error::OutOfLimit);
                }
                self.infos.push(SubjectInfo::new(SubjectId::INVALID));
                place
            }
        };
        self.live += 1;
        let info = &mut self.infos[place as usize];
        debug_assert!(!info.is_allocated());
        info.id = SubjectId::new(self.mechanism, place);
        Ok(info)
    }

    /// Release an allocated place. The caller has already released the chunk slot.
    ///
    /// Advances the generation so outstanding handles stop resolving, and hands back the bound
    /// subjective, if any, for notification.
    pub fn release(&mut self, place: u32) -> Outcome<Option<Weak<dyn Subjective>>> {
        let mechanism = self.mechanism;
        let info = self
            .infos
            .get_mut(place as usize)
            .filter(|info| info.is_allocated())
            .ok_or(Error::Missing)?;
        debug_assert_eq!(info.id.mechanism_id(), mechanism);
        info.generation.fetch_add(1, Ordering::AcqRel);
        info.id = SubjectId::INVALID;
        info.placement = None;
        info.details.clear();
        let subjective = info.subjective.take();
        self.free_places.push(place);
        self.live -= 1;
        trace!("Released place {place} of mechanism {}", mechanism.index());
        Ok(subjective)
    }

    /// The info of an allocated id.
    pub fn find(&self, id: SubjectId) -> Option<&SubjectInfo> {
        if id.mechanism_id() != self.mechanism {
            return None;
        }
        self.infos
            .get(id.place() as usize)
            .filter(|info| info.is_allocated() && info.id == id)
    }

    pub fn find_mut(&mut self, id: SubjectId) -> Option<&mut SubjectInfo> {
        if id.mechanism_id() != self.mechanism {
            return None;
        }
        self.infos
            .get_mut(id.place() as usize)
            .filter(|info| info.is_allocated() && info.id == id)
    }

    /// The info a handle refers to, or [`Error::Missing`] if the handle is stale or foreign.
    pub fn resolve<C: Capability>(&self, handle: Handle<C>) -> Outcome<&SubjectInfo> {
        if handle.is_invalid() {
            return Err(Error::NullArgument);
        }
        self.find(handle.id())
            .filter(|info| info.generation() == handle.generation())
            .ok_or(Error::Missing)
    }

    pub fn resolve_mut<C: Capability>(&mut self, handle: Handle<C>) -> Outcome<&mut SubjectInfo> {
        if handle.is_invalid() {
            return Err(Error::NullArgument);
        }
        self.find_mut(handle.id())
            .filter(|info| info.generation() == handle.generation())
            .ok_or(Error::Missing)
    }

    /// Whether a handle still refers to a live subject.
    #[inline]
    pub fn contains<C: Capability>(&self, handle: Handle<C>) -> bool {
        self.resolve(handle).is_ok()
    }

    /// Current handle for an allocated id.
    pub fn handle_of(&self, id: SubjectId) -> Option<SubjectHandle> {
        self.find(id).map(SubjectInfo::handle)
    }

    /// Allocated infos in place order.
    pub fn iter(&self) -> impl Iterator<Item = &SubjectInfo> {
        self.infos.iter().skip(1).filter(|info| info.is_allocated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> SubjectPool {
        SubjectPool::new(MechanismId::new(4))
    }

    #[test]
    fn allocates_dense_places_from_one() {
        // Given
        let mut pool = pool();

        // When
        let first = pool.allocate().unwrap().id();
        let second = pool.allocate().unwrap().id();

        // Then
        assert_eq!(first.place(), 1);
        assert_eq!(second.place(), 2);
        assert_eq!(first.mechanism_id(), MechanismId::new(4));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn reuses_released_places_lifo() {
        // Given
        let mut pool = pool();
        for _ in 0..3 {
            pool.allocate().unwrap();
        }

        // When
        pool.release(1).unwrap();
        pool.release(3).unwrap();

        // Then
        assert_eq!(pool.allocate().unwrap().id().place(), 3);
        assert_eq!(pool.allocate().unwrap().id().place(), 1);
        assert_eq!(pool.allocate().unwrap().id().place(), 4);
    }

    #[test]
    fn stale_handles_stop_resolving() {
        // Given
        let mut pool = pool();
        let handle = pool.allocate().unwrap().handle();
        assert!(pool.contains(handle));

        // When
        pool.release(handle.id().place()).unwrap();
        let reused = pool.allocate().unwrap().handle();

        // Then
        assert_eq!(reused.id(), handle.id());
        assert_eq!(reused.generation(), handle.generation() + 1);
        assert_eq!(pool.resolve(handle).err(), Some(Error::Missing));
        assert!(pool.contains(reused));
    }

    #[test]
    fn invalid_and_foreign_handles() {
        // Given
        let mut pool = pool();
        pool.allocate().unwrap();
        let foreign = SubjectHandle::new(SubjectId::new(MechanismId::new(5), 1), 0);

        // Then
        assert_eq!(pool.resolve(SubjectHandle::INVALID).err(), Some(Error::NullArgument));
        assert_eq!(pool.resolve(foreign).err(), Some(Error::Missing));
    }

    #[test]
    fn releasing_a_free_place_is_missing() {
        // Given
        let mut pool = pool();

        // Then
        assert_eq!(pool.release(1).err(), Some(Error::Missing));
        assert_eq!(pool.release(0).err(), Some(Error::Missing));
    }

    #[test]
    fn release_returns_bound_subjective() {
        // Given
        struct Watcher;
        impl Subjective for Watcher {
            fn on_despawned(&self, _: SubjectHandle) {}
        }
        let watcher: std::sync::Arc<dyn Subjective> = std::sync::Arc::new(Watcher);
        let mut pool = pool();
        let info = pool.allocate().unwrap();
        info.set_subjective(Some(std::sync::Arc::downgrade(&watcher)));
        let place = info.id().place();

        // When
        let subjective = pool.release(place).unwrap();

        // Then
        assert!(subjective.and_then(|weak| weak.upgrade()).is_some());
        assert_eq!(pool.iter().count(), 0);
    }
}
