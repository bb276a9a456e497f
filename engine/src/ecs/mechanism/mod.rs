//! The mechanism: owner of chunks, subjects and deferred operations.
//!
//! A [`Mechanism`] is the unit everything else hangs off. It stores subjects in [`Chunks`], keeps
//! their identities in a [`SubjectPool`], queues structural changes made from within iteration in
//! a lock-free deferred queue, memoizes filter to chunk lookups, and keeps a [`SteadyClock`] for
//! fixed-rate stepping.
//!
//! Immediate structural operations need `&mut Mechanism`. Everything that is safe to do from the
//! worker of a concurrent iteration (flag writes, deferred operations, reads) takes `&self`.
//!
//! ```ignore
//! let mut mechanism = Mechanism::new()?;
//! let bubble = mechanism.spawn_with((Located(Vec3::ZERO), BubbleSphere::default()))?;
//! mechanism.set_trait(bubble, Located(Vec3::X))?;
//!
//! let chain = mechanism.enchain(Filter::make::<(Located, BubbleSphere)>(mechanism.registry()));
//! mechanism.operate::<(&mut Located, &BubbleSphere)>(&chain, |_, (located, sphere)| {
//!     located.0.y += sphere.radius;
//! })?;
//! ```

mod chain;
mod clock;
mod deferred;
mod query;
mod subject;

pub use chain::{Chain, SolidChain};
pub use clock::{DEFAULT_STEADY_DELTA, SteadyClock, TickReport};
pub use query::{Query, QuerySpec};
pub use subject::Subject;

use std::{
    collections::HashMap,
    ptr::NonNull,
    sync::{Arc, RwLock, Weak},
};

use crossbeam::queue::SegQueue;
use log::{trace, warn};

use crate::ecs::{
    Detail, Trait, TraitSet,
    fingerprint::{Bitmask, Filter, Fingerprint, Flag, Flagmark},
    machine::Machine,
    registry::{TraitId, TypeRegistry},
    status::{Error, Outcome, Status, sanity_check},
    storage::{Chunk, ChunkId, Chunks, Slot},
    subject::{
        Capability, DirectRead, DirectWrite, FlagWrite, Handle, MechanismId, Placement,
        Structural, SubjectHandle, SubjectId, SubjectInfo, SubjectPool, Subjective,
    },
    traits::ErasedTrait,
};

use deferred::Deferred;

pub struct Mechanism {
    id: MechanismId,
    registry: Arc<TypeRegistry>,
    chunks: Chunks,
    subjects: SubjectPool,
    deferred: SegQueue<Deferred>,
    chains: RwLock<HashMap<Filter, Arc<[ChunkId]>>>,
    clock: SteadyClock,
}

impl Mechanism {
    /// A mechanism using the process-wide type registry.
    pub fn new() -> Outcome<Self> {
        Self::with_registry(TypeRegistry::global().clone())
    }

    /// A mechanism using its own type registry.
    pub fn with_registry(registry: Arc<TypeRegistry>) -> Outcome<Self> {
        let id = Machine::global().retain_mechanism_id()?;
        Ok(Self {
            id,
            registry,
            chunks: Chunks::default(),
            subjects: SubjectPool::new(id),
            deferred: SegQueue::new(),
            chains: RwLock::new(HashMap::new()),
            clock: SteadyClock::default(),
        })
    }

    #[inline]
    pub fn id(&self) -> MechanismId {
        self.id
    }

    #[inline]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    #[inline]
    pub(crate) fn chunks(&self) -> &Chunks {
        &self.chunks
    }

    #[inline]
    pub fn subjects(&self) -> &SubjectPool {
        &self.subjects
    }

    #[inline]
    pub fn clock(&self) -> &SteadyClock {
        &self.clock
    }

    /// Replace the steady delta time. Resets the steady frame counters.
    pub fn set_steady_delta(&mut self, steady_delta: f32) -> Outcome {
        self.clock = SteadyClock::new(steady_delta)?;
        Ok(Status::Success)
    }

    /// Number of live subjects.
    #[inline]
    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Number of live subjects matching a filter.
    pub fn count(&self, filter: &Filter) -> usize {
        self.chunks
            .iter()
            .filter(|chunk| filter.matches_signature(chunk.traits(), chunk.details()))
            .map(|chunk| {
                chunk
                    .slots()
                    .iter()
                    .filter(|slot| slot.is_live() && filter.matches_flagmark(slot.flagmark().load()))
                    .count()
            })
            .sum()
    }

    /// Whether a handle refers to a live subject of this mechanism.
    #[inline]
    pub fn contains<C: Capability>(&self, handle: Handle<C>) -> bool {
        self.subjects.contains(handle)
    }

    fn resolve<C: Capability>(&self, handle: Handle<C>) -> Outcome<&SubjectInfo> {
        self.subjects.resolve(handle).inspect_err(|error| {
            if !error.is_routine() {
                warn!("invalid handle {:?} passed to mechanism {}", handle, self.id.index());
            }
        })
    }

    fn placement_of<C: Capability>(&self, handle: Handle<C>) -> Outcome<Placement> {
        self.resolve(handle)?.placement().ok_or(Error::Missing)
    }

    fn chunk(&self, id: ChunkId) -> Outcome<&Chunk> {
        self.chunks.get(id).ok_or(Error::Missing)
    }

    fn chunk_mut(&mut self, id: ChunkId) -> Outcome<&mut Chunk> {
        self.chunks.get_mut(id).ok_or(Error::Missing)
    }

    fn slot_of<C: Capability>(&self, handle: Handle<C>) -> Outcome<&Slot> {
        let placement = self.placement_of(handle)?;
        self.chunk(placement.chunk)?
            .slot(placement.row)
            .ok_or(Error::Missing)
    }

    // Spawning

    /// Spawn a subject without traits.
    pub fn spawn(&mut self) -> Outcome<SubjectHandle> {
        self.spawn_erased(Vec::new())
    }

    /// Spawn a subject with initial trait values.
    pub fn spawn_with<S: TraitSet>(&mut self, traits: S) -> Outcome<SubjectHandle> {
        let values = ErasedTrait::from_set(&self.registry, traits);
        self.spawn_erased(values)
    }

    fn spawn_erased(&mut self, values: Vec<ErasedTrait>) -> Outcome<SubjectHandle> {
        let traits: Bitmask = values.iter().map(|value| value.id().index()).collect();
        let chunk_id = self.obtain_chunk(&traits, &Bitmask::new());
        let id = self
            .subjects
            .allocate()
            .inspect_err(|_| warn!("subject pool of mechanism {} is full", self.id.index()))?
            .id();
        let Some(chunk) = self.chunks.get_mut(chunk_id) else {
            self.subjects.release(id.place())?;
            return Err(Error::Missing);
        };
        let row = match chunk.append(id, Flagmark::NONE) {
            Ok(row) => row,
            Err(error) => {
                self.subjects.release(id.place())?;
                return Err(error);
            }
        };
        for value in values {
            chunk.set_erased(row, value)?;
        }
        let info = self.subjects.find_mut(id).ok_or(Error::Missing)?;
        info.set_placement(Some(Placement {
            chunk: chunk_id,
            row,
        }));
        trace!("spawned {:?} in chunk {:?}", id, chunk_id);
        Ok(info.handle())
    }

    fn obtain_chunk(&mut self, traits: &Bitmask, details: &Bitmask) -> ChunkId {
        let (id, created) = self.chunks.obtain(&self.registry, traits, details);
        if created {
            self.invalidate_chains();
        }
        id
    }

    // Despawning

    /// Despawn a subject immediately.
    pub fn despawn<C: Structural>(&mut self, handle: Handle<C>) -> Outcome {
        let id = self.resolve(handle)?.id();
        self.despawn_place(id, true)
    }

    fn despawn_place(&mut self, id: SubjectId, hard: bool) -> Outcome {
        let info = self.subjects.find(id).ok_or(Error::Missing)?;
        let handle = info.handle();
        if let Some(placement) = info.placement() {
            self.chunk_mut(placement.chunk)?
                .release(placement.row, hard)?;
        }
        let subjective = self.subjects.release(id.place())?;
        if let Some(subjective) = subjective.and_then(|subjective| subjective.upgrade()) {
            subjective.on_despawned(handle);
        }
        trace!("despawned {:?}", id);
        Ok(Status::Success)
    }

    /// Despawn every live subject whose flagmark contains all of `include` and none of `exclude`.
    /// Returns the number of despawned subjects.
    pub fn despawn_subjects(&mut self, include: Flagmark, exclude: Flagmark) -> Outcome<usize> {
        let ids: Vec<SubjectId> = self
            .chunks
            .iter()
            .flat_map(|chunk| chunk.slots())
            .filter(|slot| {
                let flagmark = slot.flagmark().load();
                slot.is_live() && flagmark.contains_all(include) && !flagmark.intersects(exclude)
            })
            .map(Slot::subject)
            .collect();
        for id in &ids {
            self.despawn_place(*id, true)?;
        }
        Ok(ids.len())
    }

    pub fn despawn_all(&mut self) -> Outcome<usize> {
        self.despawn_subjects(Flagmark::NONE, Flagmark::NONE)
    }

    // Traits

    /// A copy of a trait value.
    pub fn get_trait<T: Trait + Clone>(&self, handle: Handle<impl Capability>) -> Outcome<T> {
        self.trait_ref::<T>(handle).cloned()
    }

    /// Fails with [`Error::InvalidState`] while the subject's chunk is iterated.
    pub fn trait_ref<T: Trait>(&self, handle: Handle<impl Capability>) -> Outcome<&T> {
        let placement = self.placement_of(handle)?;
        let chunk = self.chunk(placement.chunk)?;
        if chunk.is_solid() {
            return Err(Error::InvalidState);
        }
        let id = self.registry.find_trait::<T>().ok_or(Error::Missing)?;
        chunk.get_trait::<T>(id, placement.row).ok_or(Error::Missing)
    }

    pub fn trait_mut<T: Trait>(&mut self, handle: Handle<impl Structural>) -> Outcome<&mut T> {
        let placement = self.placement_of(handle)?;
        let id = self.registry.find_trait::<T>().ok_or(Error::Missing)?;
        self.chunk_mut(placement.chunk)?
            .get_trait_mut::<T>(id, placement.row)
            .ok_or(Error::Missing)
    }

    /// Raw pointer to a trait value, available inside concurrent iteration.
    ///
    /// # Safety
    /// The pointer is valid until the next structural change of the subject. Dereferencing it must
    /// not race with any other access to the same trait of the same subject.
    pub unsafe fn trait_ptr<T: Trait>(
        &self,
        handle: Handle<impl DirectWrite>,
    ) -> Outcome<NonNull<T>> {
        let placement = self.placement_of(handle)?;
        let id = self.registry.find_trait::<T>().ok_or(Error::Missing)?;
        self.chunk(placement.chunk)?
            .trait_ptr::<T>(id, placement.row)
            .ok_or(Error::Missing)
    }

    /// Read-only counterpart of [`Mechanism::trait_ptr`].
    ///
    /// # Safety
    /// As for [`Mechanism::trait_ptr`].
    pub unsafe fn trait_const_ptr<T: Trait>(
        &self,
        handle: Handle<impl DirectRead>,
    ) -> Outcome<NonNull<T>> {
        let placement = self.placement_of(handle)?;
        let id = self.registry.find_trait::<T>().ok_or(Error::Missing)?;
        self.chunk(placement.chunk)?
            .trait_ptr::<T>(id, placement.row)
            .ok_or(Error::Missing)
    }

    /// The trait value, added with its default first when missing.
    pub fn obtain_trait<T: Trait>(&mut self, handle: Handle<impl Structural>) -> Outcome<&mut T> {
        self.add_trait(handle, T::default())?;
        self.trait_mut::<T>(handle)
    }

    /// Overwrite a trait value, adding the trait when missing.
    pub fn set_trait<T: Trait>(&mut self, handle: Handle<impl Structural>, value: T) -> Outcome {
        let id = self.resolve(handle)?.id();
        let value = ErasedTrait::new(self.registry.trait_id::<T>(), value);
        self.set_erased(id, value)
    }

    /// Add a trait. A no-op, keeping the current value, when the trait is present.
    pub fn add_trait<T: Trait>(&mut self, handle: Handle<impl Structural>, value: T) -> Outcome {
        let id = self.resolve(handle)?.id();
        let value = ErasedTrait::new(self.registry.trait_id::<T>(), value);
        self.add_erased(id, value)
    }

    /// Remove a trait. A no-op when the trait is absent.
    pub fn remove_trait<T: Trait>(&mut self, handle: Handle<impl Structural>) -> Outcome {
        let id = self.resolve(handle)?.id();
        match self.registry.find_trait::<T>() {
            Some(trait_id) => self.remove_by_id(id, trait_id),
            None => Ok(Status::Noop),
        }
    }

    pub fn has_trait<T: Trait>(&self, handle: Handle<impl Capability>) -> bool {
        let Some(trait_id) = self.registry.find_trait::<T>() else {
            return false;
        };
        self.placement_of(handle)
            .and_then(|placement| self.chunk(placement.chunk))
            .is_ok_and(|chunk| chunk.has_trait(trait_id))
    }

    pub(crate) fn set_erased(&mut self, id: SubjectId, value: ErasedTrait) -> Outcome {
        let placement = self.placement_of_id(id)?;
        let chunk = self.chunk_mut(placement.chunk)?;
        if chunk.has_trait(value.id()) {
            return chunk.set_erased(placement.row, value);
        }
        self.add_erased(id, value)
    }

    pub(crate) fn add_erased(&mut self, id: SubjectId, value: ErasedTrait) -> Outcome {
        let placement = self.placement_of_id(id)?;
        let chunk = self.chunk(placement.chunk)?;
        if chunk.has_trait(value.id()) {
            return Ok(Status::Noop);
        }
        let mut traits = chunk.traits().clone();
        traits.insert(value.id().index());
        let details = chunk.details().clone();
        trace!("adding trait {:?} to {:?}", value.id(), id);
        self.relocate(id, &traits, &details, vec![value])?;
        Ok(Status::Success)
    }

    pub(crate) fn remove_by_id(&mut self, id: SubjectId, trait_id: TraitId) -> Outcome {
        let placement = self.placement_of_id(id)?;
        let chunk = self.chunk(placement.chunk)?;
        if !chunk.has_trait(trait_id) {
            return Ok(Status::Noop);
        }
        let mut traits = chunk.traits().clone();
        traits.remove(trait_id.index());
        let details = chunk.details().clone();
        trace!("removing trait {:?} from {:?}", trait_id, id);
        self.relocate(id, &traits, &details, Vec::new())?;
        Ok(Status::Success)
    }

    fn placement_of_id(&self, id: SubjectId) -> Outcome<Placement> {
        self.subjects
            .find(id)
            .and_then(SubjectInfo::placement)
            .ok_or(Error::Missing)
    }

    /// Move a subject to the chunk of the given signature and write the payload into it.
    fn relocate(
        &mut self,
        id: SubjectId,
        traits: &Bitmask,
        details: &Bitmask,
        payload: Vec<ErasedTrait>,
    ) -> Outcome<Placement> {
        let from = self.placement_of_id(id)?;
        let to = self.obtain_chunk(traits, details);
        let row = if to == from.chunk {
            from.row
        } else {
            let (source, target) = self.chunks.pair_mut(from.chunk, to);
            source.transfer(from.row, target)?
        };
        let chunk = self.chunk_mut(to)?;
        sanity_check!(chunk.slot(row).is_some_and(|slot| slot.subject() == id));
        for value in payload {
            chunk.set_erased(row, value)?;
        }
        let placement = Placement { chunk: to, row };
        self.subjects
            .find_mut(id)
            .ok_or(Error::Missing)?
            .set_placement(Some(placement));
        Ok(placement)
    }

    // Flags

    /// The subject's current fingerprint.
    pub fn fingerprint<C: Capability>(&self, handle: Handle<C>) -> Outcome<Fingerprint> {
        let placement = self.placement_of(handle)?;
        let chunk = self.chunk(placement.chunk)?;
        let slot = chunk.slot(placement.row).ok_or(Error::Missing)?;
        Ok(Fingerprint::new(
            chunk.traits().clone(),
            chunk.details().clone(),
            slot.flagmark().load(),
        ))
    }

    pub fn flagmark<C: Capability>(&self, handle: Handle<C>) -> Outcome<Flagmark> {
        Ok(self.slot_of(handle)?.flagmark().load())
    }

    pub fn has_flag<C: Capability>(&self, handle: Handle<C>, flag: Flag) -> Outcome<bool> {
        Ok(self.flagmark(handle)?.contains(flag))
    }

    /// Set or clear a user-level flag.
    pub fn set_flag<C: FlagWrite>(&self, handle: Handle<C>, flag: Flag, state: bool) -> Outcome {
        reject_system_flags(flag.mask())?;
        let previous = self.slot_of(handle)?.flagmark().set(flag, state);
        Ok(Status::from_changed(previous != state))
    }

    /// Flip a user-level flag, returning its new state.
    pub fn toggle_flag<C: FlagWrite>(&self, handle: Handle<C>, flag: Flag) -> Outcome<bool> {
        reject_system_flags(flag.mask())?;
        Ok(self.slot_of(handle)?.flagmark().toggle(flag))
    }

    /// Replace the user-level bits selected by `mask`, returning the previous flagmark.
    pub fn set_flagmark_masked<C: FlagWrite>(
        &self,
        handle: Handle<C>,
        bits: Flagmark,
        mask: Flagmark,
    ) -> Outcome<Flagmark> {
        reject_system_flags(mask)?;
        Ok(self.slot_of(handle)?.flagmark().set_masked(bits, mask))
    }

    pub(crate) fn set_system_flag<C: Capability>(
        &self,
        handle: Handle<C>,
        flag: Flag,
        state: bool,
    ) -> Outcome<bool> {
        Ok(self.slot_of(handle)?.flagmark().set(flag, state))
    }

    /// Mark every live subject not yet booted as [`Flag::Booted`]. Returns the number booted.
    pub fn boot_all(&self) -> usize {
        self.chunks
            .iter()
            .flat_map(|chunk| chunk.slots())
            .filter(|slot| slot.is_live() && !slot.flagmark().set(Flag::Booted, true))
            .count()
    }

    // Details

    /// Attach an enabled detail. Replacing an instance of the same class keeps its enabled state
    /// and reports [`Status::Reused`].
    pub fn add_detail<D: Detail>(&mut self, handle: Handle<impl Structural>, detail: D) -> Outcome {
        let id = self.resolve(handle)?.id();
        let info = self.registry.detail_info::<D>();
        let subject = self.subjects.find_mut(id).ok_or(Error::Missing)?;
        if subject.details_mut().insert(info, detail).is_some() {
            return Ok(Status::Reused);
        }
        self.refresh_details(id)
    }

    /// The detail instance of exactly class `D`.
    pub fn get_detail<D: Detail>(&self, handle: Handle<impl Capability>) -> Outcome<&D> {
        let id = self.registry.detail_info::<D>().id();
        self.resolve(handle)?
            .details()
            .get::<D>(id)
            .ok_or(Error::Missing)
    }

    pub fn detail_mut<D: Detail>(&mut self, handle: Handle<impl Structural>) -> Outcome<&mut D> {
        let subject = self.resolve(handle)?.id();
        let id = self.registry.detail_info::<D>().id();
        self.subjects
            .find_mut(subject)
            .ok_or(Error::Missing)?
            .details_mut()
            .get_mut::<D>(id)
            .ok_or(Error::Missing)
    }

    /// Whether the subject carries a detail of class `D` or of a class derived from it, enabled or
    /// not.
    pub fn has_detail<D: Detail>(&self, handle: Handle<impl Capability>) -> bool {
        let id = self.registry.detail_info::<D>().id();
        self.resolve(handle)
            .is_ok_and(|info| info.details().contains_kind_of(id))
    }

    pub fn enable_detail<D: Detail>(&mut self, handle: Handle<impl Structural>) -> Outcome {
        self.switch_detail::<D>(handle, true)
    }

    pub fn disable_detail<D: Detail>(&mut self, handle: Handle<impl Structural>) -> Outcome {
        self.switch_detail::<D>(handle, false)
    }

    fn switch_detail<D: Detail>(
        &mut self,
        handle: Handle<impl Structural>,
        enabled: bool,
    ) -> Outcome {
        let subject = self.resolve(handle)?.id();
        let id = self.registry.detail_info::<D>().id();
        let info = self.subjects.find_mut(subject).ok_or(Error::Missing)?;
        match info.details_mut().set_enabled(id, enabled) {
            None => Err(Error::Missing),
            Some(previous) if previous == enabled => Ok(Status::Noop),
            Some(_) => self.refresh_details(subject),
        }
    }

    pub fn remove_detail<D: Detail>(&mut self, handle: Handle<impl Structural>) -> Outcome {
        let subject = self.resolve(handle)?.id();
        let id = self.registry.detail_info::<D>().id();
        let info = self.subjects.find_mut(subject).ok_or(Error::Missing)?;
        if !info.details_mut().remove(id) {
            return Ok(Status::Noop);
        }
        self.refresh_details(subject)
    }

    /// Move the subject to the chunk matching its enabled details.
    fn refresh_details(&mut self, id: SubjectId) -> Outcome {
        let info = self.subjects.find(id).ok_or(Error::Missing)?;
        let details = info.details().enabled_mask();
        let placement = info.placement().ok_or(Error::Missing)?;
        let chunk = self.chunk(placement.chunk)?;
        if *chunk.details() == details {
            return Ok(Status::Success);
        }
        let traits = chunk.traits().clone();
        self.relocate(id, &traits, &details, Vec::new())?;
        Ok(Status::Success)
    }

    // Subjective

    /// Bind a host object to the subject. It is notified when the subject is despawned.
    pub fn bind_subjective<C: Structural>(
        &mut self,
        handle: Handle<C>,
        subjective: Weak<dyn Subjective>,
    ) -> Outcome {
        let id = self.resolve(handle)?.id();
        let info = self.subjects.find_mut(id).ok_or(Error::Missing)?;
        let replaced = info.subjective().is_some();
        info.set_subjective(Some(subjective));
        Ok(if replaced {
            Status::Reused
        } else {
            Status::Success
        })
    }

    /// The bound host object, if it is still alive.
    pub fn subjective<C: Capability>(
        &self,
        handle: Handle<C>,
    ) -> Outcome<Option<Arc<dyn Subjective>>> {
        Ok(self
            .resolve(handle)?
            .subjective()
            .and_then(Weak::upgrade))
    }

    // Timing

    /// Advance time by `delta`, running `steady_op` once for every steady frame that became due.
    pub fn tick(
        &mut self,
        delta: f32,
        mut steady_op: impl FnMut(&mut Mechanism, f32),
    ) -> TickReport {
        let time = self.clock.time() + delta as f64;
        let mut steady_frames = 0;
        while self.clock.begin_steady_frame(time).is_some() {
            let steady_delta = self.clock.steady_delta();
            steady_op(self, steady_delta);
            self.clock.finish_steady_frame();
            steady_frames += 1;
        }
        let report = TickReport {
            steady_frames,
            frame_ratio: self.clock.steady_frame_ratio(time),
            future_factor: self.clock.steady_future_factor(time),
        };
        self.clock.finish_tick(time);
        report
    }
}

impl Drop for Mechanism {
    fn drop(&mut self) {
        Machine::global().release_mechanism_id(self.id);
    }
}

impl std::fmt::Debug for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mechanism")
            .field("id", &self.id)
            .field("subjects", &self.subjects.len())
            .field("chunks", &self.chunks.len())
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

fn reject_system_flags(mask: Flagmark) -> Outcome<()> {
    if mask.intersects(Flagmark::ALL_SYSTEM_LEVEL) {
        warn!("rejected user write to system flags {:?}", mask);
        return Err(Error::InvalidArgument);
    }
    Ok(())
}
