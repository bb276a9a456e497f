//! Structural changes queued for the next flush.
//!
//! Deferred operations may be queued from any thread, including the workers of a concurrent
//! iteration. [`Mechanism::apply_deferred`] applies them in the order they were queued. An
//! operation whose subject was despawned in the meantime is skipped.

use log::debug;

use super::Mechanism;
use crate::ecs::{
    Trait, TraitSet,
    fingerprint::Flag,
    registry::TraitId,
    status::{Outcome, Status},
    subject::{Deferrable, Handle, SubjectHandle, SubjectId},
    traits::ErasedTrait,
};

pub(super) enum Deferred {
    Spawn(Vec<ErasedTrait>),
    Despawn { handle: SubjectHandle, hard: bool },
    AddTrait { handle: SubjectHandle, value: ErasedTrait },
    SetTrait { handle: SubjectHandle, value: ErasedTrait },
    RemoveTrait { handle: SubjectHandle, id: TraitId },
}

impl Mechanism {
    /// Number of queued operations.
    #[inline]
    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Queue a spawn with initial trait values.
    pub fn spawn_deferred<S: TraitSet>(&self, traits: S) -> Outcome {
        let values = ErasedTrait::from_set(&self.registry, traits);
        self.deferred.push(Deferred::Spawn(values));
        Ok(Status::Deferred)
    }

    /// Queue a despawn. The subject is marked [`Flag::DeferredDespawn`] right away; queueing a
    /// subject already marked is a no-op.
    pub fn despawn_deferred<C: Deferrable>(&self, handle: Handle<C>, hard: bool) -> Outcome {
        if self.set_system_flag(handle, Flag::DeferredDespawn, true)? {
            return Ok(Status::Noop);
        }
        self.deferred.push(Deferred::Despawn {
            handle: handle.cast(),
            hard,
        });
        Ok(Status::Deferred)
    }

    pub fn set_trait_deferred<T: Trait>(&self, handle: Handle<impl Deferrable>, value: T) -> Outcome {
        self.resolve(handle)?;
        let value = ErasedTrait::new(self.registry.trait_id::<T>(), value);
        self.deferred.push(Deferred::SetTrait {
            handle: handle.cast(),
            value,
        });
        Ok(Status::Deferred)
    }

    pub fn add_trait_deferred<T: Trait>(&self, handle: Handle<impl Deferrable>, value: T) -> Outcome {
        self.resolve(handle)?;
        let value = ErasedTrait::new(self.registry.trait_id::<T>(), value);
        self.deferred.push(Deferred::AddTrait {
            handle: handle.cast(),
            value,
        });
        Ok(Status::Deferred)
    }

    pub fn remove_trait_deferred<T: Trait>(&self, handle: Handle<impl Deferrable>) -> Outcome {
        self.resolve(handle)?;
        self.deferred.push(Deferred::RemoveTrait {
            handle: handle.cast(),
            id: self.registry.trait_id::<T>(),
        });
        Ok(Status::Deferred)
    }

    /// Apply every queued operation in order, then reclaim the slots of softly despawned
    /// subjects. Returns [`Status::Noop`] when the queue was empty.
    pub fn apply_deferred(&mut self) -> Outcome {
        if self.deferred.is_empty() {
            return Ok(Status::Noop);
        }
        let mut applied = 0usize;
        let mut skipped = 0usize;
        while let Some(operation) = self.deferred.pop() {
            let outcome = match operation {
                Deferred::Spawn(values) => self.spawn_erased(values).map(|_| Status::Success),
                Deferred::Despawn { handle, hard } => self
                    .live_id(handle)
                    .and_then(|id| self.despawn_place(id, hard)),
                Deferred::AddTrait { handle, value } => self
                    .live_id(handle)
                    .and_then(|id| self.add_erased(id, value)),
                Deferred::SetTrait { handle, value } => self
                    .live_id(handle)
                    .and_then(|id| self.set_erased(id, value)),
                Deferred::RemoveTrait { handle, id } => self
                    .live_id(handle)
                    .and_then(|subject| self.remove_by_id(subject, id)),
            };
            match outcome {
                Ok(_) => applied += 1,
                Err(_) => skipped += 1,
            }
        }
        let mut reclaimed = 0;
        for chunk in self.chunks.iter_mut() {
            reclaimed += chunk.reclaim_stale()?;
        }
        debug!(
            "mechanism {} applied {} deferred operations, skipped {}, reclaimed {} slots",
            self.id.index(),
            applied,
            skipped,
            reclaimed
        );
        Ok(Status::Success)
    }

    fn live_id(&self, handle: SubjectHandle) -> Outcome<SubjectId> {
        Ok(self.subjects.resolve(handle)?.id())
    }
}
