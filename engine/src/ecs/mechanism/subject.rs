use crate::ecs::{
    Trait,
    fingerprint::{Flag, Flagmark},
    status::{Error, Outcome, Status},
    storage::Slot,
    subject::{SolidSubjectHandle, SubjectId},
};

use super::Mechanism;

/// The subject currently visited by an iteration.
///
/// Grants what is safe while chunks are solid: flag access, trait presence checks and deferred
/// structural changes.
pub struct Subject<'m> {
    mechanism: &'m Mechanism,
    handle: SolidSubjectHandle,
    slot: &'m Slot,
}

impl<'m> Subject<'m> {
    #[inline]
    pub(super) fn new(mechanism: &'m Mechanism, handle: SolidSubjectHandle, slot: &'m Slot) -> Self {
        Self {
            mechanism,
            handle,
            slot,
        }
    }

    #[inline]
    pub fn mechanism(&self) -> &'m Mechanism {
        self.mechanism
    }

    #[inline]
    pub fn handle(&self) -> SolidSubjectHandle {
        self.handle
    }

    #[inline]
    pub fn id(&self) -> SubjectId {
        self.handle.id()
    }

    #[inline]
    pub fn flagmark(&self) -> Flagmark {
        self.slot.flagmark().load()
    }

    #[inline]
    pub fn has_flag(&self, flag: Flag) -> bool {
        self.flagmark().contains(flag)
    }

    /// Set or clear a user-level flag.
    pub fn set_flag(&self, flag: Flag, state: bool) -> Outcome {
        if flag.is_system_level() {
            return Err(Error::InvalidArgument);
        }
        let previous = self.slot.flagmark().set(flag, state);
        Ok(Status::from_changed(previous != state))
    }

    /// Flip a user-level flag, returning its new state.
    pub fn toggle_flag(&self, flag: Flag) -> Outcome<bool> {
        if flag.is_system_level() {
            return Err(Error::InvalidArgument);
        }
        Ok(self.slot.flagmark().toggle(flag))
    }

    pub fn has_trait<T: Trait>(&self) -> bool {
        self.mechanism.has_trait::<T>(self.handle)
    }

    pub fn despawn_deferred(&self, hard: bool) -> Outcome {
        self.mechanism.despawn_deferred(self.handle, hard)
    }

    pub fn set_trait_deferred<T: Trait>(&self, value: T) -> Outcome {
        self.mechanism.set_trait_deferred(self.handle, value)
    }

    pub fn add_trait_deferred<T: Trait>(&self, value: T) -> Outcome {
        self.mechanism.add_trait_deferred(self.handle, value)
    }

    pub fn remove_trait_deferred<T: Trait>(&self) -> Outcome {
        self.mechanism.remove_trait_deferred::<T>(self.handle)
    }
}

impl std::fmt::Debug for Subject<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject")
            .field("handle", &self.handle)
            .field("flagmark", &self.flagmark())
            .finish()
    }
}
