//! Subjects: identities, handles and the per-mechanism subject pool.
//!
//! A subject is identified by a packed 32-bit [`SubjectId`]: the high 8 bits hold the id of the
//! mechanism owning it and the low 24 bits its place in that mechanism's [`SubjectPool`]. Place `0`
//! is never handed out, so the all-zero id is [`SubjectId::INVALID`].
//!
//! A [`Handle`] pairs an id with the generation the subject had when the handle was made. Releasing
//! a place advances its generation, so handles to despawned subjects stop resolving even after the
//! place is reused.

mod handle;
mod pool;

pub use handle::{
    Capability, ConstSubjectHandle, Const, Deferrable, DirectRead, DirectWrite, FlagWrite, Handle,
    Mutable, Solid, SolidSubjectHandle, Structural, SubjectHandle, Unsafe, UnsafeSubjectHandle,
};
pub use pool::{Placement, SubjectInfo, SubjectPool};

use std::fmt;

/// Bits of a [`SubjectId`] holding the place.
pub const PLACE_BITS: u32 = 24;

/// The largest place a mechanism can hand out.
pub const PLACES_PER_MECHANISM_MAX: u32 = (1 << PLACE_BITS) - 1;

/// Dense identifier of a live mechanism.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MechanismId(u8);

impl MechanismId {
    #[inline]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A packed subject identifier: mechanism id in the high byte, place in the low 24 bits.
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubjectId(u32);

impl SubjectId {
    pub const INVALID: SubjectId = SubjectId(0);

    #[inline]
    pub const fn new(mechanism: MechanismId, place: u32) -> Self {
        debug_assert!(place <= PLACES_PER_MECHANISM_MAX);
        Self(((mechanism.0 as u32) << PLACE_BITS) | (place & PLACES_PER_MECHANISM_MAX))
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn mechanism_id(self) -> MechanismId {
        MechanismId((self.0 >> PLACE_BITS) as u8)
    }

    #[inline]
    pub const fn place(self) -> u32 {
        self.0 & PLACES_PER_MECHANISM_MAX
    }

    /// Whether the id names a place at all. Says nothing about liveness.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.place() != 0
    }
}

impl fmt::Debug for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubjectId({}:{})", self.mechanism_id().0, self.place())
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.mechanism_id().0, self.place())
    }
}

/// A host-side object bound to a subject, notified when the subject is despawned.
pub trait Subjective: Send + Sync {
    fn on_despawned(&self, handle: SubjectHandle);
}
