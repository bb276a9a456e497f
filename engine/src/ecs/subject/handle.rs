//! Pass-by-value subject handles with compile-time capabilities.
//!
//! All handle flavours share one 64-bit representation `(id, generation)`. The capability type
//! parameter decides which mechanism operations accept the handle:
//!
//! | Flavour | Structural changes | Deferred changes | Flag writes | Direct trait access |
//! |---------|--------------------|------------------|-------------|---------------------|
//! | [`Unsafe`] | yes | yes | yes | read and write |
//! | [`Mutable`] | yes | yes | yes | no |
//! | [`Solid`] | no | yes | yes | read and write |
//! | [`Const`] | no | no | no | read |
//!
//! Solid handles are what concurrent iteration hands out: everything they allow is safe to call
//! from a worker of a solid scope.

use std::{cmp::Ordering, fmt, hash, marker::PhantomData};

use super::SubjectId;

mod sealed {
    pub trait Sealed {}
}

/// Marker for handle capabilities.
pub trait Capability: sealed::Sealed + 'static {
    const NAME: &'static str;
}

/// Immediate structural changes: spawn, despawn, trait and detail addition or removal.
pub trait Structural: Capability {}

/// Direct trait reads without copying.
pub trait DirectRead: Capability {}

/// Direct trait writes through raw pointers.
pub trait DirectWrite: DirectRead {}

/// Structural changes queued for the next deferred flush.
pub trait Deferrable: Capability {}

/// User-level flag writes.
pub trait FlagWrite: Capability {}

/// Every capability. Used by unchecked internal handles.
pub enum Unsafe {}

/// Any operation except raw trait access.
pub enum Mutable {}

/// Operations safe inside a concurrent iteration.
pub enum Solid {}

/// Read-only access.
pub enum Const {}

macro_rules! capability {
    ($name:ident: $($marker:ident),*) => {
        impl sealed::Sealed for $name {}
        impl Capability for $name {
            const NAME: &'static str = stringify!($name);
        }
        $(impl $marker for $name {})*
    };
}

capability!(Unsafe: Structural, DirectRead, DirectWrite, Deferrable, FlagWrite);
capability!(Mutable: Structural, Deferrable, FlagWrite);
capability!(Solid: DirectRead, DirectWrite, Deferrable, FlagWrite);
capability!(Const: DirectRead);

/// A generational reference to a subject.
pub struct Handle<C: Capability = Mutable> {
    id: SubjectId,
    generation: u32,
    _capability: PhantomData<fn() -> C>,
}

pub type SubjectHandle = Handle<Mutable>;
pub type SolidSubjectHandle = Handle<Solid>;
pub type ConstSubjectHandle = Handle<Const>;
pub type UnsafeSubjectHandle = Handle<Unsafe>;

impl<C: Capability> Handle<C> {
    /// A handle that never resolves.
    pub const INVALID: Self = Self::new(SubjectId::INVALID, 0);

    #[inline]
    pub(crate) const fn new(id: SubjectId, generation: u32) -> Self {
        Self {
            id,
            generation,
            _capability: PhantomData,
        }
    }

    #[inline]
    pub fn id(self) -> SubjectId {
        self.id
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Whether the handle can never resolve. A handle that is not invalid may still be stale.
    #[inline]
    pub fn is_invalid(self) -> bool {
        !self.id.is_valid()
    }

    /// Downgrade to a read-only handle.
    #[inline]
    pub fn to_const(self) -> ConstSubjectHandle {
        self.cast()
    }

    /// Upgrade to a handle with every capability.
    ///
    /// # Safety
    /// The caller takes over the guarantees the capability system would otherwise enforce, in
    /// particular not racing structural changes with concurrent iteration.
    #[inline]
    pub unsafe fn to_unsafe(self) -> UnsafeSubjectHandle {
        self.cast()
    }

    #[inline]
    pub(crate) fn cast<D: Capability>(self) -> Handle<D> {
        Handle::new(self.id, self.generation)
    }
}

impl<C: Structural> Handle<C> {
    /// Downgrade to a handle usable inside a concurrent iteration.
    #[inline]
    pub fn to_solid(self) -> SolidSubjectHandle {
        self.cast()
    }
}

impl From<SubjectHandle> for SolidSubjectHandle {
    #[inline]
    fn from(handle: SubjectHandle) -> Self {
        handle.cast()
    }
}

impl From<SubjectHandle> for ConstSubjectHandle {
    #[inline]
    fn from(handle: SubjectHandle) -> Self {
        handle.cast()
    }
}

impl From<SolidSubjectHandle> for ConstSubjectHandle {
    #[inline]
    fn from(handle: SolidSubjectHandle) -> Self {
        handle.cast()
    }
}

impl<C: Capability> Default for Handle<C> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<C: Capability> Clone for Handle<C> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: Capability> Copy for Handle<C> {}

impl<C: Capability> PartialEq for Handle<C> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.generation == other.generation
    }
}

impl<C: Capability> Eq for Handle<C> {}

impl<C: Capability> PartialOrd for Handle<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C: Capability> Ord for Handle<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.id, self.generation).cmp(&(other.id, other.generation))
    }
}

impl<C: Capability> hash::Hash for Handle<C> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.generation.hash(state);
    }
}

impl<C: Capability> fmt::Debug for Handle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Handle({}@{})", C::NAME, self.id, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::subject::MechanismId;

    #[test]
    fn handles_are_64_bits() {
        assert_eq!(std::mem::size_of::<SubjectHandle>(), 8);
        assert_eq!(std::mem::size_of::<SolidSubjectHandle>(), 8);
        assert_eq!(std::mem::size_of::<ConstSubjectHandle>(), 8);
        assert_eq!(std::mem::size_of::<UnsafeSubjectHandle>(), 8);
    }

    #[test]
    fn generation_distinguishes_handles() {
        // Given
        let id = SubjectId::new(MechanismId::new(1), 5);

        // When
        let first = SubjectHandle::new(id, 0);
        let second = SubjectHandle::new(id, 1);

        // Then
        assert_ne!(first, second);
        assert_eq!(first, SubjectHandle::new(id, 0));
    }

    #[test]
    fn downgrades_keep_identity() {
        // Given
        let handle = SubjectHandle::new(SubjectId::new(MechanismId::new(2), 9), 4);

        // When
        let solid: SolidSubjectHandle = handle.into();
        let constant = solid.to_const();

        // Then
        assert_eq!(solid.id(), handle.id());
        assert_eq!(constant.generation(), 4);
        assert_eq!(handle.to_solid(), solid);
        assert!(SubjectHandle::INVALID.is_invalid());
        assert!(SubjectHandle::default().is_invalid());
        assert_eq!(format!("{:?}", constant), "ConstHandle(2:9@4)");
    }
}
