use std::{
    alloc::Layout,
    any::TypeId as StdTypeId,
    fmt,
    ptr::NonNull,
};

use crate::ecs::{Trait, fingerprint::Bitmask};

/// Dense identifier of a registered trait type. Doubles as the trait's bit in signatures.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraitId(u16);

impl TraitId {
    #[inline]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Dense identifier of a registered detail class. Doubles as the class's bit in signatures.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DetailId(u16);

impl DetailId {
    #[inline]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Descriptor of a trait type used by type-erased trait columns.
#[derive(Clone, Copy)]
pub struct TraitInfo {
    id: TraitId,
    type_id: StdTypeId,
    name: &'static str,
    layout: Layout,
    drop_fn: unsafe fn(NonNull<u8>),
    default_fn: unsafe fn(NonNull<u8>),
}

impl TraitInfo {
    pub(crate) fn new<T: Trait>(id: TraitId) -> Self {
        let drop_fn = if std::mem::needs_drop::<T>() {
            Self::drop_impl::<T>
        } else {
            Self::drop_noop
        };
        Self {
            id,
            type_id: StdTypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            layout: Layout::new::<T>(),
            drop_fn,
            default_fn: Self::default_impl::<T>,
        }
    }

    #[inline]
    pub fn id(&self) -> TraitId {
        self.id
    }

    #[inline]
    pub fn type_id(&self) -> StdTypeId {
        self.type_id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Drops the value behind the pointer in place.
    #[inline]
    pub fn drop_fn(&self) -> unsafe fn(NonNull<u8>) {
        self.drop_fn
    }

    /// Bits a filter requires for this trait. Traits have no base chain, so this is the own bit.
    #[inline]
    pub fn inclusion(&self) -> Bitmask {
        Bitmask::with(self.id.index())
    }

    /// Bits a filter rejects for this trait: the own bit.
    #[inline]
    pub fn exclusion(&self) -> Bitmask {
        Bitmask::with(self.id.index())
    }

    /// Writes `Default::default()` into uninitialized memory behind the pointer.
    #[inline]
    pub fn default_fn(&self) -> unsafe fn(NonNull<u8>) {
        self.default_fn
    }

    unsafe fn drop_impl<T>(ptr: NonNull<u8>) {
        unsafe {
            std::ptr::drop_in_place(ptr.as_ptr() as *mut T);
        }
    }

    unsafe fn drop_noop(_ptr: NonNull<u8>) {}

    unsafe fn default_impl<T: Default>(ptr: NonNull<u8>) {
        unsafe {
            std::ptr::write(ptr.as_ptr() as *mut T, T::default());
        }
    }
}

impl fmt::Debug for TraitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraitInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("layout", &self.layout)
            .finish()
    }
}

/// Descriptor of a detail class.
///
/// The inclusion mask carries the class's own bit together with the bits of its whole base chain,
/// so "is a" checks are a single bit test. The exclusion mask carries the own bit only.
#[derive(Debug)]
pub struct DetailInfo {
    id: DetailId,
    type_id: StdTypeId,
    name: &'static str,
    base: Option<DetailId>,
    inclusion: Bitmask,
    exclusion: Bitmask,
}

impl DetailInfo {
    pub(crate) fn new(
        id: DetailId,
        type_id: StdTypeId,
        name: &'static str,
        base: Option<&DetailInfo>,
    ) -> Self {
        let exclusion = Bitmask::with(id.index());
        let mut inclusion = exclusion.clone();
        if let Some(base) = base {
            inclusion.union_with(&base.inclusion);
        }
        Self {
            id,
            type_id,
            name,
            base: base.map(|base| base.id),
            inclusion,
            exclusion,
        }
    }

    #[inline]
    pub fn id(&self) -> DetailId {
        self.id
    }

    #[inline]
    pub fn type_id(&self) -> StdTypeId {
        self.type_id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The direct base class, if any.
    #[inline]
    pub fn base(&self) -> Option<DetailId> {
        self.base
    }

    #[inline]
    pub fn inclusion(&self) -> &Bitmask {
        &self.inclusion
    }

    #[inline]
    pub fn exclusion(&self) -> &Bitmask {
        &self.exclusion
    }

    /// Whether this class is `other` or derives from it.
    #[inline]
    pub fn is_a(&self, other: DetailId) -> bool {
        self.inclusion.contains(other.index())
    }
}
