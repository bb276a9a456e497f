//! Typed row access for iteration.
//!
//! A [`Query`] names the traits an operate-function wants per subject, e.g.
//! `(&Located, &mut BubbleSphere)`. It is resolved once per chunk with [`Query::prepare`], which
//! also decides whether the chunk can serve the query at all, and then fetched row by row.

use crate::{
    all_tuples,
    ecs::{
        Trait,
        fingerprint::Bitmask,
        registry::{TraitId, TypeRegistry},
        storage::Chunk,
    },
};

/// Trait references fetched for one row of a chunk.
///
/// Implemented for `&T`, `&mut T`, their optional forms, `()` and tuples of queries. An optional
/// parameter never excludes a chunk; it fetches `None` where the trait is absent.
pub trait Query: Sized {
    type Item<'c>;

    /// Per-chunk resolution, typically column indices.
    type State: Copy + Send + Sync;

    /// Register the accessed trait types and record how they are accessed.
    fn spec(registry: &TypeRegistry, spec: &mut QuerySpec);

    /// Resolve the query against a chunk. `None` when the chunk lacks a requested trait.
    fn prepare(chunk: &Chunk, registry: &TypeRegistry) -> Option<Self::State>;

    /// Fetch the items of one row.
    ///
    /// # Safety
    /// `state` must come from [`Query::prepare`] on the same chunk, `row` must be in bounds, and
    /// the caller must guarantee that no other reference to the row's mutably requested traits
    /// exists for `'c`.
    unsafe fn fetch<'c>(chunk: &'c Chunk, state: &Self::State, row: usize) -> Self::Item<'c>;
}

/// The traits a query accesses and whether each access is mutable.
#[derive(Debug, Default, Clone)]
pub struct QuerySpec {
    params: Vec<(TraitId, bool)>,
}

impl QuerySpec {
    pub fn of<Q: Query>(registry: &TypeRegistry) -> Self {
        let mut spec = Self::default();
        Q::spec(registry, &mut spec);
        spec
    }

    #[inline]
    pub fn push(&mut self, id: TraitId, mutable: bool) {
        self.params.push((id, mutable));
    }

    #[inline]
    pub fn params(&self) -> &[(TraitId, bool)] {
        &self.params
    }

    /// The accessed traits as a mask.
    pub fn traits(&self) -> Bitmask {
        self.params.iter().map(|(id, _)| id.index()).collect()
    }

    /// A query is valid unless a trait accessed mutably is accessed a second time.
    pub fn is_valid(&self) -> bool {
        self.params.iter().enumerate().all(|(i, (id, mutable))| {
            self.params[i + 1..]
                .iter()
                .all(|(other, other_mutable)| other != id || !(*mutable || *other_mutable))
        })
    }
}

fn column_of<T: Trait>(chunk: &Chunk, registry: &TypeRegistry) -> Option<usize> {
    let index = chunk.column_index(registry.find_trait::<T>()?)?;
    chunk.column(index).ensure_type::<T>();
    Some(index)
}

impl<T: Trait> Query for &T {
    type Item<'c> = &'c T;
    type State = usize;

    fn spec(registry: &TypeRegistry, spec: &mut QuerySpec) {
        spec.push(registry.trait_id::<T>(), false);
    }

    fn prepare(chunk: &Chunk, registry: &TypeRegistry) -> Option<usize> {
        column_of::<T>(chunk, registry)
    }

    #[inline]
    unsafe fn fetch<'c>(chunk: &'c Chunk, state: &usize, row: usize) -> &'c T {
        // SAFETY: `prepare` checked the column type; the caller checked the row.
        unsafe { chunk.column(*state).ptr_at(row).cast::<T>().as_ref() }
    }
}

impl<T: Trait> Query for &mut T {
    type Item<'c> = &'c mut T;
    type State = usize;

    fn spec(registry: &TypeRegistry, spec: &mut QuerySpec) {
        spec.push(registry.trait_id::<T>(), true);
    }

    fn prepare(chunk: &Chunk, registry: &TypeRegistry) -> Option<usize> {
        column_of::<T>(chunk, registry)
    }

    #[inline]
    unsafe fn fetch<'c>(chunk: &'c Chunk, state: &usize, row: usize) -> &'c mut T {
        let mut ptr = chunk.column(*state).ptr_at(row).cast::<T>();
        // SAFETY: `prepare` checked the column type; the caller guarantees exclusive row access.
        unsafe { ptr.as_mut() }
    }
}

impl<T: Trait> Query for Option<&T> {
    type Item<'c> = Option<&'c T>;
    type State = Option<usize>;

    fn spec(registry: &TypeRegistry, spec: &mut QuerySpec) {
        spec.push(registry.trait_id::<T>(), false);
    }

    fn prepare(chunk: &Chunk, registry: &TypeRegistry) -> Option<Option<usize>> {
        Some(column_of::<T>(chunk, registry))
    }

    #[inline]
    unsafe fn fetch<'c>(chunk: &'c Chunk, state: &Option<usize>, row: usize) -> Option<&'c T> {
        // SAFETY: Forwarded from the caller.
        state.map(|index| unsafe { <&T as Query>::fetch(chunk, &index, row) })
    }
}

impl<T: Trait> Query for Option<&mut T> {
    type Item<'c> = Option<&'c mut T>;
    type State = Option<usize>;

    fn spec(registry: &TypeRegistry, spec: &mut QuerySpec) {
        spec.push(registry.trait_id::<T>(), true);
    }

    fn prepare(chunk: &Chunk, registry: &TypeRegistry) -> Option<Option<usize>> {
        Some(column_of::<T>(chunk, registry))
    }

    #[inline]
    unsafe fn fetch<'c>(
        chunk: &'c Chunk,
        state: &Option<usize>,
        row: usize,
    ) -> Option<&'c mut T> {
        // SAFETY: Forwarded from the caller.
        state.map(|index| unsafe { <&mut T as Query>::fetch(chunk, &index, row) })
    }
}

impl Query for () {
    type Item<'c> = ();
    type State = ();

    fn spec(_registry: &TypeRegistry, _spec: &mut QuerySpec) {}

    fn prepare(_chunk: &Chunk, _registry: &TypeRegistry) -> Option<()> {
        Some(())
    }

    #[inline]
    unsafe fn fetch<'c>(_chunk: &'c Chunk, _state: &(), _row: usize) {}
}

macro_rules! tuple_query {
    ($($name: ident),*) => {
        #[allow(non_snake_case)]
        impl<$($name: Query),*> Query for ($($name,)*) {
            type Item<'c> = ($($name::Item<'c>,)*);
            type State = ($($name::State,)*);

            fn spec(registry: &TypeRegistry, spec: &mut QuerySpec) {
                $($name::spec(registry, spec);)*
            }

            fn prepare(chunk: &Chunk, registry: &TypeRegistry) -> Option<Self::State> {
                Some(($($name::prepare(chunk, registry)?,)*))
            }

            #[inline]
            unsafe fn fetch<'c>(chunk: &'c Chunk, state: &Self::State, row: usize) -> Self::Item<'c> {
                let ($($name,)*) = state;
                // SAFETY: Forwarded from the caller.
                unsafe { ($($name::fetch(chunk, $name, row),)*) }
            }
        }
    }
}

all_tuples!(tuple_query);
