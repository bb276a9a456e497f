use std::ptr::NonNull;

use crate::ecs::{
    Trait,
    registry::{TraitId, TypeRegistry},
    traits::{TraitSet, TraitTarget},
};

type WriteFn = Box<dyn FnOnce(NonNull<u8>) + Send>;

/// A trait value with its type erased, carried by deferred operations until it is written into a
/// chunk column. Dropping an unwritten value drops the trait normally.
pub struct ErasedTrait {
    id: TraitId,
    write: WriteFn,
}

impl ErasedTrait {
    pub fn new<T: Trait>(id: TraitId, value: T) -> Self {
        Self {
            id,
            // SAFETY: `write_into` requires a pointer to an uninitialized cell of type `T`.
            write: Box::new(move |ptr: NonNull<u8>| unsafe {
                ptr.as_ptr().cast::<T>().write(value)
            }),
        }
    }

    /// Erase every value of a trait set.
    pub fn from_set<S: TraitSet>(registry: &TypeRegistry, set: S) -> Vec<ErasedTrait> {
        let mut erased = ErasedTraits(Vec::new());
        set.apply(registry, &mut erased);
        erased.0
    }

    #[inline]
    pub fn id(&self) -> TraitId {
        self.id
    }

    /// Move the value into memory.
    ///
    /// # Safety
    /// `ptr` must point to properly aligned, uninitialized memory for the erased trait type.
    #[inline]
    pub unsafe fn write_into(self, ptr: NonNull<u8>) {
        (self.write)(ptr)
    }
}

impl std::fmt::Debug for ErasedTrait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasedTrait").field("id", &self.id).finish()
    }
}

struct ErasedTraits(Vec<ErasedTrait>);

impl TraitTarget for ErasedTraits {
    fn apply<T: Trait>(&mut self, id: TraitId, value: T) {
        self.0.push(ErasedTrait::new(id, value));
    }
}

#[cfg(test)]
mod tests {
    use std::{
        mem::MaybeUninit,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;

    #[derive(Trait, Default)]
    struct Counted(Option<Arc<AtomicUsize>>);

    impl Drop for Counted {
        fn drop(&mut self) {
            if let Some(counter) = &self.0 {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[derive(Trait, Default, Debug, PartialEq)]
    struct Value(u64);

    #[test]
    fn writes_value_into_memory() {
        // Given
        let registry = TypeRegistry::new();
        let mut erased = ErasedTrait::from_set(&registry, Value(42));
        let mut cell = MaybeUninit::<Value>::uninit();

        // When
        let value = erased.remove(0);
        unsafe { value.write_into(NonNull::from(&mut cell).cast()) };

        // Then
        assert_eq!(unsafe { cell.assume_init() }, Value(42));
    }

    #[test]
    fn unwritten_value_is_dropped() {
        // Given
        let registry = TypeRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let erased = ErasedTrait::from_set(&registry, Counted(Some(Arc::clone(&counter))));

        // When
        drop(erased);

        // Then
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
