//! A type-erased column of trait values.
//!
//! Every element `0..len` of a column is initialized at all times: rows are appended
//! default-initialized, and rows released by their subject are reset to the default rather than
//! left uninitialized. This lets a column be viewed as a plain `&[T]` and dropped wholesale.

use std::{any::TypeId, ptr::NonNull};

use super::mem::{GrowthStrategy, IndexedMemory};
use crate::ecs::{Trait, registry::TraitInfo, traits::ErasedTrait};

pub struct Column {
    data: IndexedMemory,
    len: usize,
    info: TraitInfo,
}

impl Column {
    #[inline]
    pub fn new(info: TraitInfo) -> Self {
        Self {
            data: IndexedMemory::new(info.layout(), GrowthStrategy::Multiply(2)),
            len: 0,
            info,
        }
    }

    #[inline]
    pub fn info(&self) -> &TraitInfo {
        &self.info
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a default-initialized element.
    pub fn push_default(&mut self) {
        self.data.reserve(1);
        // SAFETY: The reserved element at `len` is uninitialized.
        unsafe { (self.info.default_fn())(self.data.ptr_at(self.len)) };
        self.len += 1;
    }

    /// Pointer to an initialized element.
    #[inline]
    pub fn ptr_at(&self, row: usize) -> NonNull<u8> {
        debug_assert!(row < self.len, "row {} out of bounds ({})", row, self.len);
        self.data.ptr_at(row)
    }

    /// Drop the element and replace it with the default value.
    pub fn reset(&mut self, row: usize) {
        let ptr = self.ptr_at(row);
        unsafe {
            (self.info.drop_fn())(ptr);
            (self.info.default_fn())(ptr);
        }
    }

    /// Drop the element and move an erased value of the column's type in its place.
    ///
    /// # Safety
    /// `value` must be of the column's trait type.
    pub unsafe fn replace_erased(&mut self, row: usize, value: ErasedTrait) {
        debug_assert_eq!(value.id(), self.info.id());
        let ptr = self.ptr_at(row);
        unsafe {
            (self.info.drop_fn())(ptr);
            value.write_into(ptr);
        }
    }

    /// Move the element at `row` into `target[target_row]`, dropping what was there, and refill
    /// `row` with the default value.
    ///
    /// # Safety
    /// Both columns must store the same trait type.
    pub unsafe fn move_into(&mut self, row: usize, target: &mut Column, target_row: usize) {
        debug_assert_eq!(self.info.id(), target.info.id());
        let source = self.ptr_at(row);
        let destination = target.ptr_at(target_row);
        unsafe {
            (target.info.drop_fn())(destination);
            std::ptr::copy_nonoverlapping(
                source.as_ptr(),
                destination.as_ptr(),
                self.info.layout().size(),
            );
            (self.info.default_fn())(source);
        }
    }

    pub fn get<T: Trait>(&self, row: usize) -> Option<&T> {
        self.ensure_type::<T>();
        if row >= self.len {
            return None;
        }
        // SAFETY: Type checked above, the row is initialized.
        Some(unsafe { self.data.ptr_at(row).cast::<T>().as_ref() })
    }

    pub fn get_mut<T: Trait>(&mut self, row: usize) -> Option<&mut T> {
        self.ensure_type::<T>();
        if row >= self.len {
            return None;
        }
        // SAFETY: Type checked above, the row is initialized and `&mut self` is exclusive.
        Some(unsafe { self.data.ptr_at(row).cast::<T>().as_mut() })
    }

    /// View every element, including those of free and stale slots.
    pub fn as_slice<T: Trait>(&self) -> &[T] {
        self.ensure_type::<T>();
        if self.len == 0 {
            return &[];
        }
        // SAFETY: Type checked above, elements `0..len` are contiguous and initialized.
        unsafe { std::slice::from_raw_parts(self.data.ptr_at(0).cast::<T>().as_ptr(), self.len) }
    }

    /// Panics when `T` is not the column's trait type.
    #[inline]
    pub fn ensure_type<T: Trait>(&self) {
        assert!(
            TypeId::of::<T>() == self.info.type_id(),
            "type mismatch: attempted to use {} with column storing {}",
            std::any::type_name::<T>(),
            self.info.name()
        );
    }

    #[inline]
    pub fn is_type<T: Trait>(&self) -> bool {
        TypeId::of::<T>() == self.info.type_id()
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        for row in 0..self.len {
            unsafe { (self.info.drop_fn())(self.data.ptr_at(row)) };
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::ecs::registry::TypeRegistry;

    #[derive(Trait, Default, Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Trait, Default)]
    struct Tracker(Option<Arc<AtomicUsize>>);

    impl Drop for Tracker {
        fn drop(&mut self) {
            if let Some(drops) = &self.0 {
                drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[test]
    fn pushed_rows_start_default() {
        // Given
        let registry = TypeRegistry::new();
        let mut column = Column::new(registry.trait_info::<Position>());

        // When
        column.push_default();
        column.push_default();
        column.get_mut::<Position>(1).unwrap().x = 4.0;

        // Then
        assert_eq!(column.len(), 2);
        assert_eq!(
            column.as_slice::<Position>(),
            &[Position::default(), Position { x: 4.0, y: 0.0 }]
        );
        assert!(column.get::<Position>(2).is_none());
    }

    #[test]
    fn reset_drops_and_restores_default() {
        // Given
        let registry = TypeRegistry::new();
        let drops = Arc::new(AtomicUsize::new(0));
        let mut column = Column::new(registry.trait_info::<Tracker>());
        column.push_default();
        *column.get_mut::<Tracker>(0).unwrap() = Tracker(Some(Arc::clone(&drops)));

        // When
        column.reset(0);

        // Then
        assert_eq!(drops.load(Ordering::Relaxed), 1);
        assert!(column.get::<Tracker>(0).unwrap().0.is_none());
    }

    #[test]
    fn move_into_transfers_without_double_drop() {
        // Given
        let registry = TypeRegistry::new();
        let drops = Arc::new(AtomicUsize::new(0));
        let mut source = Column::new(registry.trait_info::<Tracker>());
        let mut target = Column::new(registry.trait_info::<Tracker>());
        source.push_default();
        target.push_default();
        *source.get_mut::<Tracker>(0).unwrap() = Tracker(Some(Arc::clone(&drops)));

        // When
        unsafe { source.move_into(0, &mut target, 0) };
        drop(source);

        // Then
        assert_eq!(drops.load(Ordering::Relaxed), 0);
        drop(target);
        assert_eq!(drops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn drop_releases_every_row() {
        // Given
        let registry = TypeRegistry::new();
        let drops = Arc::new(AtomicUsize::new(0));
        let mut column = Column::new(registry.trait_info::<Tracker>());
        for row in 0..5 {
            column.push_default();
            *column.get_mut::<Tracker>(row).unwrap() = Tracker(Some(Arc::clone(&drops)));
        }

        // When
        drop(column);

        // Then
        assert_eq!(drops.load(Ordering::Relaxed), 5);
    }

    #[test]
    #[should_panic(expected = "type mismatch")]
    fn wrong_type_panics() {
        // Given
        let registry = TypeRegistry::new();
        let mut column = Column::new(registry.trait_info::<Position>());
        column.push_default();

        // When
        column.get::<Tracker>(0);
    }
}
