//! Raw, index addressed memory for type-erased trait columns.
//!
//! [`IndexedMemory`] owns one contiguous allocation of uniformly sized elements and hands out
//! pointers by index. It knows nothing about the element type: it never initializes, reads or drops
//! elements. [`Column`](super::column::Column) builds the initialized, typed view on top of it.
//!
//! # Safety Contract
//!
//! Callers must only access indices below the reserved capacity, only read initialized elements,
//! and drop elements before the memory is released.

use std::{
    alloc::{self, Layout},
    cmp,
    ptr::NonNull,
};

/// How the allocation grows once the reserved capacity exceeds the allocated one.
#[derive(Debug, Clone)]
pub enum GrowthStrategy {
    /// Multiply the current capacity by a factor.
    Multiply(usize),
    /// Add a fixed number of elements.
    Buffer(usize),
    /// Grow to exactly the requested capacity.
    Exact,
}

impl GrowthStrategy {
    /// The capacity to allocate when `requested` elements are needed and `current` are allocated.
    pub fn new_capacity(&self, current: usize, requested: usize) -> usize {
        match self {
            Self::Multiply(factor) => cmp::max(current * factor, requested),
            Self::Buffer(buffer) => cmp::max(current + buffer, requested),
            Self::Exact => requested,
        }
    }
}

pub struct IndexedMemory {
    ptr: NonNull<u8>,
    /// Allocated element capacity.
    capacity: usize,
    element_layout: Layout,
    growth_strat: GrowthStrategy,
    /// Element capacity requested by the owner. Never exceeds `capacity`.
    reserved_capacity: usize,
}

impl IndexedMemory {
    #[inline]
    pub const fn new(element_layout: Layout, growth_strat: GrowthStrategy) -> Self {
        Self {
            ptr: NonNull::dangling(),
            capacity: 0,
            element_layout,
            growth_strat,
            reserved_capacity: 0,
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub const fn reserved(&self) -> usize {
        self.reserved_capacity
    }

    /// Pointer to the element at `index`.
    ///
    /// Writing through the pointer is allowed as long as no other reference to the same element is
    /// alive; the memory is not owned by `&self`.
    #[inline]
    pub fn ptr_at(&self, index: usize) -> NonNull<u8> {
        debug_assert!(
            index < self.reserved_capacity,
            "index {} out of bounds (reserved: {})",
            index,
            self.reserved_capacity
        );
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(index * self.element_layout.size())) }
    }

    /// Reserve room for `additional` more elements using the growth strategy.
    pub fn reserve(&mut self, additional: usize) {
        self.reserved_capacity += additional;
        if self.reserved_capacity <= self.capacity {
            return;
        }
        let new_capacity = self
            .growth_strat
            .new_capacity(self.capacity, self.reserved_capacity);
        self.grow_to(new_capacity);
    }

    fn grow_to(&mut self, capacity: usize) {
        // Zero sized elements never allocate; a dangling, aligned pointer serves every index.
        if self.element_layout.size() == 0 {
            self.ptr = dangling_for(self.element_layout);
            self.capacity = usize::MAX;
            return;
        }

        let new_layout = array_layout(self.element_layout, capacity);
        let new_ptr = if self.capacity == 0 {
            unsafe { alloc::alloc(new_layout) }
        } else {
            let old_layout = array_layout(self.element_layout, self.capacity);
            unsafe { alloc::realloc(self.ptr.as_ptr(), old_layout, new_layout.size()) }
        };

        self.ptr = match NonNull::new(new_ptr) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(new_layout),
        };
        self.capacity = capacity;
    }
}

fn array_layout(element: Layout, count: usize) -> Layout {
    let size = element
        .size()
        .checked_mul(count)
        .expect("column capacity overflow");
    Layout::from_size_align(size, element.align()).expect("column layout overflow")
}

fn dangling_for(layout: Layout) -> NonNull<u8> {
    // SAFETY: An alignment is never zero.
    unsafe { NonNull::new_unchecked(layout.align() as *mut u8) }
}

impl Drop for IndexedMemory {
    fn drop(&mut self) {
        if self.capacity > 0 && self.element_layout.size() > 0 {
            let layout = array_layout(self.element_layout, self.capacity);
            unsafe {
                alloc::dealloc(self.ptr.as_ptr(), layout);
            }
        }
    }
}

// SAFETY: The memory is owned; element thread safety is the owner's responsibility.
unsafe impl Send for IndexedMemory {}
unsafe impl Sync for IndexedMemory {}
