//! Details: behavioural components with class identity and an enabled state.
//!
//! Unlike traits, details are stored per subject rather than in chunk columns, and they form a
//! single-inheritance hierarchy declared through the associated [`Detail::Base`] type:
//!
//! ```ignore
//! #[derive(Detail)]
//! struct Steering { .. }
//!
//! #[derive(Detail)]
//! #[detail(base = Steering)]
//! struct Flocking { .. }
//! ```
//!
//! A subject carrying an enabled `Flocking` matches filters asking for `Steering` as well. Only
//! enabled details take part in the subject's fingerprint.

use std::{any::Any, sync::Arc};

use crate::ecs::{
    fingerprint::Bitmask,
    registry::{DetailId, DetailInfo, TypeRegistry},
};

/// A behavioural component class.
pub trait Detail: Any + Send + Sync {
    /// The base class, or `()` for a root class.
    type Base: DetailBase;
}

/// Resolves the base of a detail class. Implemented for `()` (no base) and every [`Detail`].
pub trait DetailBase: 'static {
    fn base_info(registry: &TypeRegistry) -> Option<Arc<DetailInfo>>;
}

impl DetailBase for () {
    #[inline]
    fn base_info(_registry: &TypeRegistry) -> Option<Arc<DetailInfo>> {
        None
    }
}

impl<D: Detail> DetailBase for D {
    #[inline]
    fn base_info(registry: &TypeRegistry) -> Option<Arc<DetailInfo>> {
        Some(registry.detail_info::<D>())
    }
}

struct Entry {
    info: Arc<DetailInfo>,
    enabled: bool,
    value: Box<dyn Any + Send + Sync>,
}

/// The detail instances of one subject.
#[derive(Default)]
pub struct DetailSet {
    entries: Vec<Entry>,
}

impl DetailSet {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn position(&self, id: DetailId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.info.id() == id)
    }

    /// Insert an enabled detail, replacing an existing instance of the exact same class. Returns the
    /// replaced value's enabled state when one existed.
    pub fn insert<D: Detail>(&mut self, info: Arc<DetailInfo>, detail: D) -> Option<bool> {
        match self.position(info.id()) {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.value = Box::new(detail);
                Some(entry.enabled)
            }
            None => {
                self.entries.push(Entry {
                    info,
                    enabled: true,
                    value: Box::new(detail),
                });
                None
            }
        }
    }

    /// Remove the instance of the exact class. Returns `true` when one was present.
    pub fn remove(&mut self, id: DetailId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn get<D: Detail>(&self, id: DetailId) -> Option<&D> {
        let index = self.position(id)?;
        self.entries[index].value.downcast_ref::<D>()
    }

    pub fn get_mut<D: Detail>(&mut self, id: DetailId) -> Option<&mut D> {
        let index = self.position(id)?;
        self.entries[index].value.downcast_mut::<D>()
    }

    /// Whether any instance (enabled or not) is of the class or derives from it.
    pub fn contains_kind_of(&self, id: DetailId) -> bool {
        self.entries.iter().any(|entry| entry.info.is_a(id))
    }

    /// The enabled state of the exact class, if present.
    pub fn is_enabled(&self, id: DetailId) -> Option<bool> {
        self.position(id).map(|index| self.entries[index].enabled)
    }

    /// Change the enabled state of the exact class. Returns the previous state, if present.
    pub fn set_enabled(&mut self, id: DetailId, enabled: bool) -> Option<bool> {
        let index = self.position(id)?;
        Some(std::mem::replace(&mut self.entries[index].enabled, enabled))
    }

    /// The signature contribution of the enabled instances.
    pub fn enabled_mask(&self) -> Bitmask {
        let mut mask = Bitmask::new();
        for entry in self.entries.iter().filter(|entry| entry.enabled) {
            mask.union_with(entry.info.inclusion());
        }
        mask
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for DetailSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|entry| (entry.info.name(), entry.enabled)),
            )
            .finish()
    }
}
