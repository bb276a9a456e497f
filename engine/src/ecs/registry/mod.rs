//! Process-wide registry of trait types and detail classes.
//!
//! Every trait type and detail class encountered is assigned a dense id the first time it is seen.
//! The id doubles as the type's bit position in [`Fingerprint`](crate::ecs::fingerprint::Fingerprint)
//! masks. Registration is idempotent: once assigned, a type's id and masks never change for the
//! lifetime of the registry.
//!
//! # Thread Safety
//!
//! Lookups of already registered types are lock-free reads through `DashMap`. First registrations
//! take a short write lock on the descriptor table. A registry is shared between all mechanisms
//! through an `Arc`; [`TypeRegistry::global`] is the process-wide instance, while tests usually build
//! their own with [`TypeRegistry::new`].

mod info;

pub use info::{DetailId, DetailInfo, TraitId, TraitInfo};

use std::{
    any::TypeId as StdTypeId,
    sync::{
        Arc, OnceLock, RwLock,
        atomic::{AtomicU32, Ordering},
    },
};

use dashmap::DashMap;

use crate::ecs::{Detail, Trait, detail::DetailBase};

/// The largest number of distinct traits or details a registry accepts.
pub const TYPES_MAX: u32 = u16::MAX as u32;

pub struct TypeRegistry {
    trait_map: DashMap<StdTypeId, TraitId>,
    traits: RwLock<Vec<Option<TraitInfo>>>,
    next_trait: AtomicU32,

    detail_map: DashMap<StdTypeId, DetailId>,
    details: RwLock<Vec<Option<Arc<DetailInfo>>>>,
    next_detail: AtomicU32,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            trait_map: DashMap::new(),
            traits: RwLock::new(Vec::new()),
            next_trait: AtomicU32::new(0),
            detail_map: DashMap::new(),
            details: RwLock::new(Vec::new()),
            next_detail: AtomicU32::new(0),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Arc<TypeRegistry> {
        static GLOBAL: OnceLock<Arc<TypeRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(TypeRegistry::new()))
    }

    /// Get the id of trait `T`, registering it on first use.
    ///
    /// Panics when more than [`TYPES_MAX`] traits are registered.
    pub fn trait_id<T: Trait>(&self) -> TraitId {
        let std_type_id = StdTypeId::of::<T>();

        if let Some(existing) = self.trait_map.get(&std_type_id) {
            return *existing;
        }

        match self.trait_map.entry(std_type_id) {
            dashmap::Entry::Occupied(occupied) => *occupied.get(),
            dashmap::Entry::Vacant(vacant) => {
                let value = self.next_trait.fetch_add(1, Ordering::Relaxed);
                assert!(
                    value < TYPES_MAX,
                    "too many trait types registered, cannot register '{}'",
                    std::any::type_name::<T>()
                );
                let id = TraitId::new(value as u16);

                let mut traits = self.traits.write().unwrap();
                let index = id.index();
                if index >= traits.len() {
                    traits.resize(index + 1, None);
                }
                traits[index] = Some(TraitInfo::new::<T>(id));
                vacant.insert(id);

                log::trace!("registered trait '{}' as {:?}", std::any::type_name::<T>(), id);
                id
            }
        }
    }

    /// Get the descriptor of trait `T`, registering it on first use.
    pub fn trait_info<T: Trait>(&self) -> TraitInfo {
        let id = self.trait_id::<T>();
        let traits = self.traits.read().unwrap();
        traits[id.index()].expect("registered trait has a descriptor")
    }

    /// Get the id of trait `T` without registering it.
    #[inline]
    pub fn find_trait<T: Trait>(&self) -> Option<TraitId> {
        self.trait_map
            .get(&StdTypeId::of::<T>())
            .map(|entry| *entry.value())
    }

    /// Get the descriptor of a registered trait.
    #[inline]
    pub fn trait_info_of(&self, id: TraitId) -> Option<TraitInfo> {
        let traits = self.traits.read().unwrap();
        traits.get(id.index()).and_then(|info| *info)
    }

    /// Get the descriptor of detail class `D`, registering it (and its base chain) on first use.
    ///
    /// Panics when more than [`TYPES_MAX`] details are registered.
    pub fn detail_info<D: Detail>(&self) -> Arc<DetailInfo> {
        let std_type_id = StdTypeId::of::<D>();

        if let Some(existing) = self.detail_map.get(&std_type_id) {
            let id = *existing;
            drop(existing);
            if let Some(info) = self.detail_info_of(id) {
                return info;
            }
        }

        // Bases are resolved before taking the map entry so the recursion never re-enters a
        // locked shard.
        let base = <D::Base as DetailBase>::base_info(self);

        let id = match self.detail_map.entry(std_type_id) {
            dashmap::Entry::Occupied(occupied) => *occupied.get(),
            dashmap::Entry::Vacant(vacant) => {
                let value = self.next_detail.fetch_add(1, Ordering::Relaxed);
                assert!(
                    value < TYPES_MAX,
                    "too many detail classes registered, cannot register '{}'",
                    std::any::type_name::<D>()
                );
                let id = DetailId::new(value as u16);
                let info = Arc::new(DetailInfo::new(
                    id,
                    std_type_id,
                    std::any::type_name::<D>(),
                    base.as_deref(),
                ));

                let mut details = self.details.write().unwrap();
                let index = id.index();
                if index >= details.len() {
                    details.resize(index + 1, None);
                }
                details[index] = Some(info);
                vacant.insert(id);

                log::trace!("registered detail '{}' as {:?}", std::any::type_name::<D>(), id);
                id
            }
        };

        self.detail_info_of(id)
            .expect("registered detail has a descriptor")
    }

    /// Get the descriptor of a registered detail class.
    #[inline]
    pub fn detail_info_of(&self, id: DetailId) -> Option<Arc<DetailInfo>> {
        let details = self.details.read().unwrap();
        details.get(id.index()).and_then(|info| info.clone())
    }

    /// The number of registered trait types.
    #[inline]
    pub fn trait_count(&self) -> usize {
        self.next_trait.load(Ordering::Relaxed) as usize
    }

    /// The number of registered detail classes.
    #[inline]
    pub fn detail_count(&self) -> usize {
        self.next_detail.load(Ordering::Relaxed) as usize
    }
}
