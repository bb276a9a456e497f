use crate::ecs::{
    Detail, TraitSet,
    fingerprint::{Bitmask, Fingerprint, Flag, Flagmark},
    registry::{TraitId, TypeRegistry},
};

/// Include and exclude constraints over traits, details and flags.
///
/// The default filter matches every subject that is not [`Flag::Stale`].
///
/// ```ignore
/// let filter = Filter::make::<(Located, BubbleSphere)>(&registry)
///     .without_flag(Flag::A);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    include_traits: Bitmask,
    exclude_traits: Bitmask,
    include_details: Bitmask,
    exclude_details: Bitmask,
    include_flags: Flagmark,
    exclude_flags: Flagmark,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            include_traits: Bitmask::new(),
            exclude_traits: Bitmask::new(),
            include_details: Bitmask::new(),
            exclude_details: Bitmask::new(),
            include_flags: Flagmark::NONE,
            exclude_flags: Flag::Stale.mask(),
        }
    }
}

impl Filter {
    /// A filter requiring every trait of the set `S`.
    pub fn make<S: TraitSet>(registry: &TypeRegistry) -> Self {
        let mut filter = Self::default();
        for id in S::trait_ids(registry) {
            filter.include_traits.insert(id.index());
        }
        filter
    }

    /// Require trait `T`.
    pub fn with<T: crate::ecs::Trait>(mut self, registry: &TypeRegistry) -> Self {
        self.include_traits
            .union_with(&registry.trait_info::<T>().inclusion());
        self
    }

    /// Reject subjects carrying trait `T`.
    pub fn without<T: crate::ecs::Trait>(mut self, registry: &TypeRegistry) -> Self {
        self.exclude_traits
            .union_with(&registry.trait_info::<T>().exclusion());
        self
    }

    pub fn with_trait_id(mut self, id: TraitId) -> Self {
        self.include_traits.insert(id.index());
        self
    }

    pub fn without_trait_id(mut self, id: TraitId) -> Self {
        self.exclude_traits.insert(id.index());
        self
    }

    /// Require an enabled detail of class `D` or of any class derived from it.
    pub fn with_detail<D: Detail>(mut self, registry: &TypeRegistry) -> Self {
        let info = registry.detail_info::<D>();
        self.include_details.union_with(info.exclusion());
        self
    }

    /// Reject subjects with an enabled detail of class `D` or of any class derived from it.
    pub fn without_detail<D: Detail>(mut self, registry: &TypeRegistry) -> Self {
        let info = registry.detail_info::<D>();
        self.exclude_details.union_with(info.exclusion());
        self
    }

    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.include_flags = self.include_flags.with(flag);
        self.exclude_flags = self.exclude_flags.without(flag);
        self
    }

    pub fn without_flag(mut self, flag: Flag) -> Self {
        self.exclude_flags = self.exclude_flags.with(flag);
        self.include_flags = self.include_flags.without(flag);
        self
    }

    /// Replace both flag constraints.
    pub fn with_flagmarks(mut self, include: Flagmark, exclude: Flagmark) -> Self {
        self.include_flags = include;
        self.exclude_flags = exclude;
        self
    }

    #[inline]
    pub fn include_traits(&self) -> &Bitmask {
        &self.include_traits
    }

    #[inline]
    pub fn exclude_traits(&self) -> &Bitmask {
        &self.exclude_traits
    }

    #[inline]
    pub fn include_flags(&self) -> Flagmark {
        self.include_flags
    }

    #[inline]
    pub fn exclude_flags(&self) -> Flagmark {
        self.exclude_flags
    }

    /// Match a full fingerprint. The six constraints are checked in order and the first failing
    /// one short-circuits.
    pub fn matches(&self, fingerprint: &Fingerprint) -> bool {
        self.matches_signature(fingerprint.traits(), fingerprint.details())
            && self.matches_flagmark(fingerprint.flagmark())
    }

    /// Match only the trait and detail constraints. This is what chunks are selected by.
    #[inline]
    pub fn matches_signature(&self, traits: &Bitmask, details: &Bitmask) -> bool {
        self.include_traits.is_subset(traits)
            && self.exclude_traits.is_disjoint(traits)
            && self.include_details.is_subset(details)
            && self.exclude_details.is_disjoint(details)
    }

    /// Match only the flag constraints. This is what individual slots are selected by.
    #[inline]
    pub fn matches_flagmark(&self, flagmark: Flagmark) -> bool {
        flagmark.contains_all(self.include_flags) && !flagmark.intersects(self.exclude_flags)
    }
}
