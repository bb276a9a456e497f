//! Bitmask signatures of subjects and the filters that select them.
//!
//! A [`Fingerprint`] describes a subject as three sets: the traits it carries, the (enabled) details
//! it carries with their base classes folded in, and its [`Flagmark`]. A [`Filter`] selects subjects
//! with include and exclude constraints on each of these sets. Matching is pure bitmask arithmetic
//! and never depends on the order in which traits or details were attached.

mod bitmask;
mod filter;
mod flagmark;

pub use bitmask::Bitmask;
pub use filter::Filter;
pub use flagmark::{AtomicFlagmark, Flag, Flagmark};

use crate::ecs::registry::{DetailId, DetailInfo, TraitId};

/// The signature of a subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    traits: Bitmask,
    details: Bitmask,
    flagmark: Flagmark,
}

impl Fingerprint {
    #[inline]
    pub fn new(traits: Bitmask, details: Bitmask, flagmark: Flagmark) -> Self {
        Self {
            traits,
            details,
            flagmark,
        }
    }

    #[inline]
    pub fn traits(&self) -> &Bitmask {
        &self.traits
    }

    #[inline]
    pub fn details(&self) -> &Bitmask {
        &self.details
    }

    #[inline]
    pub fn flagmark(&self) -> Flagmark {
        self.flagmark
    }

    #[inline]
    pub fn contains_trait(&self, id: TraitId) -> bool {
        self.traits.contains(id.index())
    }

    /// Whether a detail of the given class, or of a class derived from it, is part of the signature.
    #[inline]
    pub fn contains_detail(&self, id: DetailId) -> bool {
        self.details.contains(id.index())
    }

    #[inline]
    pub fn contains_flag(&self, flag: Flag) -> bool {
        self.flagmark.contains(flag)
    }

    /// Add a trait. Returns `true` when the signature changed.
    #[inline]
    pub fn add_trait(&mut self, id: TraitId) -> bool {
        self.traits.insert(id.index())
    }

    /// Remove a trait. Returns `true` when the signature changed.
    #[inline]
    pub fn remove_trait(&mut self, id: TraitId) -> bool {
        self.traits.remove(id.index())
    }

    /// Add a detail class together with all of its bases.
    pub fn add_detail(&mut self, info: &DetailInfo) -> bool {
        if info.inclusion().is_subset(&self.details) {
            return false;
        }
        self.details.union_with(info.inclusion());
        true
    }

    /// Rebuild the detail part from a set of detail classes.
    ///
    /// Detail masks cannot be subtracted one class at a time since bases are shared between
    /// classes, so removal always recomputes.
    pub fn rebuild_details<'a>(&mut self, infos: impl IntoIterator<Item = &'a DetailInfo>) {
        self.details.clear();
        for info in infos {
            self.details.union_with(info.inclusion());
        }
    }

    /// Replace the bits selected by `mask`, returning the previous flagmark.
    #[inline]
    pub fn set_flagmark_masked(&mut self, bits: Flagmark, mask: Flagmark) -> Flagmark {
        let previous = self.flagmark;
        self.flagmark = previous.masked(bits, mask);
        previous
    }

    #[inline]
    pub fn set_flagmark(&mut self, flagmark: Flagmark) -> Flagmark {
        std::mem::replace(&mut self.flagmark, flagmark)
    }

    #[inline]
    pub fn matches(&self, filter: &Filter) -> bool {
        filter.matches(self)
    }
}
