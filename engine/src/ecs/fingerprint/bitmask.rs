use std::{
    fmt,
    hash::{Hash, Hasher},
};

use fixedbitset::FixedBitSet;

/// A growable set of bit positions, used for trait and detail signatures.
///
/// Two masks are equal when they contain the same positions regardless of how far either has been
/// grown, so masks built in a different order (or from differently sized registries) compare and
/// hash identically.
#[derive(Clone, Default)]
pub struct Bitmask(FixedBitSet);

impl Bitmask {
    /// Construct an empty mask.
    #[inline]
    pub fn new() -> Self {
        Self(FixedBitSet::new())
    }

    /// Construct a mask with only the given position set.
    pub fn with(index: usize) -> Self {
        let mut mask = Self::new();
        mask.insert(index);
        mask
    }

    /// Set a position, growing the mask when required. Returns `true` when the bit was newly set.
    pub fn insert(&mut self, index: usize) -> bool {
        if index >= self.0.len() {
            self.0.grow(index + 1);
        }
        let was_set = self.0.contains(index);
        self.0.insert(index);
        !was_set
    }

    /// Clear a position. Returns `true` when the bit was previously set.
    pub fn remove(&mut self, index: usize) -> bool {
        if !self.0.contains(index) {
            return false;
        }
        self.0.set(index, false);
        true
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(index)
    }

    /// Add every position of `other` into this mask.
    pub fn union_with(&mut self, other: &Bitmask) {
        if other.0.len() > self.0.len() {
            self.0.grow(other.0.len());
        }
        self.0.union_with(&other.0);
    }

    /// Every position of `self` is also present in `other`.
    pub fn is_subset(&self, other: &Bitmask) -> bool {
        self.0.ones().all(|index| other.0.contains(index))
    }

    /// No position is shared between the two masks.
    pub fn is_disjoint(&self, other: &Bitmask) -> bool {
        self.0.ones().all(|index| !other.0.contains(index))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.ones().next().is_none()
    }

    /// The number of set positions.
    #[inline]
    pub fn count(&self) -> usize {
        self.0.count_ones(..)
    }

    /// Iterate the set positions in ascending order.
    #[inline]
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.ones()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl PartialEq for Bitmask {
    fn eq(&self, other: &Self) -> bool {
        self.0.ones().eq(other.0.ones())
    }
}

impl Eq for Bitmask {}

impl Hash for Bitmask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for index in self.0.ones() {
            index.hash(state);
        }
    }
}

impl fmt::Debug for Bitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.ones()).finish()
    }
}

impl FromIterator<usize> for Bitmask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut mask = Bitmask::new();
        for index in iter {
            mask.insert(index);
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn hash_of(mask: &Bitmask) -> u64 {
        let mut hasher = DefaultHasher::new();
        mask.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equality_ignores_grown_length() {
        // Given
        let mut small = Bitmask::with(3);
        let mut large = Bitmask::with(200);

        // When
        large.remove(200);
        large.insert(3);
        small.insert(3);

        // Then
        assert_eq!(small, large);
        assert_eq!(hash_of(&small), hash_of(&large));
    }

    #[test]
    fn subset_and_disjoint() {
        // Given
        let ab: Bitmask = [1, 2].into_iter().collect();
        let abc: Bitmask = [1, 2, 70].into_iter().collect();
        let d = Bitmask::with(9);

        // Then
        assert!(ab.is_subset(&abc));
        assert!(!abc.is_subset(&ab));
        assert!(Bitmask::new().is_subset(&ab));
        assert!(ab.is_disjoint(&d));
        assert!(!ab.is_disjoint(&abc));
    }

    #[test]
    fn insert_and_remove_report_changes() {
        // Given
        let mut mask = Bitmask::new();

        // When / Then
        assert!(mask.insert(5));
        assert!(!mask.insert(5));
        assert_eq!(mask.count(), 1);
        assert!(mask.remove(5));
        assert!(!mask.remove(5));
        assert!(mask.is_empty());
    }

    #[test]
    fn union_grows_to_fit() {
        // Given
        let mut mask = Bitmask::with(1);

        // When
        mask.union_with(&Bitmask::with(100));

        // Then
        assert_eq!(mask.ones().collect::<Vec<_>>(), vec![1, 100]);
    }
}
