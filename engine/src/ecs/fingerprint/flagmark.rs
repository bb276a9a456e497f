//! Per-subject flag words.
//!
//! A [`Flagmark`] is a 32-bit set split into two levels:
//!
//! - **System** bits (`0..=4`) are owned by the runtime: [`Flag::Stale`], [`Flag::Booted`],
//!   [`Flag::Online`], [`Flag::Editor`] and [`Flag::DeferredDespawn`]. User facing setters refuse to
//!   change them.
//! - **User** bits `A..=Z` (`5..=30`) are free for application use, typically as cheap state tags
//!   that filters can select on without a structural change.
//!
//! The authoritative copy of a subject's flagmark lives in its chunk slot as an
//! [`AtomicFlagmark`], so flags can be read and written from workers of a concurrent iteration.

use std::{
    fmt,
    ops::{BitAnd, BitOr, Not},
    sync::atomic::{AtomicU32, Ordering},
};

/// A single flag bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Flag {
    /// The slot was released and awaits reclamation. Stale subjects are never iterated.
    Stale = 0,
    /// The subject has been booted.
    Booted = 1,
    /// The subject is networked.
    Online = 2,
    /// The subject belongs to an editor world.
    Editor = 3,
    /// A despawn has been queued for the subject.
    DeferredDespawn = 4,
    A = 5,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z = 30,
}

impl Flag {
    /// All flags in bit order.
    pub const ALL: [Flag; 31] = [
        Flag::Stale,
        Flag::Booted,
        Flag::Online,
        Flag::Editor,
        Flag::DeferredDespawn,
        Flag::A,
        Flag::B,
        Flag::C,
        Flag::D,
        Flag::E,
        Flag::F,
        Flag::G,
        Flag::H,
        Flag::I,
        Flag::J,
        Flag::K,
        Flag::L,
        Flag::M,
        Flag::N,
        Flag::O,
        Flag::P,
        Flag::Q,
        Flag::R,
        Flag::S,
        Flag::T,
        Flag::U,
        Flag::V,
        Flag::W,
        Flag::X,
        Flag::Y,
        Flag::Z,
    ];

    /// The bit position of this flag.
    #[inline]
    pub const fn index(self) -> u32 {
        self as u32
    }

    /// The flag at the given bit position, if any.
    pub fn from_index(index: u32) -> Option<Flag> {
        Self::ALL.get(index as usize).copied()
    }

    /// A flagmark with only this flag set.
    #[inline]
    pub const fn mask(self) -> Flagmark {
        Flagmark(1 << self.index())
    }

    #[inline]
    pub const fn is_system_level(self) -> bool {
        self.mask().0 & Flagmark::ALL_SYSTEM_LEVEL.0 != 0
    }
}

/// A 32-bit flag set.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flagmark(u32);

impl Flagmark {
    pub const NONE: Flagmark = Flagmark(0);

    /// The runtime owned bits.
    pub const ALL_SYSTEM_LEVEL: Flagmark = Flagmark(0b1_1111);

    /// The application owned bits `A..=Z`.
    pub const ALL_USER_LEVEL: Flagmark = Flagmark(((1 << 26) - 1) << 5);

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, flag: Flag) -> bool {
        self.0 & flag.mask().0 != 0
    }

    /// Every bit of `other` is set in this flagmark.
    #[inline]
    pub const fn contains_all(self, other: Flagmark) -> bool {
        self.0 & other.0 == other.0
    }

    /// At least one bit of `other` is set in this flagmark.
    #[inline]
    pub const fn intersects(self, other: Flagmark) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn with(self, flag: Flag) -> Self {
        Self(self.0 | flag.mask().0)
    }

    #[inline]
    pub const fn without(self, flag: Flag) -> Self {
        Self(self.0 & !flag.mask().0)
    }

    /// Set or clear a single flag.
    #[inline]
    pub fn set(&mut self, flag: Flag, state: bool) {
        *self = if state {
            self.with(flag)
        } else {
            self.without(flag)
        };
    }

    /// Replace the bits selected by `mask` with the matching bits of `bits`.
    #[inline]
    pub const fn masked(self, bits: Flagmark, mask: Flagmark) -> Self {
        Self((self.0 & !mask.0) | (bits.0 & mask.0))
    }

    /// Iterate the set flags in bit order.
    pub fn flags(self) -> impl Iterator<Item = Flag> {
        Flag::ALL.into_iter().filter(move |flag| self.contains(*flag))
    }
}

impl From<Flag> for Flagmark {
    #[inline]
    fn from(flag: Flag) -> Self {
        flag.mask()
    }
}

impl BitOr for Flagmark {
    type Output = Flagmark;

    #[inline]
    fn bitor(self, rhs: Flagmark) -> Flagmark {
        Flagmark(self.0 | rhs.0)
    }
}

impl BitOr<Flag> for Flagmark {
    type Output = Flagmark;

    #[inline]
    fn bitor(self, rhs: Flag) -> Flagmark {
        self.with(rhs)
    }
}

impl BitOr for Flag {
    type Output = Flagmark;

    #[inline]
    fn bitor(self, rhs: Flag) -> Flagmark {
        self.mask().with(rhs)
    }
}

impl BitAnd for Flagmark {
    type Output = Flagmark;

    #[inline]
    fn bitand(self, rhs: Flagmark) -> Flagmark {
        Flagmark(self.0 & rhs.0)
    }
}

impl Not for Flagmark {
    type Output = Flagmark;

    #[inline]
    fn not(self) -> Flagmark {
        Flagmark(!self.0)
    }
}

impl fmt::Debug for Flagmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.flags()).finish()
    }
}

/// A flagmark that can be updated concurrently. Every update is a single atomic read-modify-write.
#[derive(Default)]
pub struct AtomicFlagmark(AtomicU32);

impl AtomicFlagmark {
    #[inline]
    pub const fn new(flagmark: Flagmark) -> Self {
        Self(AtomicU32::new(flagmark.0))
    }

    #[inline]
    pub fn load(&self) -> Flagmark {
        Flagmark(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, flagmark: Flagmark) {
        self.0.store(flagmark.0, Ordering::Release);
    }

    /// Set or clear a flag, returning its previous state.
    #[inline]
    pub fn set(&self, flag: Flag, state: bool) -> bool {
        let bit = flag.mask().0;
        let previous = if state {
            self.0.fetch_or(bit, Ordering::AcqRel)
        } else {
            self.0.fetch_and(!bit, Ordering::AcqRel)
        };
        previous & bit != 0
    }

    /// Flip a flag, returning its new state.
    #[inline]
    pub fn toggle(&self, flag: Flag) -> bool {
        let bit = flag.mask().0;
        self.0.fetch_xor(bit, Ordering::AcqRel) & bit == 0
    }

    /// Replace the bits selected by `mask`, returning the previous flagmark.
    pub fn set_masked(&self, bits: Flagmark, mask: Flagmark) -> Flagmark {
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(Flagmark(current).masked(bits, mask).0)
            })
            .unwrap_or_else(|current| current);
        Flagmark(previous)
    }
}

impl fmt::Debug for AtomicFlagmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.load().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn levels_partition_the_word() {
        // Then
        assert!(Flag::Stale.is_system_level());
        assert!(Flag::DeferredDespawn.is_system_level());
        assert!(!Flag::A.is_system_level());
        assert!(!Flag::Z.is_system_level());
        assert_eq!(Flag::Z.index(), 30);
        assert_eq!(
            Flagmark::ALL_SYSTEM_LEVEL & Flagmark::ALL_USER_LEVEL,
            Flagmark::NONE
        );
        assert!(Flagmark::ALL_USER_LEVEL.contains(Flag::A));
        assert!(Flagmark::ALL_USER_LEVEL.contains(Flag::Z));
        assert_eq!(Flag::from_index(5), Some(Flag::A));
        assert_eq!(Flag::from_index(31), None);
    }

    #[test]
    fn masked_replaces_selected_bits_only() {
        // Given
        let flagmark = Flag::A | Flag::B;

        // When
        let result = flagmark.masked(Flag::C.into(), Flag::B | Flag::C);

        // Then
        assert_eq!(result, Flag::A | Flag::C);
    }

    #[test]
    fn atomic_set_reports_previous_state() {
        // Given
        let flagmark = AtomicFlagmark::default();

        // When / Then
        assert!(!flagmark.set(Flag::A, true));
        assert!(flagmark.set(Flag::A, true));
        assert!(flagmark.set(Flag::A, false));
        assert!(flagmark.toggle(Flag::B));
        assert!(!flagmark.toggle(Flag::B));
        assert_eq!(flagmark.load(), Flagmark::NONE);
    }

    #[test]
    fn atomic_updates_from_many_threads() {
        // Given
        let flagmark = Arc::new(AtomicFlagmark::default());

        // When
        let handles: Vec<_> = [Flag::A, Flag::B, Flag::C, Flag::D]
            .into_iter()
            .map(|flag| {
                let flagmark = Arc::clone(&flagmark);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        flagmark.set_masked(flag.mask(), flag.mask());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Then
        assert_eq!(flagmark.load(), Flag::A | Flag::B | Flag::C | Flag::D);
    }
}
