//! Chunked trait storage.
//!
//! Subjects with the same traits and enabled details share a [`Chunk`]: one type-erased
//! [`Column`](column::Column) per trait, plus a slot column with the owning subject id and its
//! flagmark. [`Chunks`] owns every chunk of a mechanism and finds or creates the chunk for a given
//! signature. Chunks are never destroyed while their mechanism lives; an emptied chunk keeps its
//! slots for reuse.

mod chunk;
mod column;
mod mem;

pub use chunk::{Chunk, Slot};

use std::collections::HashMap;

use crate::ecs::{
    fingerprint::Bitmask,
    registry::{TraitId, TypeRegistry},
};

/// Index of a chunk within its mechanism.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId(u32);

impl ChunkId {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChunkKey {
    traits: Bitmask,
    details: Bitmask,
}

#[derive(Default)]
pub struct Chunks {
    chunks: Vec<Chunk>,
    index: HashMap<ChunkKey, ChunkId>,
}

impl Chunks {
    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[inline]
    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(id.index())
    }

    #[inline]
    pub fn get_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.chunks.get_mut(id.index())
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Chunk> {
        self.chunks.iter_mut()
    }

    /// The chunk holding exactly the given signature, if it exists.
    pub fn find(&self, traits: &Bitmask, details: &Bitmask) -> Option<ChunkId> {
        self.index
            .get(&ChunkKey {
                traits: traits.clone(),
                details: details.clone(),
            })
            .copied()
    }

    /// The chunk holding exactly the given signature, creating it when needed. Returns whether the
    /// chunk was created.
    pub fn obtain(
        &mut self,
        registry: &TypeRegistry,
        traits: &Bitmask,
        details: &Bitmask,
    ) -> (ChunkId, bool) {
        if let Some(id) = self.find(traits, details) {
            return (id, false);
        }
        let id = ChunkId::new(self.chunks.len() as u32);
        let infos = traits
            .ones()
            .filter_map(|index| registry.trait_info_of(TraitId::new(index as u16)))
            .collect();
        self.chunks.push(Chunk::new(id, details.clone(), infos));
        self.index.insert(
            ChunkKey {
                traits: traits.clone(),
                details: details.clone(),
            },
            id,
        );
        log::trace!("created chunk {:?} for traits {:?}, details {:?}", id, traits, details);
        (id, true)
    }

    /// Two distinct chunks, mutably.
    pub fn pair_mut(&mut self, first: ChunkId, second: ChunkId) -> (&mut Chunk, &mut Chunk) {
        assert_ne!(first, second, "a chunk cannot be paired with itself");
        if first.index() < second.index() {
            let (head, tail) = self.chunks.split_at_mut(second.index());
            (&mut head[first.index()], &mut tail[0])
        } else {
            let (head, tail) = self.chunks.split_at_mut(first.index());
            (&mut tail[0], &mut head[second.index()])
        }
    }

    /// The number of live subjects over every chunk.
    pub fn live_count(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }
}
