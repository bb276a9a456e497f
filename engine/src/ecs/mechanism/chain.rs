//! Filtered enumeration of subjects, serial and concurrent.
//!
//! A [`Chain`] is the list of chunks matching a filter at the time it was made. Iterating a chain
//! walks the slots of those chunks and hands every live slot whose flagmark passes the filter to
//! the operate-function, together with the traits requested by a [`Query`].
//!
//! Chunks are solid for the duration of any iteration, so the operate-function may only change
//! the structure of subjects through the deferred operations of [`Subject`].

use std::sync::Arc;

use log::trace;

use super::{Mechanism, Query, QuerySpec, Subject};
use crate::{
    core::tasks::Executor,
    ecs::{
        fingerprint::Filter,
        status::{Error, Outcome, Status},
        storage::{Chunk, ChunkId},
        subject::Handle,
    },
};

/// The chunks matching a filter.
#[derive(Debug, Clone)]
pub struct Chain {
    filter: Filter,
    chunks: Arc<[ChunkId]>,
    /// Number of chunks in the mechanism when the chain was made.
    chunk_count: usize,
}

impl Chain {
    #[inline]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    #[inline]
    pub fn chunks(&self) -> &[ChunkId] {
        &self.chunks
    }
}

/// A chain that may be operated on concurrently.
#[derive(Debug, Clone)]
pub struct SolidChain(Chain);

impl SolidChain {
    #[inline]
    pub fn filter(&self) -> &Filter {
        self.0.filter()
    }

    #[inline]
    pub fn chunks(&self) -> &[ChunkId] {
        self.0.chunks()
    }
}

/// Keeps chunks solid while alive.
struct SolidGuard<'m> {
    chunks: Vec<&'m Chunk>,
}

impl<'m> SolidGuard<'m> {
    fn new(chunks: Vec<&'m Chunk>) -> Self {
        for chunk in &chunks {
            chunk.solidify();
        }
        Self { chunks }
    }
}

impl Drop for SolidGuard<'_> {
    fn drop(&mut self) {
        for chunk in &self.chunks {
            chunk.liquefy();
        }
    }
}

/// A chunk resolved for a query.
struct Prepared<'m, Q: Query> {
    chunk: &'m Chunk,
    state: Q::State,
}

impl<Q: Query> Clone for Prepared<'_, Q> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Q: Query> Copy for Prepared<'_, Q> {}

impl Mechanism {
    /// The chunks currently matching `filter`. Memoized until a chunk is created.
    pub fn enchain(&self, filter: Filter) -> Chain {
        let chunks = self.matching_chunks(&filter);
        Chain {
            filter,
            chunks,
            chunk_count: self.chunks.len(),
        }
    }

    pub fn enchain_solid(&self, filter: Filter) -> SolidChain {
        SolidChain(self.enchain(filter))
    }

    fn matching_chunks(&self, filter: &Filter) -> Arc<[ChunkId]> {
        if let Some(chunks) = self.chains.read().unwrap().get(filter) {
            return chunks.clone();
        }
        let chunks: Arc<[ChunkId]> = self
            .chunks
            .iter()
            .filter(|chunk| filter.matches_signature(chunk.traits(), chunk.details()))
            .map(Chunk::id)
            .collect();
        self.chains
            .write()
            .unwrap()
            .insert(filter.clone(), chunks.clone());
        chunks
    }

    pub(super) fn invalidate_chains(&mut self) {
        self.chains.get_mut().unwrap().clear();
    }

    /// Resolve a chain against the current chunks, skipping those that cannot serve the query.
    fn prepare<Q: Query>(&self, chain: &Chain) -> Outcome<Vec<Prepared<'_, Q>>> {
        if !QuerySpec::of::<Q>(&self.registry).is_valid() {
            return Err(Error::InvalidArgument);
        }
        let chunks = if chain.chunk_count == self.chunks.len() {
            chain.chunks.clone()
        } else {
            self.matching_chunks(&chain.filter)
        };
        Ok(chunks
            .iter()
            .filter_map(|id| {
                let chunk = self.chunks.get(*id)?;
                let state = Q::prepare(chunk, &self.registry)?;
                Some(Prepared { chunk, state })
            })
            .collect())
    }

    /// Run `op` on up to `count` matching subjects, starting from the `begin`th.
    ///
    /// Returns [`Status::Noop`] when `op` was never called.
    pub fn iterate<'m, Q: Query>(
        &'m mut self,
        chain: &Chain,
        begin: usize,
        count: usize,
        mut op: impl FnMut(Subject<'m>, Q::Item<'m>),
    ) -> Outcome {
        let this: &'m Mechanism = self;
        let prepared = this.prepare::<Q>(chain)?;
        let _guard = SolidGuard::new(prepared.iter().map(|p| p.chunk).collect());
        let filter = &chain.filter;
        let mut index = 0;
        let mut visited = 0;
        'chunks: for prepared in &prepared {
            let Prepared { chunk, state } = *prepared;
            for (row, slot) in chunk.slots().iter().enumerate() {
                if visited == count {
                    break 'chunks;
                }
                let flagmark = slot.flagmark().load();
                if !slot.is_live() || !filter.matches_flagmark(flagmark) {
                    continue;
                }
                index += 1;
                if index <= begin {
                    continue;
                }
                let Some(info) = this.subjects.find(slot.subject()) else {
                    continue;
                };
                let subject = Subject::new(this, Handle::new(info.id(), info.generation()), slot);
                // SAFETY: `&mut self` excludes other iterations and every row is visited once.
                op(subject, unsafe { Q::fetch(chunk, &state, row) });
                visited += 1;
            }
        }
        Ok(Status::from_changed(visited > 0))
    }

    /// Run `op` on every matching subject.
    pub fn operate<'m, Q: Query>(
        &'m mut self,
        chain: &Chain,
        op: impl FnMut(Subject<'m>, Q::Item<'m>),
    ) -> Outcome {
        self.iterate::<Q>(chain, 0, usize::MAX, op)
    }

    /// Run `op` on every matching subject, spreading the chain's slots over `thread_count`
    /// workers. Returns once every worker finished.
    ///
    /// Workers are given disjoint slot ranges, so mutable trait references never alias. Order
    /// across workers is unspecified.
    pub fn operate_concurrently<'m, Q: Query>(
        &'m mut self,
        chain: &SolidChain,
        op: impl Fn(Subject<'m>, Q::Item<'m>) + Sync,
        thread_count: usize,
    ) -> Outcome {
        let this: &'m Mechanism = self;
        let prepared = this.prepare::<Q>(&chain.0)?;
        let _guard = SolidGuard::new(prepared.iter().map(|p| p.chunk).collect());
        let total: usize = prepared.iter().map(|p| p.chunk.slot_count()).sum();
        if total == 0 {
            return Ok(Status::Noop);
        }
        let workers = thread_count.clamp(1, total);
        trace!(
            "operating on {} slots of mechanism {} with {} workers",
            total,
            this.id.index(),
            workers
        );
        let filter = &chain.0.filter;
        let prepared = &prepared;
        let op = &op;
        if workers == 1 {
            return Ok(Status::from_changed(
                this.operate_range::<Q>(prepared, filter, 0, total, op) > 0,
            ));
        }
        let visited = std::sync::atomic::AtomicUsize::new(0);
        Executor::global().scope(|scope| {
            for worker in 0..workers {
                let begin = worker * total / workers;
                let end = (worker + 1) * total / workers;
                let visited = &visited;
                scope.spawn(move || {
                    let count = this.operate_range::<Q>(prepared, filter, begin, end, op);
                    visited.fetch_add(count, std::sync::atomic::Ordering::Relaxed);
                });
            }
        });
        Ok(Status::from_changed(
            visited.load(std::sync::atomic::Ordering::Relaxed) > 0,
        ))
    }

    /// Visit the global slot range `[begin, end)` of a prepared chain. Returns the visit count.
    fn operate_range<'m, Q: Query>(
        &'m self,
        prepared: &[Prepared<'m, Q>],
        filter: &Filter,
        begin: usize,
        end: usize,
        op: &(impl Fn(Subject<'m>, Q::Item<'m>) + Sync),
    ) -> usize {
        let mut offset = 0;
        let mut visited = 0;
        for prepared in prepared {
            let Prepared { chunk, state } = *prepared;
            let len = chunk.slot_count();
            let from = begin.max(offset);
            let to = end.min(offset + len);
            if from < to {
                for row in (from - offset)..(to - offset) {
                    let slot = &chunk.slots()[row];
                    if !slot.is_live() || !filter.matches_flagmark(slot.flagmark().load()) {
                        continue;
                    }
                    let Some(info) = self.subjects.find(slot.subject()) else {
                        continue;
                    };
                    let subject =
                        Subject::new(self, Handle::new(info.id(), info.generation()), slot);
                    // SAFETY: Slot ranges of workers are disjoint and the chunks are solid.
                    op(subject, unsafe { Q::fetch(chunk, &state, row) });
                    visited += 1;
                }
            }
            offset += len;
            if offset >= end {
                break;
            }
        }
        visited
    }
}
