//! Per-thread query scratch and the blocking scratch pool.
//!
//! Every search leases one [`QueryScratch`] for its whole run: aligned I/O
//! slab, query copies, PQ lookup buffers, visited set, best-list, and the
//! per-query statistics. The pool is a bounded channel holding
//! `max_threads` scratches; acquisition blocks when all are leased and the
//! lease returns its scratch (reset) on drop, including on error paths.

use crossbeam_channel::{bounded, Receiver, Sender};
use rustc_hash::FxHashSet;

use crate::distance::Element;
use crate::error::Result;
use crate::index::candidates::CandidateList;
use crate::pq::NUM_PQ_CENTROIDS;
use crate::stats::QueryStats;
use crate::storage::aligned::{AlignedBuf, BlockReader, SECTOR_LEN};

/// Upper bound on sectors fetched per batch; bounds the aligned slab size.
pub const MAX_FRONTIER_SECTORS: usize = 128;

/// Initial visited-set capacity per scratch.
pub const VISITED_RESERVE: usize = 4096;

/// Geometry needed to size a scratch's buffers.
#[derive(Debug, Clone, Copy)]
pub struct ScratchShape {
    /// SIMD-friendly element stride for in-memory vectors.
    pub aligned_dim: usize,
    /// True vector dimensionality.
    pub data_dim: usize,
    /// PQ chunks per code vector.
    pub n_chunks: usize,
    /// Disk-PQ chunks, zero when disk vectors are full precision.
    pub disk_pq_n_chunks: usize,
    /// Maximum graph out-degree.
    pub max_degree: usize,
}

/// Reusable per-query state.
pub struct QueryScratch<E: Element> {
    /// 4096-aligned slab for sector batches.
    pub sector_buf: AlignedBuf,
    /// Query in the index element type, `aligned_dim` long, zero padded.
    pub query: Vec<E>,
    /// Query widened to f32 for PQ table construction.
    pub query_f32: Vec<f32>,
    /// Per-query PQ lookup table, `n_chunks * 256`.
    pub lut: Vec<f32>,
    /// Lookup table for the disk-PQ table, empty unless disk-PQ mode.
    pub disk_lut: Vec<f32>,
    /// Contiguous candidate code slab for batched PQ scoring.
    pub code_slab: Vec<u8>,
    /// Output distances matching `code_slab`.
    pub dist_scratch: Vec<f32>,
    /// Zero-padded copy target for one full-precision vector.
    pub fp_vec: Vec<E>,
    /// Point-id membership for this query.
    pub visited: FxHashSet<u32>,
    /// The bounded best-list.
    pub best: CandidateList,
    /// Frontier ids awaiting a storage fetch this round.
    pub frontier: Vec<u32>,
    /// Frontier ids served by the node cache this round.
    pub frontier_cached: Vec<u32>,
    /// Per-frontier embedding rows for the tensor backend.
    pub tensor_embeddings: Vec<E>,
    /// Per-frontier neighbor counts for the tensor backend.
    pub tensor_degrees: Vec<u32>,
    /// Per-frontier neighbor rows for the tensor backend.
    pub tensor_nbrhoods: Vec<u32>,
    /// Per-thread storage handle for the flat backend.
    pub io_handle: Option<Box<dyn BlockReader>>,
    /// Statistics for the current query.
    pub stats: QueryStats,
    shape: ScratchShape,
}

impl<E: Element> QueryScratch<E> {
    /// Allocates a scratch for the given geometry.
    ///
    /// `io_handle` is this worker's storage handle, registered here and
    /// dropped with the scratch at pool teardown.
    #[must_use]
    pub fn new(shape: ScratchShape, io_handle: Option<Box<dyn BlockReader>>) -> Self {
        let lut_len = shape.n_chunks * NUM_PQ_CENTROIDS;
        let disk_lut_len = shape.disk_pq_n_chunks * NUM_PQ_CENTROIDS;
        Self {
            sector_buf: AlignedBuf::zeroed(MAX_FRONTIER_SECTORS * SECTOR_LEN),
            query: vec![E::default(); shape.aligned_dim],
            query_f32: vec![0.0; shape.aligned_dim],
            lut: vec![0.0; lut_len],
            disk_lut: vec![0.0; disk_lut_len],
            code_slab: Vec::with_capacity(shape.max_degree * shape.n_chunks),
            dist_scratch: Vec::with_capacity(shape.max_degree),
            fp_vec: vec![E::default(); shape.aligned_dim],
            visited: FxHashSet::with_capacity_and_hasher(VISITED_RESERVE, Default::default()),
            best: CandidateList::new(0),
            frontier: Vec::with_capacity(MAX_FRONTIER_SECTORS),
            frontier_cached: Vec::with_capacity(MAX_FRONTIER_SECTORS),
            tensor_embeddings: vec![E::default(); MAX_FRONTIER_SECTORS * shape.data_dim],
            tensor_degrees: vec![0; MAX_FRONTIER_SECTORS],
            tensor_nbrhoods: vec![0; MAX_FRONTIER_SECTORS * shape.max_degree],
            io_handle,
            stats: QueryStats::default(),
            shape,
        }
    }

    /// Buffer geometry this scratch was sized for.
    #[must_use]
    pub fn shape(&self) -> ScratchShape {
        self.shape
    }

    /// Clears per-query state; buffer allocations are retained.
    pub fn reset(&mut self) {
        self.visited.clear();
        self.best.reset(0);
        self.frontier.clear();
        self.frontier_cached.clear();
        self.code_slab.clear();
        self.dist_scratch.clear();
        self.stats.reset();
    }
}

/// Blocking pool of query scratches.
///
/// A bounded multi-producer/multi-consumer channel pre-filled with
/// `max_threads` scratches.
pub struct ScratchPool<E: Element> {
    tx: Sender<QueryScratch<E>>,
    rx: Receiver<QueryScratch<E>>,
}

impl<E: Element> ScratchPool<E> {
    /// Builds a pool of `max_threads` scratches.
    ///
    /// # Errors
    ///
    /// Propagates failures from `make` (typically storage handle cloning).
    pub fn new(
        max_threads: usize,
        mut make: impl FnMut() -> Result<QueryScratch<E>>,
    ) -> Result<Self> {
        let (tx, rx) = bounded(max_threads);
        for _ in 0..max_threads {
            tx.send(make()?).expect("pool channel has capacity");
        }
        Ok(Self { tx, rx })
    }

    /// Leases a scratch, blocking until one is available.
    #[must_use]
    pub fn lease(&self) -> ScratchLease<'_, E> {
        let scratch = self.rx.recv().expect("scratch pool channel closed");
        ScratchLease {
            scratch: Some(scratch),
            pool: self,
        }
    }
}

/// RAII lease over one scratch; returns it to the pool, reset, on drop.
pub struct ScratchLease<'p, E: Element> {
    scratch: Option<QueryScratch<E>>,
    pool: &'p ScratchPool<E>,
}

impl<E: Element> std::ops::Deref for ScratchLease<'_, E> {
    type Target = QueryScratch<E>;

    fn deref(&self) -> &Self::Target {
        self.scratch.as_ref().expect("lease holds a scratch")
    }
}

impl<E: Element> std::ops::DerefMut for ScratchLease<'_, E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.scratch.as_mut().expect("lease holds a scratch")
    }
}

impl<E: Element> Drop for ScratchLease<'_, E> {
    fn drop(&mut self) {
        if let Some(mut scratch) = self.scratch.take() {
            scratch.reset();
            // receiver side lives as long as the pool; ignore shutdown races
            let _ = self.pool.tx.send(scratch);
        }
    }
}
