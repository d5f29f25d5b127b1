//! The disk index: loader, storage backends, and the search API.
//!
//! [`FlashIndex`] owns everything that outlives a query: parsed geometry,
//! the PQ tables and code data, medoids and centroid data, the warm node
//! cache, the storage backend, and the scratch pool. Queries lease a
//! scratch, traverse the graph (see [`search`]), and return owned result
//! vectors.

pub mod cache;
pub mod candidates;
pub mod layout;
mod range;
mod search;

#[cfg(test)]
mod cache_tests;
#[cfg(test)]
mod layout_tests;

pub use layout::IndexLayout;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use memmap2::Mmap;
use tracing::info;

use crate::distance::{Distance, Element, Metric};
use crate::error::{Error, Result};
use crate::pq::FixedChunkPqTable;
use crate::scratch::{QueryScratch, ScratchPool, ScratchShape, MAX_FRONTIER_SECTORS};
use crate::stats::QueryStats;
use crate::storage::aligned::{AlignedBuf, AlignedRead, BlockReader, FileBlockReader, SECTOR_LEN};
use crate::storage::bin;
use crate::storage::slice::{PointSliceRead, TensorSliceReader};
use cache::NodeCache;

/// Re-scored entries per requested result during the reorder pass.
pub(crate) const FULL_PRECISION_REORDER_MULTIPLIER: usize = 3;

/// Result of one search or range-search call.
#[derive(Debug, Clone)]
pub struct SearchOutput {
    /// Point ids, ascending by distance.
    pub ids: Vec<u32>,
    /// Distances matching `ids`.
    pub distances: Vec<f32>,
    /// Statistics for this query.
    pub stats: QueryStats,
}

/// Parameters for opening a disk index.
#[derive(Debug, Clone)]
pub struct OpenParams {
    /// Path prefix of the index (`<prefix>_disk.index` and siblings).
    pub index_prefix: PathBuf,
    /// Distance metric the index was built for.
    pub metric: Metric,
    /// Scratch pool size; the maximum number of concurrent queries.
    pub num_threads: usize,
    /// Prefix of the tensor arrays; selects the tensor backend when set.
    pub tensors_prefix: Option<PathBuf>,
    /// Submit tensor read groups concurrently instead of one at a time.
    pub use_tensors_async: bool,
    /// HTTP base address for remotely served tensors.
    pub remote_addr: Option<String>,
    /// Read PQ codes onto the heap instead of memory-mapping them.
    pub pq_codes_in_memory: bool,
    /// Transient-retry bound per storage request.
    pub max_io_retries: u32,
    /// Advisory byte ceiling for the tensor chunk caches.
    pub tensor_cache_bytes: usize,
}

impl OpenParams {
    /// Parameters with defaults for a local flat index.
    #[must_use]
    pub fn new(index_prefix: impl Into<PathBuf>, metric: Metric, num_threads: usize) -> Self {
        Self {
            index_prefix: index_prefix.into(),
            metric,
            num_threads,
            tensors_prefix: None,
            use_tensors_async: false,
            remote_addr: None,
            pq_codes_in_memory: true,
            max_io_retries: 3,
            tensor_cache_bytes: 1 << 30,
        }
    }
}

/// PQ code data, heap-owned or memory-mapped.
enum PqCodes {
    Owned(Vec<u8>),
    Mapped { map: Mmap, data_offset: usize },
}

impl PqCodes {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(data) => data,
            Self::Mapped { map, data_offset } => &map[*data_offset..],
        }
    }
}

/// Storage backend serving node records.
pub(crate) enum Backend<E: Element> {
    /// Sector-aligned reads from the flat index file.
    Flat { reader: Box<dyn BlockReader> },
    /// Row-slice reads from the three tensor arrays.
    Tensors {
        reader: TensorSliceReader<E>,
        async_mode: bool,
    },
}

/// A disk-resident Vamana index opened for searching.
pub struct FlashIndex<E: Element> {
    pub(crate) layout: IndexLayout,
    pub(crate) metric: Metric,
    pub(crate) dist: Distance<E>,
    pub(crate) dist_f32: Distance<f32>,
    pub(crate) aligned_dim: usize,
    pub(crate) pq_table: FixedChunkPqTable,
    pub(crate) disk_pq_table: Option<FixedChunkPqTable>,
    pq_codes: PqCodes,
    pub(crate) n_chunks: usize,
    pub(crate) medoids: Vec<u32>,
    /// One row of `aligned_dim` f32 per medoid; empty for a single medoid
    /// with no centroid file.
    pub(crate) centroid_data: Vec<f32>,
    pub(crate) max_base_norm: Option<f32>,
    pub(crate) backend: Backend<E>,
    pub(crate) node_cache: OnceLock<NodeCache<E>>,
    pub(crate) scratch_pool: ScratchPool<E>,
}

impl<E: Element> std::fmt::Debug for FlashIndex<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashIndex")
            .field("metric", &self.metric)
            .field("aligned_dim", &self.aligned_dim)
            .field("n_chunks", &self.n_chunks)
            .finish_non_exhaustive()
    }
}

fn sibling(prefix: &Path, suffix: &str) -> PathBuf {
    let base = prefix
        .file_name()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    prefix.with_file_name(format!("{base}{suffix}"))
}

/// Degree stored in a node record.
pub(crate) fn record_degree(record: &[u8], vector_bytes: usize) -> u32 {
    u32::from_le_bytes(record[vector_bytes..vector_bytes + 4].try_into().unwrap())
}

impl<E: Element> FlashIndex<E> {
    /// Opens a disk index with the default file-backed block reader.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Load`] for missing or malformed index artifacts and
    /// [`Error::Usage`] for an unsupported metric/element combination.
    pub fn open(params: &OpenParams) -> Result<Self> {
        let index_file = sibling(&params.index_prefix, "_disk.index");
        let reader = FileBlockReader::open(&index_file, params.max_io_retries)
            .map_err(|e| Error::Load(format!("disk index {}: {e}", index_file.display())))?;
        Self::open_with_reader(params, Box::new(reader))
    }

    /// Opens a disk index over a caller-supplied block reader.
    ///
    /// The reader serves the flat index file regardless of backend choice;
    /// tests use this seam to inject storage faults.
    ///
    /// # Errors
    ///
    /// As [`open`](Self::open).
    pub fn open_with_reader(params: &OpenParams, reader: Box<dyn BlockReader>) -> Result<Self> {
        if params.metric == Metric::InnerProduct && !E::IS_FLOAT {
            return Err(Error::Usage(
                "inner-product search supports only f32 indexes".into(),
            ));
        }
        if params.num_threads == 0 {
            return Err(Error::Usage("num_threads must be >= 1".into()));
        }

        let index_file = sibling(&params.index_prefix, "_disk.index");
        let actual_size = std::fs::metadata(&index_file)
            .map_err(|e| Error::Load(format!("disk index {}: {e}", index_file.display())))?
            .len();

        // disk-PQ mode is signalled by the presence of its pivots sibling
        let disk_pq_path = sibling(&params.index_prefix, "_disk_pq_pivots.bin");
        let disk_pq_table = if disk_pq_path.exists() {
            Some(FixedChunkPqTable::load(&disk_pq_path)?)
        } else {
            None
        };
        let disk_pq_n_chunks = disk_pq_table.as_ref().map(|t| t.n_chunks() as u64);

        let mut header_buf = AlignedBuf::zeroed(SECTOR_LEN);
        let mut reqs = vec![AlignedRead::new(0, header_buf.as_mut_slice())?];
        reader.read_batch(&mut reqs)?;
        drop(reqs);
        let layout = IndexLayout::parse(
            header_buf.as_slice(),
            actual_size,
            std::mem::size_of::<E>(),
            disk_pq_n_chunks,
        )?;
        let aligned_dim = (layout.data_dim as usize).next_multiple_of(8);

        let pq_table = FixedChunkPqTable::load(&sibling(&params.index_prefix, "_pq_pivots.bin"))?;
        if pq_table.dim() as u64 != layout.data_dim {
            return Err(Error::Load(format!(
                "pq table dim {} != index dim {}",
                pq_table.dim(),
                layout.data_dim
            )));
        }
        let n_chunks = pq_table.n_chunks();

        let pq_codes = load_pq_codes(
            &sibling(&params.index_prefix, "_pq_compressed.bin"),
            layout.num_points,
            n_chunks,
            params.pq_codes_in_memory,
        )?;

        let medoids = load_medoids(&params.index_prefix, &layout)?;

        let max_base_norm = load_max_base_norm(&params.index_prefix)?;

        let backend = match &params.tensors_prefix {
            Some(tensors_prefix) => {
                if disk_pq_table.is_some() {
                    return Err(Error::Load(
                        "disk-PQ indexes are not servable from tensors".into(),
                    ));
                }
                if layout.reorder_start_sector.is_some() {
                    return Err(Error::Load(
                        "indexes with reorder data are not servable from tensors".into(),
                    ));
                }
                Backend::Tensors {
                    reader: TensorSliceReader::open(
                        tensors_prefix,
                        layout.num_points,
                        layout.data_dim,
                        layout.max_degree,
                        params.remote_addr.as_deref(),
                        params.tensor_cache_bytes,
                    )?,
                    async_mode: params.use_tensors_async,
                }
            }
            None => Backend::Flat { reader },
        };

        let shape = ScratchShape {
            aligned_dim,
            data_dim: layout.data_dim as usize,
            n_chunks,
            disk_pq_n_chunks: disk_pq_n_chunks.unwrap_or(0) as usize,
            max_degree: layout.max_degree as usize,
        };
        let scratch_pool = ScratchPool::new(params.num_threads, || {
            let io_handle = match &backend {
                Backend::Flat { reader } => Some(reader.clone_handle()?),
                Backend::Tensors { .. } => None,
            };
            Ok(QueryScratch::new(shape, io_handle))
        })?;

        let mut index = Self {
            layout,
            metric: params.metric,
            dist: Distance::new(params.metric),
            dist_f32: Distance::new(params.metric),
            aligned_dim,
            pq_table,
            disk_pq_table,
            pq_codes,
            n_chunks,
            medoids,
            centroid_data: Vec::new(),
            max_base_norm,
            backend,
            node_cache: OnceLock::new(),
            scratch_pool,
        };
        index.load_centroid_data(&params.index_prefix)?;

        info!(
            num_points = index.layout.num_points,
            data_dim = index.layout.data_dim,
            aligned_dim = index.aligned_dim,
            n_chunks = index.n_chunks,
            num_medoids = index.medoids.len(),
            max_degree = index.layout.max_degree,
            disk_pq = index.disk_pq_table.is_some(),
            reorder = index.layout.reorder_start_sector.is_some(),
            "opened disk index {}",
            params.index_prefix.display()
        );
        Ok(index)
    }

    /// Loads centroid rows for medoid selection.
    ///
    /// Prefers the `_centroid.bin` sibling; with several medoids and no
    /// centroid file, the medoids' own disk vectors stand in.
    fn load_centroid_data(&mut self, prefix: &Path) -> Result<()> {
        let centroid_path = sibling(prefix, "_centroid.bin");
        if centroid_path.exists() {
            let (data, rows, cols) = bin::load_bin::<f32>(&centroid_path)?;
            if rows != self.medoids.len() || cols as u64 != self.layout.data_dim {
                return Err(Error::Load(format!(
                    "centroid data is ({rows}, {cols}), expected ({}, {})",
                    self.medoids.len(),
                    self.layout.data_dim
                )));
            }
            self.centroid_data = pad_rows(&data, cols, self.aligned_dim);
            return Ok(());
        }
        if self.medoids.len() <= 1 {
            return Ok(());
        }
        // several entry points but no centroid file: use the medoid
        // vectors themselves
        let medoids = self.medoids.clone();
        let mut rows = vec![0.0f32; medoids.len() * self.aligned_dim];
        let mut vector: Vec<E> = vec![E::default(); self.layout.data_dim as usize];
        let mut lease = self.scratch_pool.lease();
        for (chunk_at, chunk) in medoids.chunks(MAX_FRONTIER_SECTORS).enumerate() {
            let scratch = &mut *lease;
            self.fetch_frontier(
                chunk,
                scratch.io_handle.as_deref(),
                &mut scratch.sector_buf,
                &mut scratch.tensor_embeddings,
                &mut scratch.tensor_degrees,
                &mut scratch.tensor_nbrhoods,
                &mut scratch.stats,
                false,
            )?;
            for (i, _) in chunk.iter().enumerate() {
                let node = self.fetched_node(FetchBuffers::of(scratch), chunk, i);
                let row_at = (chunk_at * MAX_FRONTIER_SECTORS + i) * self.aligned_dim;
                let row = &mut rows[row_at..row_at + self.aligned_dim];
                if let Some(table) = self.disk_pq_table.as_ref() {
                    table.inflate(node.payload, row);
                } else {
                    bytemuck::cast_slice_mut::<E, u8>(&mut vector)
                        .copy_from_slice(node.payload);
                    for (dst, src) in row.iter_mut().zip(vector.iter()) {
                        *dst = src.to_f32();
                    }
                }
            }
        }
        drop(lease);
        self.centroid_data = rows;
        Ok(())
    }

    /// Number of points in the index.
    #[must_use]
    pub fn num_points(&self) -> u64 {
        self.layout.num_points
    }

    /// True vector dimensionality.
    #[must_use]
    pub fn data_dim(&self) -> u64 {
        self.layout.data_dim
    }

    /// SIMD-friendly in-memory element stride.
    #[must_use]
    pub fn aligned_dim(&self) -> usize {
        self.aligned_dim
    }

    /// Bytes of vector payload per on-disk record.
    #[must_use]
    pub fn disk_data_dim(&self) -> u64 {
        self.layout.disk_bytes_per_point
    }

    /// PQ chunks per code vector.
    #[must_use]
    pub fn n_chunks(&self) -> usize {
        self.n_chunks
    }

    /// Number of entry points.
    #[must_use]
    pub fn num_medoids(&self) -> usize {
        self.medoids.len()
    }

    /// Parsed index geometry.
    #[must_use]
    pub fn index_layout(&self) -> &IndexLayout {
        &self.layout
    }

    /// PQ codes for all points.
    pub(crate) fn pq_data(&self) -> &[u8] {
        self.pq_codes.as_slice()
    }

    /// Selects cache candidates by BFS from the medoids.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn bfs_cache(&self, num_nodes: usize) -> Result<Vec<u32>> {
        let mut lease = self.scratch_pool.lease();
        let medoids = self.medoids.clone();
        cache::bfs_levels(&medoids, self.layout.num_points, num_nodes, |level| {
            let mut adjacency = Vec::with_capacity(level.len());
            for chunk in level.chunks(MAX_FRONTIER_SECTORS) {
                let scratch = &mut *lease;
                self.fetch_frontier(
                    chunk,
                    scratch.io_handle.as_deref(),
                    &mut scratch.sector_buf,
                    &mut scratch.tensor_embeddings,
                    &mut scratch.tensor_degrees,
                    &mut scratch.tensor_nbrhoods,
                    &mut scratch.stats,
                    true,
                )?;
                for i in 0..chunk.len() {
                    let node = self.fetched_node(FetchBuffers::of(&lease), chunk, i);
                    adjacency.push(node.neighbors_vec()?);
                }
            }
            Ok(adjacency)
        })
    }

    /// Populates the warm node cache from a node-id list.
    ///
    /// The cache can be populated once; it is read-only afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] when already populated and propagates
    /// storage failures.
    pub fn warm_cache(&self, node_ids: &[u32]) -> Result<()> {
        if self.node_cache.get().is_some() {
            return Err(Error::Usage("node cache is already populated".into()));
        }
        let mut cache = match self.disk_pq_table.as_ref() {
            Some(table) => NodeCache::with_capacity_coded(
                node_ids.len(),
                table.n_chunks(),
                self.layout.max_degree as usize,
            ),
            None => NodeCache::with_capacity(
                node_ids.len(),
                self.aligned_dim,
                self.layout.max_degree as usize,
            ),
        };

        let mut lease = self.scratch_pool.lease();
        let mut vector: Vec<E> = vec![E::default(); self.layout.data_dim as usize];
        for chunk in node_ids.chunks(MAX_FRONTIER_SECTORS) {
            let scratch = &mut *lease;
            self.fetch_frontier(
                chunk,
                scratch.io_handle.as_deref(),
                &mut scratch.sector_buf,
                &mut scratch.tensor_embeddings,
                &mut scratch.tensor_degrees,
                &mut scratch.tensor_nbrhoods,
                &mut scratch.stats,
                false,
            )?;
            for (i, &id) in chunk.iter().enumerate() {
                let node = self.fetched_node(FetchBuffers::of(&lease), chunk, i);
                let neighbors = node.neighbors_vec()?;
                if self.disk_pq_table.is_some() {
                    cache.insert_coded(id, node.payload, &neighbors);
                } else {
                    bytemuck::cast_slice_mut::<E, u8>(&mut vector)
                        .copy_from_slice(node.payload);
                    cache.insert(id, &vector, &neighbors);
                }
            }
        }
        drop(lease);

        info!(nodes = cache.len(), "populated node cache");
        self.node_cache
            .set(cache)
            .map_err(|_| Error::Usage("node cache is already populated".into()))
    }

    /// Issues one batch fetching the records for `ids`.
    ///
    /// Flat backend: one sector read per id into `sector_buf` slot `i`.
    /// Tensor backend: slice reads into the `tensor_*` buffers at slot `i`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn fetch_frontier(
        &self,
        ids: &[u32],
        io_handle: Option<&dyn BlockReader>,
        sector_buf: &mut AlignedBuf,
        tensor_embeddings: &mut [E],
        tensor_degrees: &mut [u32],
        tensor_nbrhoods: &mut [u32],
        stats: &mut QueryStats,
        skip_embedding: bool,
    ) -> Result<()> {
        debug_assert!(ids.len() <= MAX_FRONTIER_SECTORS);
        let io_start = std::time::Instant::now();
        match &self.backend {
            Backend::Flat { .. } => {
                let handle = io_handle.ok_or_else(|| {
                    Error::Usage("flat backend scratch is missing its storage handle".into())
                })?;
                let mut reqs = Vec::with_capacity(ids.len());
                for (slot, &id) in sector_buf
                    .as_mut_slice()
                    .chunks_mut(SECTOR_LEN)
                    .zip(ids.iter())
                {
                    reqs.push(AlignedRead::new(self.layout.node_sector_offset(id), slot)?);
                }
                stats.n_ios += reqs.len() as u32;
                stats.n_4k += reqs.iter().map(AlignedRead::blocks).sum::<u32>();
                let outcome = handle.read_batch(&mut reqs)?;
                stats.n_retries += outcome.retries;
            }
            Backend::Tensors { reader, async_mode } => {
                let dim = self.layout.data_dim as usize;
                let max_degree = self.layout.max_degree as usize;
                let mut reqs: Vec<PointSliceRead<'_, E>> = Vec::with_capacity(ids.len());
                for (((&id, embedding), degree), nbrhood) in ids
                    .iter()
                    .zip(tensor_embeddings.chunks_mut(dim))
                    .zip(tensor_degrees.iter_mut())
                    .zip(tensor_nbrhoods.chunks_mut(max_degree))
                {
                    reqs.push(PointSliceRead {
                        point_id: id,
                        embedding_buf: Some(embedding),
                        num_nbrs_buf: Some(degree),
                        nbrhood_buf: Some(nbrhood),
                    });
                }
                stats.n_ios += reqs.len() as u32;
                let mut groups: Vec<Vec<PointSliceRead<'_, E>>> = if *async_mode {
                    reqs.into_iter().map(|r| vec![r]).collect()
                } else {
                    vec![reqs]
                };
                reader.read(&mut groups, *async_mode, skip_embedding, false)?;
            }
        }
        stats.io_us += io_start.elapsed().as_micros() as u64;
        Ok(())
    }

    /// View of the record fetched for `ids[i]` by the last
    /// [`fetch_frontier`](Self::fetch_frontier) batch.
    pub(crate) fn fetched_node<'s>(
        &self,
        bufs: FetchBuffers<'s, E>,
        ids: &[u32],
        i: usize,
    ) -> FetchedNode<'s> {
        let id = ids[i];
        match &self.backend {
            Backend::Flat { .. } => {
                let sector = &bufs.sector[i * SECTOR_LEN..(i + 1) * SECTOR_LEN];
                let record = &sector[self.layout.node_offset_in_sector(id)..]
                    [..self.layout.max_node_len as usize];
                let vector_bytes = self.layout.disk_bytes_per_point as usize;
                FetchedNode {
                    id,
                    payload: &record[..vector_bytes],
                    degree: record_degree(record, vector_bytes),
                    neighbors: NeighborSource::Packed(&record[vector_bytes + 4..]),
                    max_degree: self.layout.max_degree as u32,
                    num_points: self.layout.num_points,
                }
            }
            Backend::Tensors { .. } => {
                let dim = self.layout.data_dim as usize;
                let max_degree = self.layout.max_degree as usize;
                FetchedNode {
                    id,
                    payload: bytemuck::cast_slice(&bufs.embeddings[i * dim..][..dim]),
                    degree: bufs.degrees[i],
                    neighbors: NeighborSource::Typed(&bufs.nbrhoods[i * max_degree..][..max_degree]),
                    max_degree: max_degree as u32,
                    num_points: self.layout.num_points,
                }
            }
        }
    }
}

/// Shared view over a scratch's fetch destinations, borrowing only the
/// storage buffers so the best-list and sets stay mutable alongside.
#[derive(Clone, Copy)]
pub(crate) struct FetchBuffers<'s, E> {
    pub sector: &'s [u8],
    pub embeddings: &'s [E],
    pub degrees: &'s [u32],
    pub nbrhoods: &'s [u32],
}

impl<'s, E: Element> FetchBuffers<'s, E> {
    /// Borrows the fetch destinations out of a scratch.
    pub(crate) fn of(scratch: &'s QueryScratch<E>) -> Self {
        Self {
            sector: scratch.sector_buf.as_slice(),
            embeddings: &scratch.tensor_embeddings,
            degrees: &scratch.tensor_degrees,
            nbrhoods: &scratch.tensor_nbrhoods,
        }
    }
}

/// Neighbor ids of a fetched record, still in storage representation.
pub(crate) enum NeighborSource<'a> {
    /// Little-endian u32s packed in record bytes.
    Packed(&'a [u8]),
    /// Already-typed ids from the tensor backend.
    Typed(&'a [u32]),
}

/// Parsed view over one fetched node record.
pub(crate) struct FetchedNode<'a> {
    pub id: u32,
    /// Vector bytes (element data, or PQ codes in disk-PQ mode).
    pub payload: &'a [u8],
    pub degree: u32,
    neighbors: NeighborSource<'a>,
    max_degree: u32,
    num_points: u64,
}

impl FetchedNode<'_> {
    /// Validates the degree bound.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphCorrupt`] when `degree > max_degree`.
    pub fn check_degree(&self) -> Result<()> {
        if self.degree > self.max_degree {
            return Err(Error::GraphCorrupt(format!(
                "node {} has degree {} > max degree {}",
                self.id, self.degree, self.max_degree
            )));
        }
        Ok(())
    }

    /// `i`-th neighbor id, validated against the point range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphCorrupt`] for an id outside `[0, num_points)`.
    pub fn neighbor(&self, i: usize) -> Result<u32> {
        let nbr = match self.neighbors {
            NeighborSource::Packed(bytes) => {
                u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap())
            }
            NeighborSource::Typed(ids) => ids[i],
        };
        if u64::from(nbr) >= self.num_points {
            return Err(Error::GraphCorrupt(format!(
                "node {} lists neighbor {nbr} outside [0, {})",
                self.id, self.num_points
            )));
        }
        Ok(nbr)
    }

    /// All neighbor ids as an owned list, degree- and range-validated.
    ///
    /// # Errors
    ///
    /// As [`check_degree`](Self::check_degree) and
    /// [`neighbor`](Self::neighbor).
    pub fn neighbors_vec(&self) -> Result<Vec<u32>> {
        self.check_degree()?;
        (0..self.degree as usize).map(|i| self.neighbor(i)).collect()
    }
}

fn pad_rows(data: &[f32], cols: usize, stride: usize) -> Vec<f32> {
    let rows = data.len() / cols;
    let mut out = vec![0.0f32; rows * stride];
    for r in 0..rows {
        out[r * stride..r * stride + cols].copy_from_slice(&data[r * cols..(r + 1) * cols]);
    }
    out
}

fn load_pq_codes(
    path: &Path,
    num_points: u64,
    n_chunks: usize,
    in_memory: bool,
) -> Result<PqCodes> {
    let validate = |rows: usize, cols: usize| -> Result<()> {
        if rows as u64 != num_points || cols != n_chunks {
            return Err(Error::Load(format!(
                "pq codes are ({rows}, {cols}), expected ({num_points}, {n_chunks})"
            )));
        }
        Ok(())
    };

    if in_memory {
        let (data, rows, cols) = bin::load_bin::<u8>(path)?;
        validate(rows, cols)?;
        return Ok(PqCodes::Owned(data));
    }

    let file = std::fs::File::open(path)
        .map_err(|e| Error::Load(format!("pq codes {}: {e}", path.display())))?;
    // SAFETY: the file is opened read-only and the index contract freezes
    // its artifacts for the life of the engine.
    let map = unsafe { Mmap::map(&file)? };
    if map.len() < 8 {
        return Err(Error::Load("pq codes file shorter than its header".into()));
    }
    let rows = i32::from_le_bytes(map[0..4].try_into().unwrap());
    let cols = i32::from_le_bytes(map[4..8].try_into().unwrap());
    if rows < 0 || cols < 0 {
        return Err(Error::Load(format!("negative pq code shape ({rows}, {cols})")));
    }
    validate(rows as usize, cols as usize)?;
    if map.len() < 8 + rows as usize * cols as usize {
        return Err(Error::Load("pq codes file truncated".into()));
    }
    Ok(PqCodes::Mapped {
        map,
        data_offset: 8,
    })
}

fn load_medoids(prefix: &Path, layout: &IndexLayout) -> Result<Vec<u32>> {
    let medoids_path = sibling(prefix, "_medoids.bin");
    if !medoids_path.exists() {
        return Ok(vec![layout.medoid]);
    }
    let (medoids, rows, cols) = bin::load_bin::<u32>(&medoids_path)?;
    if cols != 1 || rows == 0 {
        return Err(Error::Load(format!("medoid list is ({rows}, {cols})")));
    }
    for &m in &medoids {
        if u64::from(m) >= layout.num_points {
            return Err(Error::Load(format!(
                "medoid {m} outside [0, {})",
                layout.num_points
            )));
        }
    }
    Ok(medoids)
}

fn load_max_base_norm(prefix: &Path) -> Result<Option<f32>> {
    let path = sibling(prefix, "_max_base_norm.bin");
    if !path.exists() {
        return Ok(None);
    }
    let (norms, _, _) = bin::load_bin::<f32>(&path)?;
    norms
        .first()
        .copied()
        .map(Some)
        .ok_or_else(|| Error::Load("max base norm file is empty".into()))
}
