//! Tensor slice backend: per-point reads over three chunked arrays.
//!
//! An index converted to tensors is three sibling arrays under one prefix:
//! `*_embedding.zarr` `[N, D]` of the vector element type,
//! `*_num_nbrs.zarr` `[N, 1]` u32, and `*_nbrhood.zarr` `[N, R]` u32.
//! The reader serves batches of per-point slice reads, either resolving each
//! read before issuing the next (sync) or submitting every group and then
//! awaiting them (async).

use std::path::Path;

use bytemuck::{bytes_of_mut, cast_slice, cast_slice_mut};
use tracing::info;

use crate::distance::Element;
use crate::error::{Error, Result};
use crate::index::IndexLayout;
use crate::storage::aligned::SECTOR_LEN;
use crate::storage::zarr::{write_array, ChunkedArray, FileKvStore, KvStore};

/// One per-point slice read; `None` buffers are skipped.
pub struct PointSliceRead<'a, E: Element> {
    /// Point id to read.
    pub point_id: u32,
    /// Destination for the embedding row (`dim` elements).
    pub embedding_buf: Option<&'a mut [E]>,
    /// Destination for the neighbor count.
    pub num_nbrs_buf: Option<&'a mut u32>,
    /// Destination for the neighbor row (`max_nbrs` elements).
    pub nbrhood_buf: Option<&'a mut [u32]>,
}

/// Reader over the three index arrays.
pub struct TensorSliceReader<E: Element> {
    embedding: ChunkedArray,
    num_nbrs: ChunkedArray,
    nbrhood: ChunkedArray,
    dim: usize,
    max_nbrs: usize,
    _marker: std::marker::PhantomData<E>,
}

impl<E: Element> std::fmt::Debug for TensorSliceReader<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorSliceReader")
            .field("dim", &self.dim)
            .field("max_nbrs", &self.max_nbrs)
            .finish_non_exhaustive()
    }
}

fn open_store(prefix: &Path, name: &str, remote_addr: Option<&str>) -> Box<dyn KvStore> {
    let filename = format!(
        "{}{name}",
        prefix.file_name().map(|s| s.to_string_lossy()).unwrap_or_default()
    );
    match remote_addr {
        #[cfg(feature = "remote")]
        Some(addr) => Box::new(crate::storage::zarr::HttpKvStore::new(&format!(
            "{addr}/{filename}"
        ))),
        #[cfg(not(feature = "remote"))]
        Some(_) => unreachable!("remote addressing is rejected at open without the feature"),
        None => {
            let dir = prefix.with_file_name(filename);
            Box::new(FileKvStore::new(&dir))
        }
    }
}

impl<E: Element> TensorSliceReader<E> {
    /// Opens the three arrays under `tensors_prefix`.
    ///
    /// Array dtypes are validated against the element type and u32; a
    /// mismatch means the arrays were built for different data and is
    /// fatal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tensor`] when an array is missing, has the wrong
    /// dtype, or the wrong shape.
    pub fn open(
        tensors_prefix: &Path,
        num_points: u64,
        dim: u64,
        max_nbrs: u64,
        remote_addr: Option<&str>,
        cache_limit_bytes: usize,
    ) -> Result<Self> {
        #[cfg(not(feature = "remote"))]
        if remote_addr.is_some() {
            return Err(Error::Tensor(
                "remote tensor addressing requires the 'remote' feature".into(),
            ));
        }

        // each array gets an equal share of the advisory cache budget
        let per_array = (cache_limit_bytes / 3).max(SECTOR_LEN);

        let embedding = ChunkedArray::open(
            open_store(tensors_prefix, "_embedding.zarr", remote_addr),
            E::ZARR_DTYPE,
            (num_points, dim),
            per_array,
        )?;
        let num_nbrs = ChunkedArray::open(
            open_store(tensors_prefix, "_num_nbrs.zarr", remote_addr),
            "<u4",
            (num_points, 1),
            per_array,
        )?;
        let nbrhood = ChunkedArray::open(
            open_store(tensors_prefix, "_nbrhood.zarr", remote_addr),
            "<u4",
            (num_points, max_nbrs),
            per_array,
        )?;

        info!(num_points, dim, max_nbrs, "opened tensor slice reader");
        Ok(Self {
            embedding,
            num_nbrs,
            nbrhood,
            dim: dim as usize,
            max_nbrs: max_nbrs as usize,
            _marker: std::marker::PhantomData,
        })
    }

    /// Vector dimensionality of the embedding array.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Neighbor slots per point in the adjacency array.
    #[must_use]
    pub fn max_nbrs(&self) -> usize {
        self.max_nbrs
    }

    fn read_point(
        &self,
        req: &mut PointSliceRead<'_, E>,
        skip_embedding: bool,
        skip_neighbors: bool,
    ) -> Result<()> {
        let row = u64::from(req.point_id);

        if !skip_embedding {
            if let Some(buf) = req.embedding_buf.as_deref_mut() {
                if buf.len() < self.dim {
                    return Err(Error::Usage(format!(
                        "embedding buffer has {} elements, need {}",
                        buf.len(),
                        self.dim
                    )));
                }
                self.embedding
                    .read_row_into(row, cast_slice_mut(&mut buf[..self.dim]))?;
            }
        }
        if !skip_neighbors {
            if let Some(out) = req.num_nbrs_buf.as_mut() {
                self.num_nbrs.read_row_into(row, bytes_of_mut(&mut **out))?;
            }
            if let Some(buf) = req.nbrhood_buf.as_deref_mut() {
                if buf.len() < self.max_nbrs {
                    return Err(Error::Usage(format!(
                        "neighborhood buffer has {} elements, need {}",
                        buf.len(),
                        self.max_nbrs
                    )));
                }
                self.nbrhood
                    .read_row_into(row, cast_slice_mut(&mut buf[..self.max_nbrs]))?;
            }
        }
        Ok(())
    }

    /// Serves a batch of read groups.
    ///
    /// Sync mode resolves each group before the next; async mode submits
    /// every group concurrently and returns when all have completed.
    /// `skip_embedding` / `skip_neighbors` drop the respective portions for
    /// the whole batch.
    ///
    /// # Errors
    ///
    /// Returns the first failure; completed sibling reads are discarded.
    pub fn read(
        &self,
        batches: &mut [Vec<PointSliceRead<'_, E>>],
        async_mode: bool,
        skip_embedding: bool,
        skip_neighbors: bool,
    ) -> Result<()> {
        if !async_mode {
            for group in batches.iter_mut() {
                for req in group.iter_mut() {
                    self.read_point(req, skip_embedding, skip_neighbors)?;
                }
            }
            return Ok(());
        }

        let results: Vec<Result<()>> = std::thread::scope(|scope| {
            let handles: Vec<_> = batches
                .iter_mut()
                .map(|group| {
                    scope.spawn(move || {
                        for req in group.iter_mut() {
                            self.read_point(req, skip_embedding, skip_neighbors)?;
                        }
                        Ok(())
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|_| {
                    Err(Error::Tensor("tensor read worker panicked".into()))
                }))
                .collect()
        });
        results.into_iter().collect()
    }
}

/// Converts a flat disk index into the three tensor arrays.
///
/// Sweeps the node sectors once, splitting each record into its embedding,
/// degree, and neighbor-slot portions, and writes them as chunked arrays
/// under `tensors_prefix`. Indexes carrying a reorder segment are not
/// convertible.
///
/// # Errors
///
/// Returns [`Error::Load`] for a malformed source index and [`Error::Io`]
/// on read/write failures.
pub fn flat_index_to_tensors<E: Element>(index_path: &Path, tensors_prefix: &Path) -> Result<()> {
    use std::io::Read;

    let mut file = std::fs::File::open(index_path)
        .map_err(|e| Error::Load(format!("disk index {}: {e}", index_path.display())))?;
    let actual_size = file.metadata()?.len();

    let mut header = vec![0u8; SECTOR_LEN];
    file.read_exact(&mut header)?;
    let layout = IndexLayout::parse(&header, actual_size, std::mem::size_of::<E>(), None)?;
    if layout.reorder_start_sector.is_some() {
        return Err(Error::Load(
            "indexes with reorder data cannot be converted to tensors".into(),
        ));
    }

    let num_points = layout.num_points as usize;
    let dim = layout.data_dim as usize;
    let max_nbrs = layout.max_degree as usize;
    let vector_bytes = dim * std::mem::size_of::<E>();

    let mut embeddings = vec![E::default(); num_points * dim];
    let mut degrees = vec![0u32; num_points];
    let mut nbrhoods = vec![0u32; num_points * max_nbrs];

    let mut sector = vec![0u8; SECTOR_LEN];
    let per_sector = layout.nodes_per_sector as usize;
    let mut done = 0usize;
    while done < num_points {
        file.read_exact(&mut sector)?;
        let in_sector = per_sector.min(num_points - done);
        for i in 0..in_sector {
            let record = &sector[i * layout.max_node_len as usize..][..layout.max_node_len as usize];
            let id = done + i;

            // records sit at arbitrary byte offsets; copy through the
            // destination's byte view rather than casting the source
            cast_slice_mut::<E, u8>(&mut embeddings[id * dim..][..dim])
                .copy_from_slice(&record[..vector_bytes]);
            degrees[id] =
                u32::from_le_bytes(record[vector_bytes..vector_bytes + 4].try_into().unwrap());
            let nbr_bytes = &record[vector_bytes + 4..][..max_nbrs * 4];
            for (slot, chunk) in nbrhoods[id * max_nbrs..][..max_nbrs]
                .iter_mut()
                .zip(nbr_bytes.chunks_exact(4))
            {
                *slot = u32::from_le_bytes(chunk.try_into().unwrap());
            }
        }
        done += in_sector;
    }

    // size row chunks to roughly 1 MiB of embedding data
    let chunk_rows = ((1usize << 20) / vector_bytes.max(1)).clamp(1, num_points.max(1)) as u64;

    let name = |suffix: &str| {
        let base = tensors_prefix
            .file_name()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        tensors_prefix.with_file_name(format!("{base}{suffix}"))
    };
    write_array(
        &name("_embedding.zarr"),
        E::ZARR_DTYPE,
        (num_points as u64, dim as u64),
        chunk_rows,
        cast_slice(&embeddings),
    )?;
    write_array(
        &name("_num_nbrs.zarr"),
        "<u4",
        (num_points as u64, 1),
        chunk_rows,
        cast_slice(&degrees),
    )?;
    write_array(
        &name("_nbrhood.zarr"),
        "<u4",
        (num_points as u64, max_nbrs as u64),
        chunk_rows,
        cast_slice(&nbrhoods),
    )?;

    info!(
        num_points,
        dim, max_nbrs, "converted flat index to tensors at {}",
        tensors_prefix.display()
    );
    Ok(())
}
