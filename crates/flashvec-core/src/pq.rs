//! Product-quantization table and per-query lookup distances.
//!
//! A PQ table partitions the `dim` dimensions into `n_chunks` contiguous
//! sub-spaces and holds 256 centroids per sub-space. Per query, the engine
//! builds a lookup table `lut[chunk][centroid]` once and then scores any
//! candidate in `n_chunks` table reads.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::info;

use crate::distance::Metric;
use crate::error::{Error, Result};
use crate::storage::bin;

/// Number of centroids per chunk; codes are one byte per chunk.
pub const NUM_PQ_CENTROIDS: usize = 256;

/// Fixed-chunk product-quantization table.
///
/// Loaded from a `_pq_pivots.bin` sibling file holding three matrix
/// sections in sequence: pivots `(256, dim)` f32, per-dimension centroid
/// `(dim, 1)` f32, chunk offsets `(n_chunks + 1, 1)` u32.
#[derive(Debug)]
pub struct FixedChunkPqTable {
    /// Row-major `[centroid][dim]` pivot matrix, mean-centered at build time.
    pivots: Vec<f32>,
    /// Per-dimension mean subtracted from queries for L2/cosine tables.
    centroid: Vec<f32>,
    /// Chunk `c` covers dims `[chunk_offsets[c], chunk_offsets[c + 1])`.
    chunk_offsets: Vec<u32>,
    dim: usize,
}

impl FixedChunkPqTable {
    /// Loads the table from a pivots file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Load`] when a section is malformed or the chunk
    /// offsets are not a monotone partition of `[0, dim]`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::Load(format!("pq pivots file {}: {e}", path.display())))?;
        let mut reader = BufReader::new(file);

        let (pivots, rows, dim) = bin::load_bin_from::<f32>(&mut reader)?;
        if rows != NUM_PQ_CENTROIDS {
            return Err(Error::Load(format!(
                "pq pivots file {} has {rows} centroid rows, expected {NUM_PQ_CENTROIDS}",
                path.display()
            )));
        }

        let (centroid, centroid_rows, centroid_cols) = bin::load_bin_from::<f32>(&mut reader)?;
        if centroid_rows != dim || centroid_cols != 1 {
            return Err(Error::Load(format!(
                "pq centroid section is ({centroid_rows}, {centroid_cols}), expected ({dim}, 1)"
            )));
        }

        let (chunk_offsets, offset_rows, offset_cols) = bin::load_bin_from::<u32>(&mut reader)?;
        if offset_cols != 1 || offset_rows < 2 {
            return Err(Error::Load(format!(
                "pq chunk offsets section is ({offset_rows}, {offset_cols})"
            )));
        }

        let table = Self {
            pivots,
            centroid,
            chunk_offsets,
            dim,
        };
        table.validate_offsets()?;

        info!(
            dim = table.dim,
            n_chunks = table.n_chunks(),
            "loaded PQ pivots from {}",
            path.display()
        );
        Ok(table)
    }

    fn validate_offsets(&self) -> Result<()> {
        let offsets = &self.chunk_offsets;
        if offsets[0] != 0 || *offsets.last().unwrap() as usize != self.dim {
            return Err(Error::Load(format!(
                "pq chunk offsets must span [0, {}], got [{}, {}]",
                self.dim,
                offsets[0],
                offsets.last().unwrap()
            )));
        }
        if offsets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Load("pq chunk offsets are not increasing".into()));
        }
        Ok(())
    }

    /// Number of PQ chunks (bytes per code vector).
    #[must_use]
    pub fn n_chunks(&self) -> usize {
        self.chunk_offsets.len() - 1
    }

    /// Dimensionality the table was trained on.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Decodes one code vector back into float space:
    /// `out[d] = centroid[d] + pivot[code[chunk(d)]][d]`.
    ///
    /// # Panics
    ///
    /// Panics if `codes` is shorter than `n_chunks` or `out` shorter than
    /// `dim`.
    pub fn inflate(&self, codes: &[u8], out: &mut [f32]) {
        let n_chunks = self.n_chunks();
        assert!(codes.len() >= n_chunks, "code vector too short");
        assert!(out.len() >= self.dim, "output shorter than dim");
        for chunk in 0..n_chunks {
            let pivot_row = codes[chunk] as usize * self.dim;
            let lo = self.chunk_offsets[chunk] as usize;
            let hi = self.chunk_offsets[chunk + 1] as usize;
            for d in lo..hi {
                out[d] = self.centroid[d] + self.pivots[pivot_row + d];
            }
        }
    }

    /// Fills the per-query lookup table.
    ///
    /// `lut` is a caller-provided buffer of `n_chunks * 256` entries laid
    /// out `[chunk][centroid]`. L2 entries are squared distances between the
    /// centered query chunk and each pivot chunk; inner-product entries are
    /// negated per-chunk dot products. Cosine uses the L2 table — the engine
    /// normalizes the query beforehand.
    ///
    /// # Panics
    ///
    /// Panics if `query` is shorter than `dim` or `lut` is shorter than
    /// `n_chunks * 256`.
    pub fn populate_lut(&self, query: &[f32], metric: Metric, lut: &mut [f32]) {
        let n_chunks = self.n_chunks();
        assert!(query.len() >= self.dim, "query shorter than PQ dim");
        assert!(lut.len() >= n_chunks * NUM_PQ_CENTROIDS, "lut too small");

        lut[..n_chunks * NUM_PQ_CENTROIDS].fill(0.0);

        match metric {
            Metric::L2 | Metric::Cosine => {
                for chunk in 0..n_chunks {
                    let chunk_lut = &mut lut[chunk * NUM_PQ_CENTROIDS..][..NUM_PQ_CENTROIDS];
                    let lo = self.chunk_offsets[chunk] as usize;
                    let hi = self.chunk_offsets[chunk + 1] as usize;
                    for d in lo..hi {
                        let centered = query[d] - self.centroid[d];
                        for (k, slot) in chunk_lut.iter_mut().enumerate() {
                            let diff = centered - self.pivots[k * self.dim + d];
                            *slot += diff * diff;
                        }
                    }
                }
            }
            Metric::InnerProduct => {
                for chunk in 0..n_chunks {
                    let chunk_lut = &mut lut[chunk * NUM_PQ_CENTROIDS..][..NUM_PQ_CENTROIDS];
                    let lo = self.chunk_offsets[chunk] as usize;
                    let hi = self.chunk_offsets[chunk + 1] as usize;
                    for d in lo..hi {
                        let q = query[d];
                        for (k, slot) in chunk_lut.iter_mut().enumerate() {
                            *slot -= q * self.pivots[k * self.dim + d];
                        }
                    }
                }
            }
        }
    }
}

/// Scores a contiguous slab of code vectors against a lookup table.
///
/// `codes` holds `out.len()` code vectors of `n_chunks` bytes each; `out`
/// receives one approximate distance per vector.
///
/// # Panics
///
/// Panics if `codes` is shorter than `out.len() * n_chunks`.
#[inline]
pub fn aggregate_lut(codes: &[u8], n_chunks: usize, lut: &[f32], out: &mut [f32]) {
    assert!(codes.len() >= out.len() * n_chunks, "code slab too small");
    for (i, dist) in out.iter_mut().enumerate() {
        let code = &codes[i * n_chunks..][..n_chunks];
        let mut acc = 0.0f32;
        for (chunk, &centroid) in code.iter().enumerate() {
            acc += lut[chunk * NUM_PQ_CENTROIDS + centroid as usize];
        }
        *dist = acc;
    }
}

/// Gathers the code vectors for `ids` into a contiguous slab.
///
/// # Panics
///
/// Panics if any id indexes past the end of `pq_data`.
pub fn gather_codes(ids: &[u32], pq_data: &[u8], n_chunks: usize, slab: &mut Vec<u8>) {
    slab.clear();
    slab.reserve(ids.len() * n_chunks);
    for &id in ids {
        let row = &pq_data[id as usize * n_chunks..][..n_chunks];
        slab.extend_from_slice(row);
    }
}
