//! Shared test fixture: writes a small flat disk index with its PQ
//! siblings into a temp directory.
//!
//! The PQ table is built so that approximate distances are exact: pivot
//! row `i` holds point `i`'s vector and every point's code is `[i; 2]`,
//! so chunk lookups reconstruct the true vector. That keeps traversal
//! order deterministic for the scenario tests.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flashvec_core::index::layout::encode_header;
use flashvec_core::storage::bin::save_bin_to;

pub const SECTOR_LEN: usize = 4096;

/// A small index description.
pub struct Fixture {
    pub vectors: Vec<Vec<f32>>,
    pub adjacency: Vec<Vec<u32>>,
    pub medoid: u32,
    pub max_degree: usize,
    pub with_reorder: bool,
}

impl Fixture {
    pub fn new(vectors: Vec<Vec<f32>>, adjacency: Vec<Vec<u32>>, medoid: u32, max_degree: usize) -> Self {
        Self {
            vectors,
            adjacency,
            medoid,
            max_degree,
            with_reorder: false,
        }
    }

    /// Ring-with-chords graph over the given vectors: node `i` links to
    /// `i±1`, `i+2`, `i+5` (mod N). Strongly connected at degree 4.
    pub fn ring(vectors: Vec<Vec<f32>>) -> Self {
        let n = vectors.len() as u32;
        let adjacency = (0..n)
            .map(|i| vec![(i + 1) % n, (i + 2) % n, (i + n - 1) % n, (i + 5) % n])
            .collect();
        Self::new(vectors, adjacency, 0, 4)
    }

    /// Writes the index and siblings; returns the path prefix.
    pub fn write(&self, dir: &Path) -> PathBuf {
        let prefix = dir.join("fixture");
        let n = self.vectors.len();
        let dim = self.vectors[0].len();
        assert_eq!(dim % 2, 0, "fixture uses two equal PQ chunks");
        assert!(n <= 256, "codes are one byte");

        let max_node_len = dim * 4 + 4 + self.max_degree * 4;
        let nodes_per_sector = SECTOR_LEN / max_node_len;
        let data_sectors = n.div_ceil(nodes_per_sector);
        let reorder_sectors = if self.with_reorder {
            let nvecs = SECTOR_LEN / (dim * 4);
            n.div_ceil(nvecs)
        } else {
            0
        };
        let file_size = (1 + data_sectors + reorder_sectors) * SECTOR_LEN;

        // --- <prefix>_disk.index
        let mut index_bytes = encode_header(
            n as u64,
            dim as u64,
            u64::from(self.medoid),
            max_node_len as u64,
            nodes_per_sector as u64,
            self.with_reorder,
            file_size as u64,
        );
        index_bytes.resize(file_size, 0);
        for (id, (vector, nbrs)) in self.vectors.iter().zip(self.adjacency.iter()).enumerate() {
            let sector = 1 + id / nodes_per_sector;
            let mut at = sector * SECTOR_LEN + (id % nodes_per_sector) * max_node_len;
            for &x in vector {
                index_bytes[at..at + 4].copy_from_slice(&x.to_le_bytes());
                at += 4;
            }
            index_bytes[at..at + 4].copy_from_slice(&(nbrs.len() as u32).to_le_bytes());
            at += 4;
            for &nbr in nbrs {
                index_bytes[at..at + 4].copy_from_slice(&nbr.to_le_bytes());
                at += 4;
            }
        }
        if self.with_reorder {
            let nvecs = SECTOR_LEN / (dim * 4);
            for (id, vector) in self.vectors.iter().enumerate() {
                let sector = 1 + data_sectors + id / nvecs;
                let mut at = sector * SECTOR_LEN + (id % nvecs) * dim * 4;
                for &x in vector {
                    index_bytes[at..at + 4].copy_from_slice(&x.to_le_bytes());
                    at += 4;
                }
            }
        }
        File::create(prefix.with_file_name("fixture_disk.index"))
            .unwrap()
            .write_all(&index_bytes)
            .unwrap();

        // --- <prefix>_pq_pivots.bin: pivot row i = vector i, centered at 0
        let mut pivots = vec![0.0f32; 256 * dim];
        for (i, vector) in self.vectors.iter().enumerate() {
            pivots[i * dim..(i + 1) * dim].copy_from_slice(vector);
        }
        let centroid = vec![0.0f32; dim];
        let chunk_offsets: Vec<u32> = vec![0, (dim / 2) as u32, dim as u32];
        let mut pivots_bytes = Vec::new();
        save_bin_to(&mut pivots_bytes, &pivots, 256, dim).unwrap();
        save_bin_to(&mut pivots_bytes, &centroid, dim, 1).unwrap();
        save_bin_to(&mut pivots_bytes, &chunk_offsets, 3, 1).unwrap();
        File::create(prefix.with_file_name("fixture_pq_pivots.bin"))
            .unwrap()
            .write_all(&pivots_bytes)
            .unwrap();

        // --- <prefix>_pq_compressed.bin: code of point i is [i, i]
        let codes: Vec<u8> = (0..n).flat_map(|i| [i as u8, i as u8]).collect();
        let mut codes_bytes = Vec::new();
        save_bin_to(&mut codes_bytes, &codes, n, 2).unwrap();
        File::create(prefix.with_file_name("fixture_pq_compressed.bin"))
            .unwrap()
            .write_all(&codes_bytes)
            .unwrap();

        prefix
    }
}

/// Ten 4-dim vectors: points 0..4 are the canonical basis, the rest sit
/// far away along distinct directions.
pub fn basis_vectors() -> Vec<Vec<f32>> {
    let mut vectors = Vec::with_capacity(10);
    for i in 0..4 {
        let mut v = vec![0.0f32; 4];
        v[i] = 1.0;
        vectors.push(v);
    }
    for i in 4..10u32 {
        let base = 5.0 + i as f32;
        vectors.push(vec![base, base + 1.0, base + 2.0, base + 3.0]);
    }
    vectors
}

/// Ten distinct unit-norm 4-dim vectors for cosine scenarios.
pub fn unit_vectors() -> Vec<Vec<f32>> {
    (0..10u32)
        .map(|i| {
            let raw = vec![
                1.0 + i as f32,
                0.5 * i as f32,
                (i as f32).sin() + 2.0,
                1.0,
            ];
            let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
            raw.into_iter().map(|x| x / norm).collect()
        })
        .collect()
}
