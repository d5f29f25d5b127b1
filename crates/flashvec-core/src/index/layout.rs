//! Disk index header parsing and sector geometry.
//!
//! Sector 0 of the flat index holds the metadata: two little-endian `i32`
//! values `(9, 1)` describing the meta shape, then nine `u64` fields:
//! `num_points, data_dim, medoid, max_node_len, nodes_per_sector,
//! frozen_points, frozen_location, append_reorder_flag, file_size`.
//!
//! Node `u`'s record lives in sector `1 + u / nodes_per_sector` at byte
//! offset `(u % nodes_per_sector) * max_node_len`, laid out as
//! `[vector bytes | degree u32 | max_degree neighbor u32 slots]`.

use crate::error::{Error, Result};
use crate::storage::aligned::SECTOR_LEN;

const META_ROWS: i32 = 9;
const META_COLS: i32 = 1;

/// Parsed header plus derived geometry for one flat index file.
#[derive(Debug, Clone)]
pub struct IndexLayout {
    /// Number of points in the index.
    pub num_points: u64,
    /// True vector dimensionality.
    pub data_dim: u64,
    /// Default entry point.
    pub medoid: u32,
    /// On-disk record length per node.
    pub max_node_len: u64,
    /// Records packed per 4096-byte sector.
    pub nodes_per_sector: u64,
    /// Build-time frozen points (at most one supported).
    pub frozen_points: u64,
    /// Location of the frozen point, when present.
    pub frozen_location: u64,
    /// Total index file size recorded at build time.
    pub file_size: u64,
    /// Bytes of vector data per record (PQ code bytes in disk-PQ mode).
    pub disk_bytes_per_point: u64,
    /// Maximum graph out-degree a record can hold.
    pub max_degree: u64,
    /// First sector of the reorder segment, when the index carries one.
    pub reorder_start_sector: Option<u64>,
    /// Full-precision vectors per reorder sector.
    pub nvecs_per_sector: u64,
    /// Dimensionality of reorder vectors.
    pub ndims_reorder_vecs: u64,
}

impl IndexLayout {
    /// Parses and validates the header sector.
    ///
    /// `elem_size` is the byte width of the stored element type;
    /// `disk_pq_n_chunks` overrides the per-record vector bytes when the
    /// on-disk vectors are themselves PQ codes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Load`] on a malformed meta shape, a file-size
    /// mismatch, or inconsistent geometry.
    pub fn parse(
        header: &[u8],
        actual_file_size: u64,
        elem_size: usize,
        disk_pq_n_chunks: Option<u64>,
    ) -> Result<Self> {
        if header.len() < 8 + 9 * 8 {
            return Err(Error::Load("header sector too short".into()));
        }

        let read_i32 = |at: usize| i32::from_le_bytes(header[at..at + 4].try_into().unwrap());
        let read_u64 = |at: usize| u64::from_le_bytes(header[at..at + 8].try_into().unwrap());

        let meta_rows = read_i32(0);
        let meta_cols = read_i32(4);
        if meta_rows != META_ROWS || meta_cols != META_COLS {
            return Err(Error::Load(format!(
                "meta shape ({meta_rows}, {meta_cols}) != ({META_ROWS}, {META_COLS})"
            )));
        }

        let fields: Vec<u64> = (0..9).map(|i| read_u64(8 + i * 8)).collect();
        let [num_points, data_dim, medoid, max_node_len, nodes_per_sector, frozen_points, frozen_location, append_reorder, file_size] =
            fields[..]
        else {
            unreachable!()
        };

        if file_size != actual_file_size {
            return Err(Error::Load(format!(
                "recorded file size {file_size} != actual {actual_file_size}"
            )));
        }
        if num_points == 0 || data_dim == 0 {
            return Err(Error::Load(format!(
                "degenerate index: {num_points} points, dim {data_dim}"
            )));
        }
        if medoid >= num_points {
            return Err(Error::Load(format!(
                "medoid {medoid} out of range [0, {num_points})"
            )));
        }
        if frozen_points > 1 {
            return Err(Error::Load(format!(
                "{frozen_points} frozen points; at most one supported"
            )));
        }

        let disk_bytes_per_point =
            disk_pq_n_chunks.unwrap_or(data_dim * elem_size as u64);
        // vector bytes + degree + at least one neighbor slot
        if max_node_len < disk_bytes_per_point + 8 {
            return Err(Error::Load(format!(
                "max_node_len {max_node_len} too small for {disk_bytes_per_point} vector bytes"
            )));
        }
        if nodes_per_sector == 0 {
            return Err(Error::Load(
                "records longer than a sector are not supported".into(),
            ));
        }
        if nodes_per_sector != SECTOR_LEN as u64 / max_node_len {
            return Err(Error::Load(format!(
                "nodes_per_sector {nodes_per_sector} inconsistent with max_node_len {max_node_len}"
            )));
        }

        let max_degree = (max_node_len - disk_bytes_per_point - 4) / 4;

        let num_data_sectors = num_points.div_ceil(nodes_per_sector);
        let (reorder_start_sector, nvecs_per_sector, ndims_reorder_vecs) = if append_reorder != 0 {
            let nvecs = SECTOR_LEN as u64 / (data_dim * 4);
            if nvecs == 0 {
                return Err(Error::Load(
                    "reorder vectors longer than a sector are not supported".into(),
                ));
            }
            (Some(1 + num_data_sectors), nvecs, data_dim)
        } else {
            (None, 0, 0)
        };

        Ok(Self {
            num_points,
            data_dim,
            medoid: medoid as u32,
            max_node_len,
            nodes_per_sector,
            frozen_points,
            frozen_location,
            file_size,
            disk_bytes_per_point,
            max_degree,
            reorder_start_sector,
            nvecs_per_sector,
            ndims_reorder_vecs,
        })
    }

    /// Byte offset of the sector holding node `u`.
    #[must_use]
    pub fn node_sector_offset(&self, u: u32) -> u64 {
        (1 + u64::from(u) / self.nodes_per_sector) * SECTOR_LEN as u64
    }

    /// Byte offset of node `u`'s record within its sector.
    #[must_use]
    pub fn node_offset_in_sector(&self, u: u32) -> usize {
        (u64::from(u) % self.nodes_per_sector) as usize * self.max_node_len as usize
    }

    /// Byte offset of the reorder sector holding vector `u`, when reorder
    /// data exists.
    #[must_use]
    pub fn reorder_sector_offset(&self, u: u32) -> Option<u64> {
        let start = self.reorder_start_sector?;
        Some((start + u64::from(u) / self.nvecs_per_sector) * SECTOR_LEN as u64)
    }

    /// Byte offset of reorder vector `u` within its sector.
    #[must_use]
    pub fn reorder_offset_in_sector(&self, u: u32) -> usize {
        (u64::from(u) % self.nvecs_per_sector) as usize * self.ndims_reorder_vecs as usize * 4
    }
}

/// Serializes a header sector from layout fields (test and tooling support
/// for writing small indexes).
#[must_use]
pub fn encode_header(
    num_points: u64,
    data_dim: u64,
    medoid: u64,
    max_node_len: u64,
    nodes_per_sector: u64,
    append_reorder: bool,
    file_size: u64,
) -> Vec<u8> {
    let mut header = vec![0u8; SECTOR_LEN];
    header[0..4].copy_from_slice(&META_ROWS.to_le_bytes());
    header[4..8].copy_from_slice(&META_COLS.to_le_bytes());
    let fields = [
        num_points,
        data_dim,
        medoid,
        max_node_len,
        nodes_per_sector,
        0,
        0,
        u64::from(append_reorder),
        file_size,
    ];
    for (i, field) in fields.iter().enumerate() {
        header[8 + i * 8..8 + (i + 1) * 8].copy_from_slice(&field.to_le_bytes());
    }
    header
}
