//! Tests for `layout` module

use super::layout::*;

use crate::storage::aligned::SECTOR_LEN;

/// Geometry for N=10, D=4, R=4, f32: record = 16 + 4 + 16 = 36 bytes.
fn sample_header(file_size: u64) -> Vec<u8> {
    encode_header(10, 4, 0, 36, (SECTOR_LEN / 36) as u64, false, file_size)
}

#[test]
fn test_parse_geometry() {
    let header = sample_header(8192);
    let layout = IndexLayout::parse(&header, 8192, 4, None).unwrap();

    assert_eq!(layout.num_points, 10);
    assert_eq!(layout.data_dim, 4);
    assert_eq!(layout.medoid, 0);
    assert_eq!(layout.max_node_len, 36);
    assert_eq!(layout.nodes_per_sector, 113);
    assert_eq!(layout.disk_bytes_per_point, 16);
    assert_eq!(layout.max_degree, 4);
    assert!(layout.reorder_start_sector.is_none());
}

#[test]
fn test_file_size_mismatch_rejected() {
    let header = sample_header(8192);
    let err = IndexLayout::parse(&header, 4096, 4, None).unwrap_err();
    assert_eq!(err.code(), "FLASH-001");
}

#[test]
fn test_bad_meta_shape_rejected() {
    let mut header = sample_header(8192);
    header[0..4].copy_from_slice(&7i32.to_le_bytes());
    let err = IndexLayout::parse(&header, 8192, 4, None).unwrap_err();
    assert_eq!(err.code(), "FLASH-001");
}

#[test]
fn test_medoid_out_of_range_rejected() {
    let header = encode_header(10, 4, 10, 36, 113, false, 8192);
    let err = IndexLayout::parse(&header, 8192, 4, None).unwrap_err();
    assert_eq!(err.code(), "FLASH-001");
}

#[test]
fn test_oversized_record_rejected() {
    // max_node_len > sector => nodes_per_sector 0
    let header = encode_header(10, 2048, 0, 8196, 0, false, 8192);
    let err = IndexLayout::parse(&header, 8192, 4, None).unwrap_err();
    assert_eq!(err.code(), "FLASH-001");
}

#[test]
fn test_node_addressing() {
    let header = sample_header(8192);
    let layout = IndexLayout::parse(&header, 8192, 4, None).unwrap();

    // 113 nodes per sector
    assert_eq!(layout.node_sector_offset(0), SECTOR_LEN as u64);
    assert_eq!(layout.node_sector_offset(112), SECTOR_LEN as u64);
    assert_eq!(layout.node_sector_offset(113), 2 * SECTOR_LEN as u64);
    assert_eq!(layout.node_offset_in_sector(0), 0);
    assert_eq!(layout.node_offset_in_sector(2), 72);
    assert_eq!(layout.node_offset_in_sector(113), 0);
}

#[test]
fn test_disk_pq_override_changes_geometry() {
    // record = 8 code bytes + 4 + R*4; choose max_node_len 44 -> R = 8
    let nodes_per_sector = (SECTOR_LEN / 44) as u64;
    let header = encode_header(100, 512, 3, 44, nodes_per_sector, false, 4096 * 3);
    let layout = IndexLayout::parse(&header, 4096 * 3, 4, Some(8)).unwrap();
    assert_eq!(layout.disk_bytes_per_point, 8);
    assert_eq!(layout.max_degree, 8);
}

#[test]
fn test_reorder_geometry() {
    // D=4 f32 => 256 reorder vectors per sector; 10 points => 1 data sector
    let header = encode_header(10, 4, 0, 36, 113, true, 3 * 4096);
    let layout = IndexLayout::parse(&header, 3 * 4096, 4, None).unwrap();
    assert_eq!(layout.reorder_start_sector, Some(2));
    assert_eq!(layout.nvecs_per_sector, 256);
    assert_eq!(layout.ndims_reorder_vecs, 4);
    assert_eq!(layout.reorder_sector_offset(0), Some(2 * 4096));
    assert_eq!(layout.reorder_sector_offset(256), Some(3 * 4096));
    assert_eq!(layout.reorder_offset_in_sector(3), 48);
}

#[test]
fn test_too_many_frozen_points_rejected() {
    let mut header = sample_header(8192);
    // frozen_points is the sixth u64 field
    header[8 + 5 * 8..8 + 6 * 8].copy_from_slice(&2u64.to_le_bytes());
    let err = IndexLayout::parse(&header, 8192, 4, None).unwrap_err();
    assert_eq!(err.code(), "FLASH-001");
}
