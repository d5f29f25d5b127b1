//! Array-backend scenarios: conversion round-trip and flat/tensor parity.

mod common;

use common::{basis_vectors, Fixture};
use flashvec_core::storage::slice::flat_index_to_tensors;
use flashvec_core::storage::zarr::{ChunkedArray, FileKvStore};
use flashvec_core::{FlashIndex, Metric, OpenParams};

fn convert(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let prefix = Fixture::ring(basis_vectors()).write(dir);
    let tensors_prefix = dir.join("tensors");
    flat_index_to_tensors::<f32>(&dir.join("fixture_disk.index"), &tensors_prefix).unwrap();
    (prefix, tensors_prefix)
}

#[test]
fn test_conversion_round_trip_is_bit_identical() {
    let dir = tempfile::tempdir().unwrap();
    let (_, tensors_prefix) = convert(dir.path());
    let vectors = basis_vectors();

    let embedding = ChunkedArray::open(
        Box::new(FileKvStore::new(&dir.path().join("tensors_embedding.zarr"))),
        "<f4",
        (10, 4),
        1 << 20,
    )
    .unwrap();
    let num_nbrs = ChunkedArray::open(
        Box::new(FileKvStore::new(&dir.path().join("tensors_num_nbrs.zarr"))),
        "<u4",
        (10, 1),
        1 << 20,
    )
    .unwrap();
    let nbrhood = ChunkedArray::open(
        Box::new(FileKvStore::new(&dir.path().join("tensors_nbrhood.zarr"))),
        "<u4",
        (10, 4),
        1 << 20,
    )
    .unwrap();

    let mut row = vec![0.0f32; 4];
    let mut deg = [0u32; 1];
    let mut nbrs = [0u32; 4];
    for (id, vector) in vectors.iter().enumerate() {
        embedding
            .read_row_into(id as u64, bytemuck::cast_slice_mut(&mut row))
            .unwrap();
        assert_eq!(row.as_slice(), vector.as_slice(), "vector {id}");

        num_nbrs
            .read_row_into(id as u64, bytemuck::cast_slice_mut(&mut deg))
            .unwrap();
        assert_eq!(deg[0], 4);

        nbrhood
            .read_row_into(id as u64, bytemuck::cast_slice_mut(&mut nbrs))
            .unwrap();
        let n = id as u32;
        let expected = [(n + 1) % 10, (n + 2) % 10, (n + 9) % 10, (n + 5) % 10];
        assert_eq!(nbrs, expected);
    }

    let _ = tensors_prefix;
}

#[test]
fn test_tensor_backend_matches_flat_backend() {
    let dir = tempfile::tempdir().unwrap();
    let (prefix, tensors_prefix) = convert(dir.path());

    let flat = FlashIndex::<f32>::open(&OpenParams::new(&prefix, Metric::L2, 1)).unwrap();
    let mut params = OpenParams::new(&prefix, Metric::L2, 1);
    params.tensors_prefix = Some(tensors_prefix.clone());
    let tensors = FlashIndex::<f32>::open(&params).unwrap();

    for query in [
        [0.0f32, 0.0, 0.0, 1.0],
        [0.5, 0.5, 0.0, 0.0],
        [0.3, -0.2, 0.9, 0.1],
        [20.0, 21.0, 22.0, 23.0],
    ] {
        let a = flat.search(&query, 3, 8, 2, None, false).unwrap();
        let b = tensors.search(&query, 3, 8, 2, None, false).unwrap();
        assert_eq!(a.ids, b.ids, "query {query:?}");
        assert_eq!(a.distances, b.distances, "query {query:?}");
    }
}

#[test]
fn test_tensor_backend_async_matches_sync() {
    let dir = tempfile::tempdir().unwrap();
    let (prefix, tensors_prefix) = convert(dir.path());

    let mut params = OpenParams::new(&prefix, Metric::L2, 1);
    params.tensors_prefix = Some(tensors_prefix.clone());
    let sync_index = FlashIndex::<f32>::open(&params).unwrap();
    params.use_tensors_async = true;
    let async_index = FlashIndex::<f32>::open(&params).unwrap();

    let query = [0.0f32, 0.0, 0.0, 1.0];
    let a = sync_index.search(&query, 3, 8, 2, None, false).unwrap();
    let b = async_index.search(&query, 3, 8, 2, None, false).unwrap();
    assert_eq!(a.ids, b.ids);
    assert_eq!(a.distances, b.distances);
}

#[test]
fn test_tensor_backend_search_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let (prefix, tensors_prefix) = convert(dir.path());

    let mut params = OpenParams::new(&prefix, Metric::L2, 1);
    params.tensors_prefix = Some(tensors_prefix);
    let index = FlashIndex::<f32>::open(&params).unwrap();

    let out = index.search(&[0.0, 0.0, 0.0, 1.0], 1, 4, 2, None, false).unwrap();
    assert_eq!(out.ids, vec![3]);
    assert!(out.distances[0].abs() < 1e-6);
}

#[test]
fn test_tensor_backend_cache_and_range() {
    let dir = tempfile::tempdir().unwrap();
    let (prefix, tensors_prefix) = convert(dir.path());

    let mut params = OpenParams::new(&prefix, Metric::L2, 1);
    params.tensors_prefix = Some(tensors_prefix);
    let index = FlashIndex::<f32>::open(&params).unwrap();

    let hot = index.bfs_cache(10).unwrap();
    index.warm_cache(&hot).unwrap();

    let out = index
        .range_search(&[0.05, 0.0, 0.0, 1.0], 0.25, 4, 16, 3, 2)
        .unwrap();
    assert_eq!(out.ids, vec![3]);
    assert!(out.stats.n_cache_hits > 0);
}

#[test]
fn test_reorder_index_not_convertible() {
    let dir = tempfile::tempdir().unwrap();
    let mut fixture = Fixture::ring(basis_vectors());
    fixture.with_reorder = true;
    fixture.write(dir.path());

    let err = flat_index_to_tensors::<f32>(
        &dir.path().join("fixture_disk.index"),
        &dir.path().join("tensors"),
    )
    .unwrap_err();
    assert_eq!(err.code(), "FLASH-001");
}
