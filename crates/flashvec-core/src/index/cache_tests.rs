//! Tests for `cache` module

use super::cache::*;

#[test]
fn test_insert_and_get_pads_vector() {
    let mut cache = NodeCache::<f32>::with_capacity(4, 8, 4);
    cache.insert(3, &[1.0, 2.0, 3.0, 4.0], &[1, 2]);

    let node = cache.get(3).unwrap();
    assert_eq!(node.vector, &[1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0]);
    assert_eq!(node.neighbors, &[1, 2]);
    assert!(cache.get(4).is_none());
}

#[test]
fn test_reinsert_is_noop() {
    let mut cache = NodeCache::<u8>::with_capacity(2, 4, 4);
    cache.insert(0, &[1, 2, 3, 4], &[1]);
    cache.insert(0, &[9, 9, 9, 9], &[2, 3]);

    assert_eq!(cache.len(), 1);
    let node = cache.get(0).unwrap();
    assert_eq!(node.vector, &[1, 2, 3, 4]);
    assert_eq!(node.neighbors, &[1]);
}

#[test]
fn test_coded_cache_stores_code_strings() {
    let mut cache = NodeCache::<f32>::with_capacity_coded(2, 3, 4);
    cache.insert_coded(5, &[10, 20, 30], &[1, 2]);

    let node = cache.get(5).unwrap();
    assert!(node.vector.is_empty());
    assert_eq!(node.codes, &[10, 20, 30]);
    assert_eq!(node.neighbors, &[1, 2]);
}

#[test]
fn test_arena_layout_across_entries() {
    let mut cache = NodeCache::<f32>::with_capacity(3, 2, 4);
    cache.insert(0, &[1.0, 2.0], &[1, 2, 3]);
    cache.insert(1, &[3.0, 4.0], &[0]);

    assert_eq!(cache.get(0).unwrap().neighbors, &[1, 2, 3]);
    assert_eq!(cache.get(1).unwrap().vector, &[3.0, 4.0]);
    assert_eq!(cache.get(1).unwrap().neighbors, &[0]);
}

/// Adjacency of a 6-node cycle: i -> {i-1, i+1}.
fn ring_neighbors(ids: &[u32]) -> crate::error::Result<Vec<Vec<u32>>> {
    Ok(ids
        .iter()
        .map(|&i| vec![(i + 5) % 6, (i + 1) % 6])
        .collect())
}

#[test]
fn test_bfs_discovery_order_from_medoid() {
    let selected = bfs_levels(&[0], 6, 6, ring_neighbors).unwrap();
    assert_eq!(selected, vec![0, 5, 1, 4, 2, 3]);
}

#[test]
fn test_bfs_respects_target() {
    let selected = bfs_levels(&[0], 6, 3, ring_neighbors).unwrap();
    assert_eq!(selected, vec![0, 5, 1]);
}

#[test]
fn test_bfs_multiple_medoids_deduplicated() {
    let selected = bfs_levels(&[2, 2, 3], 6, 10, ring_neighbors).unwrap();
    assert_eq!(selected.len(), 6);
    assert_eq!(&selected[..2], &[2, 3]);
    let mut sorted = selected.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), 6);
}

#[test]
fn test_bfs_stops_when_frontier_empties() {
    // graph where node 0 only points at itself
    let selected = bfs_levels(&[0], 1, 100, |ids| {
        Ok(ids.iter().map(|_| vec![0u32]).collect())
    })
    .unwrap();
    assert_eq!(selected, vec![0]);
}
