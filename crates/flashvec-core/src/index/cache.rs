//! Warm in-memory cache of node vectors and adjacency lists.
//!
//! The cache owns monotonically-grown arenas (vectors at the aligned
//! stride, neighbor ids packed back to back) and a map from point id into
//! them. It is populated once at load time and read-only afterwards, so
//! lookups take no lock and hand out slices borrowed from the arenas.
//!
//! In disk-PQ mode the on-disk "vector" is a code string; the cache then
//! carries a byte arena of codes instead of the element arena.

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

use crate::distance::Element;
use crate::error::Result;

/// A cached node.
pub struct CachedNode<'a, E> {
    /// Full-precision vector, `aligned_dim` elements, zero padded. Empty in
    /// disk-PQ mode.
    pub vector: &'a [E],
    /// Disk-PQ code bytes; empty unless disk-PQ mode.
    pub codes: &'a [u8],
    /// Neighbor ids, exactly `degree` entries.
    pub neighbors: &'a [u32],
}

#[derive(Clone, Copy)]
struct CacheSlot {
    payload_start: usize,
    nbr_start: usize,
    degree: u32,
}

/// Read-only node cache over two arenas.
pub struct NodeCache<E: Element> {
    map: FxHashMap<u32, CacheSlot>,
    vectors: Vec<E>,
    codes: Vec<u8>,
    neighbors: Vec<u32>,
    aligned_dim: usize,
    /// Bytes per cached code string; zero in full-precision mode.
    code_stride: usize,
}

impl<E: Element> NodeCache<E> {
    /// Creates an empty full-precision cache sized for `capacity` nodes.
    #[must_use]
    pub fn with_capacity(capacity: usize, aligned_dim: usize, max_degree: usize) -> Self {
        Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            vectors: Vec::with_capacity(capacity * aligned_dim),
            codes: Vec::new(),
            neighbors: Vec::with_capacity(capacity * max_degree),
            aligned_dim,
            code_stride: 0,
        }
    }

    /// Creates an empty cache holding disk-PQ code strings of
    /// `code_stride` bytes.
    #[must_use]
    pub fn with_capacity_coded(capacity: usize, code_stride: usize, max_degree: usize) -> Self {
        Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            vectors: Vec::new(),
            codes: Vec::with_capacity(capacity * code_stride),
            neighbors: Vec::with_capacity(capacity * max_degree),
            aligned_dim: 0,
            code_stride,
        }
    }

    /// Inserts one node during population.
    ///
    /// `vector` holds the node's leading elements (at most `aligned_dim`);
    /// the arena entry is zero padded to the aligned stride. Re-inserting an
    /// id is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if called on a coded cache.
    pub fn insert(&mut self, id: u32, vector: &[E], neighbors: &[u32]) {
        assert_eq!(self.code_stride, 0, "coded cache takes insert_coded");
        debug_assert!(vector.len() <= self.aligned_dim);
        if self.map.contains_key(&id) {
            return;
        }
        let payload_start = self.vectors.len();
        self.vectors.extend_from_slice(vector);
        self.vectors
            .resize(payload_start + self.aligned_dim, E::default());
        self.finish_insert(id, payload_start, neighbors);
    }

    /// Inserts one node's code string during population (disk-PQ mode).
    ///
    /// # Panics
    ///
    /// Panics if called on a full-precision cache or with a wrong-length
    /// code string.
    pub fn insert_coded(&mut self, id: u32, codes: &[u8], neighbors: &[u32]) {
        assert!(self.code_stride > 0, "full-precision cache takes insert");
        assert_eq!(codes.len(), self.code_stride);
        if self.map.contains_key(&id) {
            return;
        }
        let payload_start = self.codes.len();
        self.codes.extend_from_slice(codes);
        self.finish_insert(id, payload_start, neighbors);
    }

    fn finish_insert(&mut self, id: u32, payload_start: usize, neighbors: &[u32]) {
        let nbr_start = self.neighbors.len();
        self.neighbors.extend_from_slice(neighbors);
        self.map.insert(
            id,
            CacheSlot {
                payload_start,
                nbr_start,
                degree: neighbors.len() as u32,
            },
        );
    }

    /// Looks up a node; lock-free.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<CachedNode<'_, E>> {
        let slot = self.map.get(&id)?;
        let (vector, codes) = if self.code_stride == 0 {
            (
                &self.vectors[slot.payload_start..slot.payload_start + self.aligned_dim],
                &self.codes[..0],
            )
        } else {
            (
                &self.vectors[..0],
                &self.codes[slot.payload_start..slot.payload_start + self.code_stride],
            )
        };
        Some(CachedNode {
            vector,
            codes,
            neighbors: &self.neighbors[slot.nbr_start..slot.nbr_start + slot.degree as usize],
        })
    }

    /// Number of cached nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Selects up to `target` node ids by breadth-first expansion from the
/// medoids.
///
/// `fetch_neighbors` resolves one level's adjacency lists in a batch; the
/// walk stops when the target is met or the frontier empties. The returned
/// list is in discovery order, medoids first.
///
/// # Errors
///
/// Propagates storage failures from `fetch_neighbors`.
pub fn bfs_levels(
    medoids: &[u32],
    num_points: u64,
    target: usize,
    mut fetch_neighbors: impl FnMut(&[u32]) -> Result<Vec<Vec<u32>>>,
) -> Result<Vec<u32>> {
    let mut selected: Vec<u32> = Vec::with_capacity(target);
    let mut seen: FxHashSet<u32> = FxHashSet::default();
    let mut level: Vec<u32> = Vec::new();

    for &medoid in medoids {
        if seen.insert(medoid) {
            selected.push(medoid);
            level.push(medoid);
        }
    }

    while selected.len() < target && !level.is_empty() {
        let adjacency = fetch_neighbors(&level)?;
        let mut next: Vec<u32> = Vec::new();
        'level: for nbrs in adjacency {
            for nbr in nbrs {
                debug_assert!(u64::from(nbr) < num_points);
                if seen.insert(nbr) {
                    selected.push(nbr);
                    next.push(nbr);
                    if selected.len() >= target {
                        break 'level;
                    }
                }
            }
        }
        level = next;
    }

    Ok(selected)
}
