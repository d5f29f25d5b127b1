//! Per-query search statistics.

/// Statistics collected over a single query.
///
/// Delivered to the caller inside [`crate::index::SearchOutput`]; the engine
/// resets the record at the start of each query.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryStats {
    /// Total wall-clock microseconds for the query.
    pub total_us: u64,
    /// Microseconds spent outside storage waits (LUT build, PQ scoring,
    /// reranking, best-list maintenance).
    pub cpu_us: u64,
    /// Microseconds spent waiting on storage batches.
    pub io_us: u64,
    /// Number of read requests issued to storage.
    pub n_ios: u32,
    /// Number of 4K blocks read.
    pub n_4k: u32,
    /// Number of search rounds (hops) executed.
    pub n_hops: u32,
    /// Frontier nodes served from the warm node cache.
    pub n_cache_hits: u32,
    /// Transient storage errors retried internally.
    pub n_retries: u32,
    /// Set when the search stopped because the fetch-round budget ran out.
    pub io_limit_hit: bool,
}

impl QueryStats {
    /// Resets all counters for reuse by the next query.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Merges another record into this one.
    ///
    /// Used by range search to accumulate statistics across widening
    /// retries.
    pub fn accumulate(&mut self, other: &Self) {
        self.total_us += other.total_us;
        self.cpu_us += other.cpu_us;
        self.io_us += other.io_us;
        self.n_ios += other.n_ios;
        self.n_4k += other.n_4k;
        self.n_hops += other.n_hops;
        self.n_cache_hits += other.n_cache_hits;
        self.n_retries += other.n_retries;
        self.io_limit_hit |= other.io_limit_hit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_counters() {
        let mut stats = QueryStats {
            n_ios: 7,
            n_hops: 3,
            io_limit_hit: true,
            ..Default::default()
        };
        stats.reset();
        assert_eq!(stats.n_ios, 0);
        assert_eq!(stats.n_hops, 0);
        assert!(!stats.io_limit_hit);
    }

    #[test]
    fn test_accumulate_sums_and_ors() {
        let mut a = QueryStats {
            n_ios: 2,
            n_retries: 1,
            ..Default::default()
        };
        let b = QueryStats {
            n_ios: 3,
            io_limit_hit: true,
            ..Default::default()
        };
        a.accumulate(&b);
        assert_eq!(a.n_ios, 5);
        assert_eq!(a.n_retries, 1);
        assert!(a.io_limit_hit);
    }
}
