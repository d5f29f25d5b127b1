//! Range search: all points within a radius, via widening beam searches.

use std::time::Instant;

use tracing::debug;

use crate::distance::Element;
use crate::error::{Error, Result};
use crate::stats::QueryStats;

use super::{FlashIndex, SearchOutput};

impl<E: Element> FlashIndex<E> {
    /// Returns the points whose exact distance to `query` is at most
    /// `radius`, ascending by distance and truncated to `max_results`.
    ///
    /// Starts a beam search at width `l_min`; while the radius filter keeps
    /// at least half the candidate list (the ball may extend past it), the
    /// width doubles — same beam — up to `l_max`. The scratch lease is
    /// reused across retries and statistics accumulate over them.
    ///
    /// # Errors
    ///
    /// As [`search`](Self::search).
    pub fn range_search(
        &self,
        query: &[E],
        radius: f32,
        l_min: usize,
        l_max: usize,
        max_results: usize,
        beam_width: usize,
    ) -> Result<SearchOutput> {
        if l_min == 0 || l_min > l_max {
            return Err(Error::Usage(format!(
                "invalid search width range [{l_min}, {l_max}]"
            )));
        }
        if max_results == 0 {
            return Err(Error::Usage("max_results must be >= 1".into()));
        }
        if query.is_empty() || query.len() as u64 != self.layout.data_dim {
            return Err(Error::Usage(format!(
                "query has {} dims, index has {}",
                query.len(),
                self.layout.data_dim
            )));
        }
        if beam_width == 0 {
            return Err(Error::Usage("beam width must be >= 1".into()));
        }

        let mut lease = self.scratch_pool.lease();
        let start = Instant::now();
        let mut stats = QueryStats::default();
        let mut l = l_min;
        let (ids, distances) = loop {
            let (ids, distances) =
                self.run_beam_search(query, l, l, beam_width, None, false, &mut lease)?;
            stats.accumulate(&lease.stats);

            let in_range = distances.iter().take_while(|&&d| d <= radius).count();
            debug!(l, in_range, "range search pass");

            // fewer than half the list in range: the ball is covered
            let covered = in_range < l.div_ceil(2);
            if covered || in_range >= max_results || l >= l_max {
                break (
                    ids[..in_range].to_vec(),
                    distances[..in_range].to_vec(),
                );
            }
            l = (l * 2).min(l_max);
            lease.reset();
        };

        let keep = ids.len().min(max_results);
        stats.total_us = start.elapsed().as_micros() as u64;
        stats.cpu_us = stats.total_us.saturating_sub(stats.io_us);
        Ok(SearchOutput {
            ids: ids[..keep].to_vec(),
            distances: distances[..keep].to_vec(),
            stats,
        })
    }
}
