//! The cached beam search.
//!
//! Per round: draw up to `beam_width` unexpanded best-list entries
//! (the frontier), serve warm ones from the node cache and fetch the rest
//! in one storage batch, replace their PQ estimates with full-precision
//! distances, then PQ-score their unvisited neighbors into the best-list.
//! The loop ends when the top-L entries are all expanded or the fetch-round
//! budget runs out.

use std::time::Instant;

use tracing::debug;

use crate::distance::{Element, Metric};
use crate::error::{Error, Result};
use crate::pq::{aggregate_lut, gather_codes};
use crate::scratch::{QueryScratch, MAX_FRONTIER_SECTORS};
use crate::simd;
use crate::storage::aligned::{AlignedRead, SECTOR_LEN};

use super::{FetchBuffers, FlashIndex, SearchOutput, FULL_PRECISION_REORDER_MULTIPLIER};

impl<E: Element> FlashIndex<E> {
    /// Searches for the `k` nearest points.
    ///
    /// `l` is the search width (best-list bound, `>= k`), `beam_width` the
    /// number of best-list entries expanded per round, `io_limit` an
    /// optional bound on fetch rounds, and `use_reorder_data` re-scores the
    /// top candidates from the reorder segment before truncation.
    ///
    /// # Errors
    ///
    /// [`Error::Usage`] for invalid parameters, [`Error::Io`] on fatal
    /// storage failure, [`Error::GraphCorrupt`] on a malformed record; in
    /// the error cases no partial results are returned.
    pub fn search(
        &self,
        query: &[E],
        k: usize,
        l: usize,
        beam_width: usize,
        io_limit: Option<u32>,
        use_reorder_data: bool,
    ) -> Result<SearchOutput> {
        self.validate_search_args(query, k, l, beam_width, use_reorder_data)?;

        let mut lease = self.scratch_pool.lease();
        let start = Instant::now();
        let (ids, distances) =
            self.run_beam_search(query, k, l, beam_width, io_limit, use_reorder_data, &mut lease)?;

        let mut stats = lease.stats;
        stats.total_us = start.elapsed().as_micros() as u64;
        stats.cpu_us = stats.total_us.saturating_sub(stats.io_us);
        Ok(SearchOutput {
            ids,
            distances,
            stats,
        })
    }

    fn validate_search_args(
        &self,
        query: &[E],
        k: usize,
        l: usize,
        beam_width: usize,
        use_reorder_data: bool,
    ) -> Result<()> {
        if query.is_empty() {
            return Err(Error::Usage("query is empty".into()));
        }
        if query.len() as u64 != self.layout.data_dim {
            return Err(Error::Usage(format!(
                "query has {} dims, index has {}",
                query.len(),
                self.layout.data_dim
            )));
        }
        if k == 0 {
            return Err(Error::Usage("k must be >= 1".into()));
        }
        if l < k {
            return Err(Error::Usage(format!("search width {l} < k {k}")));
        }
        if beam_width == 0 {
            return Err(Error::Usage("beam width must be >= 1".into()));
        }
        if use_reorder_data && self.layout.reorder_start_sector.is_none() {
            return Err(Error::Usage(
                "index carries no reorder data".into(),
            ));
        }
        Ok(())
    }

    /// Runs the traversal with a leased scratch, returning the k best
    /// `(id, distance)` pairs in ascending order.
    pub(crate) fn run_beam_search(
        &self,
        query: &[E],
        k: usize,
        l: usize,
        beam_width: usize,
        io_limit: Option<u32>,
        use_reorder_data: bool,
        scratch: &mut QueryScratch<E>,
    ) -> Result<(Vec<u32>, Vec<f32>)> {
        let dim = self.layout.data_dim as usize;

        // query preprocessing: element copy, f32 widening, metric transforms
        scratch.query.fill(E::default());
        scratch.query[..dim].copy_from_slice(query);
        for (dst, src) in scratch.query_f32.iter_mut().zip(scratch.query.iter()) {
            *dst = src.to_f32();
        }
        let mut result_scale = 1.0f32;
        match self.metric {
            Metric::Cosine if E::IS_FLOAT => {
                simd::normalize_in_place(&mut scratch.query_f32);
                copy_f32_query_back(scratch);
            }
            Metric::InnerProduct => {
                let norm = simd::squared_norm(&scratch.query_f32).sqrt();
                if norm > 0.0 {
                    for x in scratch.query_f32.iter_mut() {
                        *x /= norm;
                    }
                    copy_f32_query_back(scratch);
                    result_scale = norm * self.max_base_norm.unwrap_or(1.0);
                }
            }
            _ => {}
        }

        self.pq_table
            .populate_lut(&scratch.query_f32, self.metric, &mut scratch.lut);
        if let Some(table) = self.disk_pq_table.as_ref() {
            table.populate_lut(&scratch.query_f32, self.metric, &mut scratch.disk_lut);
        }

        let entry = self.pick_entry_point(&scratch.query_f32);

        scratch.best.reset(l);
        scratch.visited.insert(entry);
        gather_codes(&[entry], self.pq_data(), self.n_chunks, &mut scratch.code_slab);
        scratch.dist_scratch.clear();
        scratch.dist_scratch.resize(1, 0.0);
        aggregate_lut(
            &scratch.code_slab,
            self.n_chunks,
            &scratch.lut,
            &mut scratch.dist_scratch,
        );
        scratch.best.insert(entry, scratch.dist_scratch[0]);

        let io_limit = io_limit.unwrap_or(u32::MAX);
        let mut io_rounds = 0u32;
        let mut nbr_ids: Vec<u32> = Vec::new();

        loop {
            // EXPAND: draw the frontier for this round
            scratch.frontier.clear();
            scratch.frontier_cached.clear();
            let cache = self.node_cache.get();
            while scratch.frontier.len() + scratch.frontier_cached.len() < beam_width
                && scratch.frontier.len() < MAX_FRONTIER_SECTORS
            {
                let Some(candidate) = scratch.best.pop_closest_unexpanded() else {
                    break;
                };
                if cache.is_some_and(|c| c.get(candidate.id).is_some()) {
                    scratch.frontier_cached.push(candidate.id);
                } else {
                    scratch.frontier.push(candidate.id);
                }
            }
            if scratch.frontier.is_empty() && scratch.frontier_cached.is_empty() {
                break;
            }
            scratch.stats.n_hops += 1;

            // FETCH: one storage batch for the cold part of the frontier
            if !scratch.frontier.is_empty() {
                if io_rounds >= io_limit {
                    scratch.stats.io_limit_hit = true;
                    break;
                }
                io_rounds += 1;
                self.fetch_frontier(
                    &scratch.frontier,
                    scratch.io_handle.as_deref(),
                    &mut scratch.sector_buf,
                    &mut scratch.tensor_embeddings,
                    &mut scratch.tensor_degrees,
                    &mut scratch.tensor_nbrhoods,
                    &mut scratch.stats,
                    false,
                )?;
            }

            // RERANK: exact distances for the frontier, PQ for its
            // unexpanded neighborhood
            nbr_ids.clear();
            scratch.stats.n_cache_hits += scratch.frontier_cached.len() as u32;
            for slot in 0..scratch.frontier_cached.len() {
                let id = scratch.frontier_cached[slot];
                let node = cache
                    .expect("cached frontier implies a populated cache")
                    .get(id)
                    .expect("cached frontier entries stay cached");
                let exact = if self.disk_pq_table.is_some() {
                    one_lut_distance(node.codes, &scratch.disk_lut)
                } else {
                    self.dist.compare(&scratch.query, node.vector)
                };
                scratch.best.update_exact(id, exact);
                for &nbr in node.neighbors {
                    if scratch.visited.insert(nbr) {
                        nbr_ids.push(nbr);
                    }
                }
            }

            for slot in 0..scratch.frontier.len() {
                let bufs = FetchBuffers {
                    sector: scratch.sector_buf.as_slice(),
                    embeddings: &scratch.tensor_embeddings,
                    degrees: &scratch.tensor_degrees,
                    nbrhoods: &scratch.tensor_nbrhoods,
                };
                let node = self.fetched_node(bufs, &scratch.frontier, slot);
                node.check_degree()?;

                let exact = if self.disk_pq_table.is_some() {
                    one_lut_distance(node.payload, &scratch.disk_lut)
                } else {
                    let fp_bytes = bytemuck::cast_slice_mut::<E, u8>(&mut scratch.fp_vec);
                    fp_bytes[..node.payload.len()].copy_from_slice(node.payload);
                    fp_bytes[node.payload.len()..].fill(0);
                    self.dist.compare(&scratch.query, &scratch.fp_vec)
                };
                scratch.best.update_exact(node.id, exact);

                for i in 0..node.degree as usize {
                    let nbr = node.neighbor(i)?;
                    if scratch.visited.insert(nbr) {
                        nbr_ids.push(nbr);
                    }
                }
            }

            if !nbr_ids.is_empty() {
                gather_codes(&nbr_ids, self.pq_data(), self.n_chunks, &mut scratch.code_slab);
                scratch.dist_scratch.clear();
                scratch.dist_scratch.resize(nbr_ids.len(), 0.0);
                aggregate_lut(
                    &scratch.code_slab,
                    self.n_chunks,
                    &scratch.lut,
                    &mut scratch.dist_scratch,
                );
                for (i, &nbr) in nbr_ids.iter().enumerate() {
                    scratch.best.insert(nbr, scratch.dist_scratch[i]);
                }
            }
        }

        debug!(
            hops = scratch.stats.n_hops,
            ios = scratch.stats.n_ios,
            cache_hits = scratch.stats.n_cache_hits,
            "beam search converged"
        );

        let mut results: Vec<(u32, f32)> = scratch
            .best
            .iter()
            .map(|c| (c.id, c.distance))
            .collect();

        if use_reorder_data {
            let m = (FULL_PRECISION_REORDER_MULTIPLIER * k).min(results.len());
            results.truncate(m);
            self.rescore_from_reorder_data(&mut results, scratch)?;
        }

        results.truncate(k);
        if result_scale != 1.0 {
            for (_, dist) in &mut results {
                *dist *= result_scale;
            }
        }

        let ids = results.iter().map(|&(id, _)| id).collect();
        let distances = results.iter().map(|&(_, d)| d).collect();
        Ok((ids, distances))
    }

    /// Picks the entry medoid: the one whose centroid is closest to the
    /// query when several exist.
    fn pick_entry_point(&self, query_f32: &[f32]) -> u32 {
        if self.medoids.len() == 1 || self.centroid_data.is_empty() {
            return self.medoids[0];
        }
        let mut best = self.medoids[0];
        let mut best_dist = f32::INFINITY;
        for (i, &medoid) in self.medoids.iter().enumerate() {
            let row = &self.centroid_data[i * self.aligned_dim..][..self.aligned_dim];
            let dist = self.dist_f32.compare(query_f32, row);
            if dist < best_dist {
                best_dist = dist;
                best = medoid;
            }
        }
        best
    }

    /// Re-reads the candidates' full-precision vectors from the reorder
    /// segment and replaces their distances, re-sorting ascending.
    fn rescore_from_reorder_data(
        &self,
        results: &mut Vec<(u32, f32)>,
        scratch: &mut QueryScratch<E>,
    ) -> Result<()> {
        let dim = self.layout.ndims_reorder_vecs as usize;
        let mut vector = vec![0.0f32; self.aligned_dim];

        for chunk_at in (0..results.len()).step_by(MAX_FRONTIER_SECTORS) {
            let chunk_len = (results.len() - chunk_at).min(MAX_FRONTIER_SECTORS);
            let chunk = &mut results[chunk_at..chunk_at + chunk_len];

            let handle = scratch.io_handle.as_deref().ok_or_else(|| {
                Error::Usage("flat backend scratch is missing its storage handle".into())
            })?;
            let mut reqs = Vec::with_capacity(chunk_len);
            for (slot, &mut (id, _)) in scratch
                .sector_buf
                .as_mut_slice()
                .chunks_mut(SECTOR_LEN)
                .zip(chunk.iter_mut())
            {
                let offset = self
                    .layout
                    .reorder_sector_offset(id)
                    .expect("reorder flag validated before search");
                reqs.push(AlignedRead::new(offset, slot)?);
            }
            scratch.stats.n_ios += reqs.len() as u32;
            scratch.stats.n_4k += reqs.len() as u32;
            let io_start = Instant::now();
            let outcome = handle.read_batch(&mut reqs)?;
            scratch.stats.io_us += io_start.elapsed().as_micros() as u64;
            scratch.stats.n_retries += outcome.retries;
            drop(reqs);

            for (slot, &mut (id, ref mut dist)) in
                scratch.sector_buf.as_slice().chunks(SECTOR_LEN).zip(chunk.iter_mut())
            {
                let at = self.layout.reorder_offset_in_sector(id);
                let raw = &slot[at..at + dim * 4];
                for (dst, bytes) in vector.iter_mut().zip(raw.chunks_exact(4)) {
                    *dst = f32::from_le_bytes(bytes.try_into().unwrap());
                }
                vector[dim..].fill(0.0);
                *dist = self.dist_f32.compare(&scratch.query_f32, &vector);
            }
        }

        results.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(())
    }
}

/// Widens the transformed f32 query back into the element-typed buffer;
/// only reachable when `E` is f32.
fn copy_f32_query_back<E: Element>(scratch: &mut QueryScratch<E>) {
    let bytes: &[u8] = bytemuck::cast_slice(&scratch.query_f32);
    bytemuck::cast_slice_mut::<E, u8>(&mut scratch.query).copy_from_slice(bytes);
}

/// LUT aggregation for a single code vector.
fn one_lut_distance(codes: &[u8], lut: &[f32]) -> f32 {
    let mut out = [0.0f32];
    aggregate_lut(codes, codes.len(), lut, &mut out);
    out[0]
}
