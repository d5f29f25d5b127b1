//! Engine configuration.
//!
//! Layered via `flashvec.toml`, environment variables, and runtime
//! defaults.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`FLASHVEC_*`, `__`-separated sections)
//! 2. Configuration file (`flashvec.toml`)
//! 3. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Search parameter defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default search width (best-list bound).
    pub l_search: usize,
    /// Default beam width: best-list entries expanded per round.
    pub beam_width: usize,
    /// Optional bound on fetch rounds per query.
    pub io_limit: Option<u32>,
    /// Re-score the top candidates from the reorder segment when present.
    pub use_reorder_data: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            l_search: 100,
            beam_width: 4,
            io_limit: None,
            use_reorder_data: false,
        }
    }
}

/// Storage-layer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Read PQ codes onto the heap instead of memory-mapping them.
    pub pq_codes_in_memory: bool,
    /// Transient-retry bound per storage request.
    pub max_retries: u32,
    /// Advisory byte ceiling for the tensor chunk caches.
    pub tensor_cache_bytes: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            pq_codes_in_memory: true,
            max_retries: 3,
            tensor_cache_bytes: 1 << 30,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scratch pool size; maximum concurrent queries.
    pub threads: Option<usize>,
    /// Search defaults.
    pub search: SearchConfig,
    /// Storage settings.
    pub io: IoConfig,
}

impl EngineConfig {
    /// Loads configuration from `flashvec.toml` in the working directory
    /// plus `FLASHVEC_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on a malformed file or value.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("flashvec.toml"))
    }

    /// Loads configuration from a specific TOML file plus environment
    /// overrides. A missing file falls back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on a malformed file or value.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("FLASHVEC_").split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            return Err(Error::Config("threads must be >= 1".into()));
        }
        if self.search.l_search == 0 {
            return Err(Error::Config("search.l_search must be >= 1".into()));
        }
        if self.search.beam_width == 0 {
            return Err(Error::Config("search.beam_width must be >= 1".into()));
        }
        if self.io.max_retries > 64 {
            return Err(Error::Config("io.max_retries is unreasonably large".into()));
        }
        Ok(())
    }

    /// Effective thread count: the configured value, or the machine's
    /// available parallelism.
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
        })
    }

    /// Builds open parameters for an index from this configuration.
    #[must_use]
    pub fn open_params(
        &self,
        index_prefix: impl Into<std::path::PathBuf>,
        metric: crate::distance::Metric,
    ) -> crate::index::OpenParams {
        let mut params =
            crate::index::OpenParams::new(index_prefix, metric, self.effective_threads());
        params.pq_codes_in_memory = self.io.pq_codes_in_memory;
        params.max_io_retries = self.io.max_retries;
        params.tensor_cache_bytes = self.io.tensor_cache_bytes;
        params
    }
}
