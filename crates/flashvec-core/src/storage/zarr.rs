//! Minimal chunked-array reader (zarr v2 layout, uncompressed).
//!
//! An array is a directory holding a `.zarray` JSON metadata document and
//! raw C-order chunk files named `<i>.<j>`. Chunks are always full-shape;
//! edge chunks are padded with the fill value. Only what the tensor backend
//! needs is supported: 2-D arrays, no compressor, no filters.
//!
//! Arrays are addressed through a [`KvStore`]: a local directory, or an
//! HTTP base URL behind the `remote` feature.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Key-value access to one array's directory.
pub trait KvStore: Send + Sync {
    /// Fetches the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tensor`] when the key does not exist or cannot be
    /// fetched.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Human-readable location for error messages.
    fn describe(&self) -> String;
}

/// Filesystem-backed store rooted at an array directory.
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.root.join(key);
        std::fs::read(&path).map_err(|e| Error::Tensor(format!("read {}: {e}", path.display())))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// HTTP-backed store for remotely served arrays.
#[cfg(feature = "remote")]
pub struct HttpKvStore {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "remote")]
impl HttpKvStore {
    /// Creates a store for `<base_url>/<array path>`.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

#[cfg(feature = "remote")]
impl KvStore for HttpKvStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{key}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::Tensor(format!("fetch {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Tensor(format!("fetch {url}: HTTP {}", response.status())));
        }
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| Error::Tensor(format!("fetch {url}: {e}")))
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// Element size in bytes for a supported dtype string.
///
/// # Errors
///
/// Returns [`Error::Tensor`] for any dtype outside the supported set.
pub fn dtype_size(dtype: &str) -> Result<usize> {
    match dtype {
        "<f4" | "<i4" | "<u4" => Ok(4),
        "|i1" | "|u1" => Ok(1),
        other => Err(Error::Tensor(format!("unsupported dtype '{other}'"))),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ZarrayMeta {
    shape: Vec<u64>,
    chunks: Vec<u64>,
    dtype: String,
    compressor: Option<serde_json::Value>,
    fill_value: serde_json::Value,
    order: String,
    filters: Option<serde_json::Value>,
    zarr_format: u32,
}

/// Byte-bounded LRU cache of decoded chunks.
///
/// The configured limit is advisory at the API surface; this cache is where
/// it is actually enforced.
struct ChunkCache {
    limit_bytes: usize,
    inner: Mutex<ChunkCacheInner>,
}

struct ChunkCacheInner {
    /// Front = least recently used, back = most recently used.
    map: IndexMap<(u64, u64), Arc<Vec<u8>>>,
    bytes: usize,
}

impl ChunkCache {
    fn new(limit_bytes: usize) -> Self {
        Self {
            limit_bytes,
            inner: Mutex::new(ChunkCacheInner {
                map: IndexMap::new(),
                bytes: 0,
            }),
        }
    }

    fn get(&self, key: (u64, u64)) -> Option<Arc<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let value = inner.map.shift_remove(&key)?;
        inner.map.insert(key, Arc::clone(&value));
        Some(value)
    }

    fn insert(&self, key: (u64, u64), value: Arc<Vec<u8>>) {
        let mut inner = self.inner.lock();
        if let Some(old) = inner.map.shift_remove(&key) {
            inner.bytes -= old.len();
        }
        inner.bytes += value.len();
        inner.map.insert(key, value);
        while inner.bytes > self.limit_bytes && inner.map.len() > 1 {
            if let Some((_, evicted)) = inner.map.shift_remove_index(0) {
                inner.bytes -= evicted.len();
            }
        }
    }
}

/// A read-only 2-D chunked array.
pub struct ChunkedArray {
    store: Box<dyn KvStore>,
    rows: u64,
    cols: u64,
    chunk_rows: u64,
    chunk_cols: u64,
    elem_size: usize,
    cache: ChunkCache,
}

impl std::fmt::Debug for ChunkedArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedArray")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("chunk_rows", &self.chunk_rows)
            .field("chunk_cols", &self.chunk_cols)
            .field("elem_size", &self.elem_size)
            .finish_non_exhaustive()
    }
}

impl ChunkedArray {
    /// Opens an array, validating dtype, shape, and layout against what the
    /// caller expects. A mismatch is fatal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tensor`] on missing metadata, an unsupported layout
    /// (compressed, non-C order, not 2-D), or a dtype/shape mismatch.
    pub fn open(
        store: Box<dyn KvStore>,
        expected_dtype: &str,
        expected_shape: (u64, u64),
        cache_limit_bytes: usize,
    ) -> Result<Self> {
        let raw = store.get(".zarray")?;
        let meta: ZarrayMeta = serde_json::from_slice(&raw)
            .map_err(|e| Error::Tensor(format!("{}: bad .zarray: {e}", store.describe())))?;

        if meta.zarr_format != 2 {
            return Err(Error::Tensor(format!(
                "{}: zarr_format {} unsupported",
                store.describe(),
                meta.zarr_format
            )));
        }
        if meta.order != "C" {
            return Err(Error::Tensor(format!(
                "{}: order '{}' unsupported",
                store.describe(),
                meta.order
            )));
        }
        if meta.compressor.is_some() || meta.filters.is_some() {
            return Err(Error::Tensor(format!(
                "{}: compressed arrays unsupported",
                store.describe()
            )));
        }
        if meta.shape.len() != 2 || meta.chunks.len() != 2 {
            return Err(Error::Tensor(format!(
                "{}: array rank is not 2",
                store.describe()
            )));
        }
        if meta.chunks[0] == 0 || meta.chunks[1] == 0 {
            return Err(Error::Tensor(format!(
                "{}: zero-sized chunks",
                store.describe()
            )));
        }
        if meta.dtype != expected_dtype {
            return Err(Error::Tensor(format!(
                "{}: dtype '{}' does not match expected '{expected_dtype}'",
                store.describe(),
                meta.dtype
            )));
        }
        if (meta.shape[0], meta.shape[1]) != expected_shape {
            return Err(Error::Tensor(format!(
                "{}: shape {:?} does not match expected {:?}",
                store.describe(),
                meta.shape,
                expected_shape
            )));
        }

        let elem_size = dtype_size(&meta.dtype)?;
        debug!(
            rows = meta.shape[0],
            cols = meta.shape[1],
            chunk_rows = meta.chunks[0],
            chunk_cols = meta.chunks[1],
            "opened chunked array at {}",
            store.describe()
        );

        Ok(Self {
            rows: meta.shape[0],
            cols: meta.shape[1],
            chunk_rows: meta.chunks[0],
            chunk_cols: meta.chunks[1],
            elem_size,
            cache: ChunkCache::new(cache_limit_bytes),
            store,
        })
    }

    /// Row count.
    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Column count.
    #[must_use]
    pub fn cols(&self) -> u64 {
        self.cols
    }

    /// Bytes per row.
    #[must_use]
    pub fn row_bytes(&self) -> usize {
        self.cols as usize * self.elem_size
    }

    fn chunk(&self, i: u64, j: u64) -> Result<Arc<Vec<u8>>> {
        if let Some(hit) = self.cache.get((i, j)) {
            return Ok(hit);
        }
        let key = format!("{i}.{j}");
        let raw = self.store.get(&key)?;
        let expected = (self.chunk_rows * self.chunk_cols) as usize * self.elem_size;
        if raw.len() != expected {
            return Err(Error::Tensor(format!(
                "{}: chunk {key} has {} bytes, expected {expected}",
                self.store.describe(),
                raw.len()
            )));
        }
        let chunk = Arc::new(raw);
        self.cache.insert((i, j), Arc::clone(&chunk));
        Ok(chunk)
    }

    /// Copies row `row` into `out` (`row_bytes()` long).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] for an out-of-range row or short buffer and
    /// [`Error::Tensor`] on a missing or malformed chunk.
    pub fn read_row_into(&self, row: u64, out: &mut [u8]) -> Result<()> {
        if row >= self.rows {
            return Err(Error::Usage(format!(
                "row {row} out of range [0, {})",
                self.rows
            )));
        }
        if out.len() < self.row_bytes() {
            return Err(Error::Usage(format!(
                "row buffer {} bytes, need {}",
                out.len(),
                self.row_bytes()
            )));
        }

        let chunk_row = row / self.chunk_rows;
        let local_row = (row % self.chunk_rows) as usize;
        let chunk_row_bytes = self.chunk_cols as usize * self.elem_size;

        let n_col_chunks = self.cols.div_ceil(self.chunk_cols);
        for j in 0..n_col_chunks {
            let chunk = self.chunk(chunk_row, j)?;
            let src = &chunk[local_row * chunk_row_bytes..][..chunk_row_bytes];

            let col_start = (j * self.chunk_cols) as usize * self.elem_size;
            let copy_len = chunk_row_bytes.min(self.row_bytes() - col_start);
            out[col_start..col_start + copy_len].copy_from_slice(&src[..copy_len]);
        }
        Ok(())
    }
}

/// Writes a full 2-D array as an uncompressed chunked directory.
///
/// `data` is the row-major array content; chunks span all columns and
/// `chunk_rows` rows each, zero-padded at the tail.
///
/// # Errors
///
/// Returns [`Error::Usage`] when `data` does not match the shape and
/// [`Error::Io`] on filesystem failures.
pub fn write_array(
    dir: &Path,
    dtype: &str,
    shape: (u64, u64),
    chunk_rows: u64,
    data: &[u8],
) -> Result<()> {
    let elem_size = dtype_size(dtype)?;
    let row_bytes = shape.1 as usize * elem_size;
    if data.len() != shape.0 as usize * row_bytes {
        return Err(Error::Usage(format!(
            "array data has {} bytes for shape {shape:?}",
            data.len()
        )));
    }
    let chunk_rows = chunk_rows.clamp(1, shape.0.max(1));

    std::fs::create_dir_all(dir)?;
    let meta = ZarrayMeta {
        shape: vec![shape.0, shape.1],
        chunks: vec![chunk_rows, shape.1],
        dtype: dtype.to_string(),
        compressor: None,
        fill_value: serde_json::Value::from(0),
        order: "C".to_string(),
        filters: None,
        zarr_format: 2,
    };
    let meta_json = serde_json::to_vec_pretty(&meta)
        .map_err(|e| Error::Tensor(format!("encode .zarray: {e}")))?;
    std::fs::write(dir.join(".zarray"), meta_json)?;

    let chunk_bytes = chunk_rows as usize * row_bytes;
    let n_chunks = shape.0.div_ceil(chunk_rows);
    for i in 0..n_chunks {
        let start = i as usize * chunk_bytes;
        let end = (start + chunk_bytes).min(data.len());
        let mut chunk = vec![0u8; chunk_bytes];
        chunk[..end - start].copy_from_slice(&data[start..end]);
        std::fs::write(dir.join(format!("{i}.0")), chunk)?;
    }
    Ok(())
}
