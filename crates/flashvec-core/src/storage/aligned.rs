//! Sector-aligned block reads for the flat index backend.
//!
//! A request pairs a 4096-multiple file offset with a 4096-aligned buffer;
//! a batch of requests is submitted together and the call returns when every
//! request has completed. Requests within a batch complete in arbitrary
//! order; ordering is defined only across batch boundaries.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use tracing::warn;

use crate::error::{Error, Result};

/// Storage block size in bytes; the unit of I/O for the flat backend.
pub const SECTOR_LEN: usize = 4096;

/// An owned byte buffer with 4096-byte alignment.
pub struct AlignedBuf {
    ptr: NonNull<u8>,
    len: usize,
}

// The buffer is uniquely owned; access goes through &self/&mut self.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

impl AlignedBuf {
    /// Allocates a zeroed buffer of `len` bytes, rounded up to a whole
    /// number of sectors.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero or the allocation fails.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        assert!(len > 0, "aligned buffer must be non-empty");
        let len = len.div_ceil(SECTOR_LEN) * SECTOR_LEN;
        let layout = Layout::from_size_align(len, SECTOR_LEN).expect("valid aligned layout");
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).expect("aligned allocation failed");
        Self { ptr, len }
    }

    /// Length in bytes (always a multiple of the sector size).
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the buffer is empty (never, by construction).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The whole buffer as a shared slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for len bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The whole buffer as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for len bytes and uniquely borrowed.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.len, SECTOR_LEN).expect("valid aligned layout");
        // SAFETY: allocated with this exact layout in `zeroed`.
        unsafe { dealloc(self.ptr.as_ptr(), layout) };
    }
}

/// One aligned read request.
#[derive(Debug)]
pub struct AlignedRead<'a> {
    offset: u64,
    buf: &'a mut [u8],
}

impl<'a> AlignedRead<'a> {
    /// Builds a request, validating sector alignment of the offset, the
    /// buffer address, and the buffer length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] on any misalignment.
    pub fn new(offset: u64, buf: &'a mut [u8]) -> Result<Self> {
        if offset % SECTOR_LEN as u64 != 0 {
            return Err(Error::Usage(format!("read offset {offset} not sector-aligned")));
        }
        if buf.len() % SECTOR_LEN != 0 {
            return Err(Error::Usage(format!(
                "read length {} not a sector multiple",
                buf.len()
            )));
        }
        if buf.as_ptr() as usize % SECTOR_LEN != 0 {
            return Err(Error::Usage("read buffer not sector-aligned".into()));
        }
        Ok(Self { offset, buf })
    }

    /// File offset of the request.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of 4K blocks this request covers.
    #[must_use]
    pub fn blocks(&self) -> u32 {
        (self.buf.len() / SECTOR_LEN) as u32
    }

    /// Destination buffer.
    #[must_use]
    pub fn buf(&self) -> &[u8] {
        self.buf
    }
}

/// Result of one batch submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOutcome {
    /// Transient errors retried while completing the batch.
    pub retries: u32,
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
    )
}

/// Block storage abstraction for the flat backend.
///
/// Implementations provide a positional [`read_at`](Self::read_at); the
/// batch loop with transient-retry classification is shared. A handle is
/// cloned per worker thread before its first batch and dropped at teardown.
pub trait BlockReader: Send + Sync {
    /// Opens an independent handle for a worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the underlying resource cannot be reopened.
    fn clone_handle(&self) -> Result<Box<dyn BlockReader>>;

    /// One positional read filling `buf` completely.
    ///
    /// # Errors
    ///
    /// Any I/O error; transient kinds are retried by [`read_batch`](Self::read_batch).
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;

    /// Per-request transient retry bound.
    fn max_retries(&self) -> u32 {
        3
    }

    /// Submits a batch and blocks until every request completes.
    ///
    /// Transient failures are retried up to [`max_retries`](Self::max_retries)
    /// per request and counted; any other failure aborts the batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on a fatal read failure.
    fn read_batch(&self, reqs: &mut [AlignedRead<'_>]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for req in reqs.iter_mut() {
            let mut attempts = 0u32;
            loop {
                match self.read_at(req.offset, req.buf) {
                    Ok(()) => break,
                    Err(e) if is_transient(&e) && attempts < self.max_retries() => {
                        attempts += 1;
                        outcome.retries += 1;
                        warn!(offset = req.offset, attempts, "transient read error: {e}");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(outcome)
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut done = 0usize;
    while done < buf.len() {
        let n = file.seek_read(&mut buf[done..], offset + done as u64)?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        done += n;
    }
    Ok(())
}

/// File-backed block reader using positional reads.
///
/// Positional reads carry no seek state, so handles cloned per thread share
/// nothing but the descriptor table entry.
pub struct FileBlockReader {
    path: PathBuf,
    file: File,
    max_retries: u32,
}

impl FileBlockReader {
    /// Opens the index file for reading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened.
    pub fn open(path: &Path, max_retries: u32) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            max_retries,
        })
    }

    /// Size of the backing file in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if metadata cannot be read.
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl BlockReader for FileBlockReader {
    fn clone_handle(&self) -> Result<Box<dyn BlockReader>> {
        Ok(Box::new(Self::open(&self.path, self.max_retries)?))
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        read_exact_at(&self.file, offset, buf)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
