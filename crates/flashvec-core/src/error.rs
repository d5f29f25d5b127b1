//! Error types for `flashvec`.
//!
//! This module provides the unified error type for all engine operations.
//! Transient I/O failures are retried inside the storage layer and counted
//! in query statistics; everything surfaced here is final.

use thiserror::Error;

/// Result type alias for `flashvec` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or querying a disk index.
///
/// Each variant carries a descriptive message. Error codes follow the
/// pattern `FLASH-XXX` for easy debugging.
#[derive(Error, Debug)]
pub enum Error {
    /// Index load failure (FLASH-001).
    ///
    /// Malformed header, file size mismatch, or a missing sibling file.
    #[error("[FLASH-001] Index load failed: {0}")]
    Load(String),

    /// Fatal IO error (FLASH-002).
    ///
    /// A storage read that could not be completed after retries. Aborts the
    /// current query; the returned result lists are empty.
    #[error("[FLASH-002] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Graph corruption (FLASH-003).
    ///
    /// A node record with `degree > max_degree` or a neighbor id outside
    /// `[0, num_points)`. Aborts the current query.
    #[error("[FLASH-003] Graph corrupted: {0}")]
    GraphCorrupt(String),

    /// Invalid search parameters (FLASH-004).
    #[error("[FLASH-004] Usage error: {0}")]
    Usage(String),

    /// Configuration error (FLASH-005).
    #[error("[FLASH-005] Configuration error: {0}")]
    Config(String),

    /// Tensor backend error (FLASH-006).
    ///
    /// Missing array, dtype mismatch against stored metadata, or a malformed
    /// chunk.
    #[error("[FLASH-006] Tensor backend error: {0}")]
    Tensor(String),
}

impl Error {
    /// Returns the error code (e.g., "FLASH-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Load(_) => "FLASH-001",
            Self::Io(_) => "FLASH-002",
            Self::GraphCorrupt(_) => "FLASH-003",
            Self::Usage(_) => "FLASH-004",
            Self::Config(_) => "FLASH-005",
            Self::Tensor(_) => "FLASH-006",
        }
    }

    /// Returns true if retrying the operation with different inputs can
    /// succeed.
    ///
    /// Corruption is not recoverable without rebuilding the index.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::GraphCorrupt(_) | Self::Load(_))
    }
}
