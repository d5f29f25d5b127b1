//! Storage layer: binary matrix files, sector-aligned block reads, and the
//! chunked-array tensor backend.
//!
//! # Module Structure
//!
//! - [`bin`]: `(rows, cols)`-framed binary matrix sections
//! - [`aligned`]: 4096-aligned batched block reads ([`aligned::BlockReader`])
//! - [`zarr`]: minimal chunked-array reader over a key-value store
//! - [`slice`]: per-point slice reads over the three index arrays

pub mod aligned;
pub mod bin;
pub mod slice;
pub mod zarr;
