//! ipfs-mount shared library.
//!
//! The I/O core that lets a FUSE mount sit on top of an IPFS node: segmented reads, write
//! coalescing, access-time bookkeeping and error classification, plus the handlers and the
//! fuser adapter that compose them.

/// First-access timestamps for synthesized attributes.
pub mod attr;
/// The remote store capability.
pub mod backend;
/// Filesystem error taxonomy.
pub mod errors;
/// Filesystem handlers and the FUSE bridge.
pub mod fs;
/// Segmented reads.
pub mod read;
/// Byte ranges.
pub mod segment;
/// Write strategies.
pub mod write;
