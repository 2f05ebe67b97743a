//! Write strategies.
//!
//! [`Writer`] picks one of three ways to get file data to the backend:
//! coalescing ([`WriteBuffer`]), streaming ([`WriteThrough`]) or pass-through
//! ([`DirectWriter`]).

mod buffer;
mod direct;
mod slots;
mod through;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use buffer::{PendingChunk, WriteBuffer};
pub use direct::DirectWriter;
pub use through::WriteThrough;

use crate::backend::{Backend, BackendError};
use crate::errors::FsError;
use crate::segment::Segment;

/// Default size at which pending chunks are committed: 1 MiB.
pub const DEFAULT_CHUNK_TARGET_SIZE: usize = 1024 * 1024;

/// Failure of a write strategy.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The backend rejected a commit or flush.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The segment claims more bytes than the caller supplied.
    #[error("segment {segment} does not match a {len} byte buffer")]
    SegmentMismatch {
        /// Requested range.
        segment: Segment,
        /// Bytes supplied.
        len: usize,
    },

    /// `offset + length` does not fit in `u64`.
    #[error("segment {0} overflows the addressable range")]
    SegmentOverflow(Segment),

    /// The backend stopped consuming a write stream without reporting an error.
    #[error("write stream for {path} closed early")]
    StreamClosed {
        /// Path the stream was writing.
        path: String,
    },

    /// The task driving a write stream panicked or was cancelled.
    #[error("write stream task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<WriteError> for FsError {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::Backend(e) => e.into(),
            WriteError::SegmentMismatch { .. } | WriteError::SegmentOverflow(_) => {
                Self::BadSegment
            }
            WriteError::StreamClosed { .. } | WriteError::Task(_) => Self::RemoteIo(err.to_string()),
        }
    }
}

/// Which write strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteStrategy {
    /// Merge writes in memory and commit them in target-sized chunks.
    #[default]
    Coalescing,
    /// One backend write stream per path while offsets stay contiguous.
    WriteThrough,
    /// Every write straight to the backend.
    Direct,
}

/// Write path configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteConfig {
    /// Strategy to use.
    pub strategy: WriteStrategy,
    /// Size at which coalesced chunks are split and committed.
    pub chunk_target_size: usize,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            strategy: WriteStrategy::default(),
            chunk_target_size: DEFAULT_CHUNK_TARGET_SIZE,
        }
    }
}

/// The write strategy a mount runs with.
pub enum Writer {
    /// See [`WriteBuffer`].
    Coalescing(WriteBuffer),
    /// See [`WriteThrough`].
    WriteThrough(WriteThrough),
    /// See [`DirectWriter`].
    Direct(DirectWriter),
}

impl Writer {
    /// Builds the writer selected by `config`.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, config: WriteConfig) -> Self {
        match config.strategy {
            WriteStrategy::Coalescing => {
                Self::Coalescing(WriteBuffer::new(backend, config.chunk_target_size))
            }
            WriteStrategy::WriteThrough => Self::WriteThrough(WriteThrough::new(backend)),
            WriteStrategy::Direct => Self::Direct(DirectWriter::new(backend)),
        }
    }

    /// The strategy this writer implements.
    #[must_use]
    pub fn strategy(&self) -> WriteStrategy {
        match self {
            Self::Coalescing(_) => WriteStrategy::Coalescing,
            Self::WriteThrough(_) => WriteStrategy::WriteThrough,
            Self::Direct(_) => WriteStrategy::Direct,
        }
    }

    /// Writes `data[..segment.length]` to `path` at `segment.offset`.
    pub async fn write(&self, path: &str, data: &[u8], segment: Segment) -> Result<(), WriteError> {
        match self {
            Self::Coalescing(w) => w.write(path, data, segment).await,
            Self::WriteThrough(w) => w.write(path, data, segment).await,
            Self::Direct(w) => w.write(path, data, segment).await,
        }
    }

    /// Commits everything staged for `path` and flushes it on the backend.
    pub async fn flush(&self, path: &str) -> Result<(), WriteError> {
        match self {
            Self::Coalescing(w) => w.flush(path).await,
            Self::WriteThrough(w) => w.flush(path).await,
            Self::Direct(w) => w.flush(path).await,
        }
    }

    /// Flushes every path with staged state.
    pub async fn flush_all(&self) -> Result<(), WriteError> {
        match self {
            Self::Coalescing(w) => w.flush_all().await,
            Self::WriteThrough(w) => w.flush_all().await,
            Self::Direct(_) => Ok(()),
        }
    }

    /// Every path with staged state: pending chunks or an open write stream.
    #[must_use]
    pub fn staged_paths(&self) -> Vec<Arc<str>> {
        match self {
            Self::Coalescing(w) => w.pending_paths(),
            Self::WriteThrough(w) => w.open_paths(),
            Self::Direct(_) => Vec::new(),
        }
    }

    /// One past the last byte staged for `path` and not yet visible on the backend.
    pub async fn pending_end(&self, path: &str) -> Option<u64> {
        match self {
            Self::Coalescing(w) => w.pending(path).await.iter().map(|c| c.end() + 1).max(),
            Self::WriteThrough(w) => w.stream_end(path).await,
            Self::Direct(_) => None,
        }
    }

    /// Forgets staged state for `path`, e.g. before the path is removed.
    ///
    /// Pending chunks are dropped. An open write stream is closed, since bytes already handed
    /// to the backend cannot be recalled.
    pub async fn discard(&self, path: &str) -> Result<(), WriteError> {
        match self {
            Self::Coalescing(w) => {
                w.discard(path).await;
                Ok(())
            }
            Self::WriteThrough(w) => w.close(path).await.map(drop),
            Self::Direct(_) => Ok(()),
        }
    }
}
