//! Segmented reads against a backend that does not reliably honor byte ranges.

use std::sync::Arc;

use futures::TryStreamExt as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, trace, warn};

use crate::backend::{Backend, BackendError};
use crate::errors::FsError;
use crate::segment::Segment;

/// How [`SegmentedReader`] fetches bytes from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadStrategy {
    /// One fetch, collected into memory before copying.
    #[default]
    Buffered,
    /// Copy chunks as they arrive and drop the stream once the segment is filled.
    Streaming,
}

/// Failure of [`SegmentedReader::read`].
#[derive(Debug, Error)]
pub enum ReadError {
    /// The backend rejected the fetch.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The caller asked for more bytes than its buffer holds.
    #[error("segment {segment} does not fit in a {capacity} byte buffer")]
    SegmentExceedsBuffer {
        /// Requested range.
        segment: Segment,
        /// Destination buffer size.
        capacity: usize,
    },

    /// `offset + length` does not fit in `u64`.
    #[error("segment {0} overflows the addressable range")]
    SegmentOverflow(Segment),
}

impl From<ReadError> for FsError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Backend(e) => e.into(),
            ReadError::SegmentExceedsBuffer { .. } | ReadError::SegmentOverflow(_) => {
                Self::BadSegment
            }
        }
    }
}

/// Copies backend bytes into caller buffers, clamped to the requested segment.
///
/// Bytes of the destination past `segment.length` are never touched. A backend returning
/// fewer bytes than asked yields a short read; one returning more is clamped.
#[derive(Clone)]
pub struct SegmentedReader {
    backend: Arc<dyn Backend>,
    strategy: ReadStrategy,
}

impl SegmentedReader {
    /// Creates a reader over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, strategy: ReadStrategy) -> Self {
        Self { backend, strategy }
    }

    /// The strategy in use.
    #[must_use]
    pub fn strategy(&self) -> ReadStrategy {
        self.strategy
    }

    /// Reads `segment` of `path` into the front of `dest`.
    ///
    /// Returns the segment actually filled: same offset, length equal to the bytes copied.
    #[instrument(name = "SegmentedReader::read", skip(self, dest), fields(strategy = ?self.strategy))]
    pub async fn read(
        &self,
        path: &str,
        dest: &mut [u8],
        segment: Segment,
    ) -> Result<Segment, ReadError> {
        if segment.checked_end().is_none() {
            return Err(ReadError::SegmentOverflow(segment));
        }
        let want = segment
            .len_usize()
            .filter(|&len| len <= dest.len())
            .ok_or(ReadError::SegmentExceedsBuffer {
                segment,
                capacity: dest.len(),
            })?;
        if want == 0 {
            return Ok(Segment::new(segment.offset, 0));
        }

        let copied = match self.strategy {
            ReadStrategy::Buffered => self.read_buffered(path, &mut dest[..want], segment).await?,
            ReadStrategy::Streaming => self.read_streaming(path, &mut dest[..want], segment).await?,
        };
        trace!(copied, "read complete");

        Ok(Segment::new(segment.offset, copied as u64))
    }

    async fn read_buffered(
        &self,
        path: &str,
        dest: &mut [u8],
        segment: Segment,
    ) -> Result<usize, ReadError> {
        let data = self.backend.read_bytes(path, segment).await?;

        // A reply longer than the request means the backend ignored the range and sent the
        // whole object, so the requested bytes start at `segment.offset` within it.
        let source = if data.len() > dest.len() {
            warn!(
                returned = data.len(),
                requested = dest.len(),
                %segment,
                "backend ignored the requested range"
            );
            usize::try_from(segment.offset)
                .ok()
                .and_then(|start| data.get(start..))
                .unwrap_or_default()
        } else {
            &data[..]
        };

        let n = source.len().min(dest.len());
        dest[..n].copy_from_slice(&source[..n]);
        Ok(n)
    }

    async fn read_streaming(
        &self,
        path: &str,
        dest: &mut [u8],
        segment: Segment,
    ) -> Result<usize, ReadError> {
        let mut stream = self.backend.read(path, segment).await?;
        let mut cursor = 0;

        while cursor < dest.len() {
            let Some(chunk) = stream.try_next().await? else {
                break;
            };
            let n = chunk.len().min(dest.len() - cursor);
            dest[cursor..cursor + n].copy_from_slice(&chunk[..n]);
            cursor += n;
            if n < chunk.len() {
                warn!(
                    dropped = chunk.len() - n,
                    %segment,
                    "backend sent more bytes than requested"
                );
            }
        }

        // Dropping the stream here stops a backend that would otherwise keep sending.
        drop(stream);
        Ok(cursor)
    }
}
