//! Uncoalesced writes: every call goes straight to the backend.

use std::sync::Arc;

use bytes::Bytes;
use tracing::instrument;

use super::WriteError;
use crate::backend::{Backend, WriteOptions};
use crate::segment::Segment;

/// Forwards each write to the backend as-is.
pub struct DirectWriter {
    backend: Arc<dyn Backend>,
}

impl DirectWriter {
    /// Creates a writer over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Writes `data[..segment.length]` at `segment.offset`.
    #[instrument(name = "DirectWriter::write", skip(self, data), fields(len = data.len()))]
    pub async fn write(&self, path: &str, data: &[u8], segment: Segment) -> Result<(), WriteError> {
        let bytes = segment
            .len_usize()
            .and_then(|len| data.get(..len))
            .ok_or(WriteError::SegmentMismatch {
                segment,
                len: data.len(),
            })?;
        if bytes.is_empty() {
            return Ok(());
        }
        self.backend
            .write(
                path,
                Bytes::copy_from_slice(bytes),
                segment,
                WriteOptions::default(),
            )
            .await?;
        Ok(())
    }

    /// Asks the backend to flush `path`.
    #[instrument(name = "DirectWriter::flush", skip(self))]
    pub async fn flush(&self, path: &str) -> Result<(), WriteError> {
        self.backend.flush(path).await?;
        Ok(())
    }
}
