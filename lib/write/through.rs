//! Write-through streaming.
//!
//! Each path gets one open backend write stream while writes arrive at contiguous, increasing
//! offsets. A write at any other offset closes the current stream and starts a new one there.

use std::sync::Arc;

use bytes::Bytes;
use futures::SinkExt as _;
use futures::StreamExt as _;
use futures::channel::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace};

use super::WriteError;
use super::slots::PathSlots;
use crate::backend::{Backend, BackendError, WriteOptions};
use crate::segment::Segment;

/// How many chunks may queue in a stream before writers wait on the backend.
const STREAM_DEPTH: usize = 16;

struct StreamContext {
    next_offset: u64,
    tx: mpsc::Sender<Result<Bytes, BackendError>>,
    done: JoinHandle<Result<(), BackendError>>,
}

impl StreamContext {
    fn open(backend: &Arc<dyn Backend>, path: &str, offset: u64) -> Self {
        let (tx, rx) = mpsc::channel(STREAM_DEPTH);
        let backend = Arc::clone(backend);
        let path = path.to_owned();
        debug!(%path, offset, "opening write stream");
        let done = tokio::spawn(async move {
            backend
                .write_stream(&path, offset, rx.boxed(), WriteOptions::default())
                .await
        });
        Self {
            next_offset: offset,
            tx,
            done,
        }
    }

    /// Ends the stream and waits for the backend to finish consuming it.
    async fn close(self) -> Result<(), WriteError> {
        let Self { tx, done, .. } = self;
        drop(tx);
        done.await??;
        Ok(())
    }
}

#[derive(Default)]
struct StreamSlot {
    ctx: Option<StreamContext>,
}

/// Streams writes to the backend as they arrive.
pub struct WriteThrough {
    backend: Arc<dyn Backend>,
    slots: PathSlots<StreamSlot>,
}

impl WriteThrough {
    /// Creates a writer over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            slots: PathSlots::new(),
        }
    }

    /// Appends `data[..segment.length]` to the stream of `path`, restarting the stream if
    /// `segment.offset` is not where the previous write ended.
    #[instrument(name = "WriteThrough::write", skip(self, data), fields(len = data.len()))]
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
        let end = segment
            .checked_end()
            .ok_or(WriteError::SegmentOverflow(segment))?;

        let (_, mut slot) = self.slots.lock(path).await;

        if let Some(ctx) = slot.ctx.take_if(|ctx| ctx.next_offset != segment.offset) {
            debug!(
                expected = ctx.next_offset,
                got = segment.offset,
                "offset discontinuity, restarting stream"
            );
            if let Err(e) = ctx.close().await {
                drop(slot);
                self.slots.release(path, |slot| slot.ctx.is_none());
                return Err(e);
            }
        }
        let ctx = slot
            .ctx
            .get_or_insert_with(|| StreamContext::open(&self.backend, path, segment.offset));

        if ctx.tx.send(Ok(Bytes::copy_from_slice(bytes))).await.is_err() {
            // The backend stopped reading; its result explains why.
            let closed = match slot.ctx.take() {
                Some(ctx) => ctx.close().await,
                None => Ok(()),
            };
            drop(slot);
            self.slots.release(path, |slot| slot.ctx.is_none());
            closed?;
            return Err(WriteError::StreamClosed {
                path: path.to_owned(),
            });
        }
        ctx.next_offset = end;
        trace!(next_offset = end, "appended to stream");
        Ok(())
    }

    /// Closes the stream of `path`, if any, then asks the backend to flush it.
    #[instrument(name = "WriteThrough::flush", skip(self))]
    pub async fn flush(&self, path: &str) -> Result<(), WriteError> {
        self.close(path).await?;
        self.backend.flush(path).await?;
        Ok(())
    }

    /// Flushes every path with an open stream. Stops at the first failure.
    #[instrument(name = "WriteThrough::flush_all", skip(self))]
    pub async fn flush_all(&self) -> Result<(), WriteError> {
        for path in self.slots.paths() {
            self.flush(&path).await?;
        }
        Ok(())
    }

    /// Closes the stream of `path` without flushing. Returns whether one was open.
    pub async fn close(&self, path: &str) -> Result<bool, WriteError> {
        let Some(mut slot) = self.slots.lock_existing(path).await else {
            return Ok(false);
        };
        let ctx = slot.ctx.take();
        let result = match ctx {
            Some(ctx) => ctx.close().await.map(|()| true),
            None => Ok(false),
        };
        drop(slot);
        self.slots.release(path, |slot| slot.ctx.is_none());
        result
    }

    /// Every path with a stream slot.
    #[must_use]
    pub fn open_paths(&self) -> Vec<Arc<str>> {
        self.slots.paths()
    }

    /// Where the next contiguous write to `path` would land, if a stream is open.
    pub async fn stream_end(&self, path: &str) -> Option<u64> {
        let slot = self.slots.lock_existing(path).await?;
        slot.ctx.as_ref().map(|ctx| ctx.next_offset)
    }
}
