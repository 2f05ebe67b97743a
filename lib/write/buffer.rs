//! Write coalescing.
//!
//! Small writes are staged in memory as [`PendingChunk`]s. A write that touches or overlaps a
//! pending chunk of the same path is merged into it, newest bytes winning. Chunks that reach the
//! target size are split at that size and committed to the backend right away; everything else
//! waits for [`WriteBuffer::flush`].
//!
//! Pending chunks live only in memory. Bytes not yet flushed are lost if the process dies.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, instrument, trace};

use super::WriteError;
use super::slots::PathSlots;
use crate::backend::{Backend, WriteOptions};
use crate::segment::Segment;

/// A contiguous, not yet committed byte range of one path.
///
/// Always non-empty: `end() - start() + 1 == len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChunk {
    path: Arc<str>,
    start: u64,
    bytes: Vec<u8>,
}

impl PendingChunk {
    fn new(path: Arc<str>, start: u64, bytes: Vec<u8>) -> Self {
        debug_assert!(!bytes.is_empty(), "pending chunks are never empty");
        Self { path, start, bytes }
    }

    /// The path this chunk belongs to.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Offset of the first byte.
    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Offset of the last byte, inclusive.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start + self.len() - 1
    }

    /// Number of bytes staged.
    #[must_use]
    #[expect(clippy::len_without_is_empty, reason = "pending chunks are never empty")]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// The staged bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The range this chunk covers.
    #[must_use]
    pub fn segment(&self) -> Segment {
        Segment::new(self.start, self.len())
    }

    /// Overlapping or directly adjacent, with no gap in between.
    fn touches(&self, other: &Self) -> bool {
        self.start <= other.end().saturating_add(1) && other.start <= self.end().saturating_add(1)
    }

    /// Merges two touching chunks. Where they overlap, `top` wins.
    fn merge(bottom: Self, top: Self) -> Self {
        debug_assert!(bottom.touches(&top));
        let start = bottom.start.min(top.start);
        let end = bottom.end().max(top.end());
        #[expect(clippy::cast_possible_truncation, reason = "both inputs are in-memory buffers")]
        let len = (end - start + 1) as usize;
        #[expect(clippy::cast_possible_truncation, reason = "bounded by len")]
        let top_at = (top.start - start) as usize;

        let mut bytes = if bottom.start == start {
            let mut bytes = bottom.bytes;
            bytes.resize(len, 0);
            bytes
        } else {
            #[expect(clippy::cast_possible_truncation, reason = "bounded by len")]
            let bottom_at = (bottom.start - start) as usize;
            let mut bytes = vec![0; len];
            bytes[bottom_at..bottom_at + bottom.bytes.len()].copy_from_slice(&bottom.bytes);
            bytes
        };
        bytes[top_at..top_at + top.bytes.len()].copy_from_slice(&top.bytes);

        Self::new(top.path, start, bytes)
    }

    /// Splits off the first `at` bytes. `at` must be below `len()`.
    fn split_off_front(&mut self, at: usize) -> Self {
        let rest = self.bytes.split_off(at);
        let front = std::mem::replace(&mut self.bytes, rest);
        let front_start = self.start;
        self.start += at as u64;
        Self::new(Arc::clone(&self.path), front_start, front)
    }
}

/// Merges and splits `incoming` against `pending`, which must be pairwise disjoint and
/// non-adjacent. Returns the chunks that reached `target` and must be committed now.
///
/// On return `pending` is again pairwise disjoint and non-adjacent.
fn stage(pending: &mut Vec<PendingChunk>, incoming: PendingChunk, target: usize) -> Vec<PendingChunk> {
    let mut chunk = incoming;
    while let Some(idx) = pending.iter().position(|p| p.touches(&chunk)) {
        let bottom = pending.swap_remove(idx);
        trace!(bottom = %bottom.segment(), top = %chunk.segment(), "merging chunks");
        chunk = PendingChunk::merge(bottom, chunk);
    }

    let mut ready = Vec::new();
    while chunk.bytes.len() > target {
        ready.push(chunk.split_off_front(target));
    }
    if chunk.bytes.len() == target {
        ready.push(chunk);
    } else {
        pending.push(chunk);
    }
    ready
}

/// Coalesces writes per path before committing them to a [`Backend`].
pub struct WriteBuffer {
    backend: Arc<dyn Backend>,
    target: usize,
    slots: PathSlots<Vec<PendingChunk>>,
}

impl WriteBuffer {
    /// Creates a buffer that commits chunks once they reach `target` bytes.
    ///
    /// A zero target is treated as one byte.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, target: usize) -> Self {
        Self {
            backend,
            target: target.max(1),
            slots: PathSlots::new(),
        }
    }

    /// The configured chunk target size.
    #[must_use]
    pub fn target_size(&self) -> usize {
        self.target
    }

    /// Stages `data[..segment.length]` at `segment.offset`.
    ///
    /// Any chunk that reaches the target size is committed before this returns.
    #[instrument(name = "WriteBuffer::write", skip(self, data), fields(len = data.len()))]
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
        if segment.checked_end().is_none() {
            return Err(WriteError::SegmentOverflow(segment));
        }

        let (key, mut pending) = self.slots.lock(path).await;
        let incoming = PendingChunk::new(Arc::clone(&key), segment.offset, bytes.to_vec());
        let ready = stage(&mut pending, incoming, self.target);
        let result = self.commit(&mut pending, ready).await;
        drop(pending);
        self.slots.release(path, Vec::is_empty);
        result
    }

    /// Commits every pending chunk of `path`, then asks the backend to flush it.
    #[instrument(name = "WriteBuffer::flush", skip(self))]
    pub async fn flush(&self, path: &str) -> Result<(), WriteError> {
        if let Some(mut pending) = self.slots.lock_existing(path).await {
            let ready = std::mem::take(&mut *pending);
            let result = self.commit(&mut pending, ready).await;
            drop(pending);
            self.slots.release(path, Vec::is_empty);
            result?;
        }
        self.backend.flush(path).await?;
        Ok(())
    }

    /// Flushes every path with pending chunks. Stops at the first failure.
    #[instrument(name = "WriteBuffer::flush_all", skip(self))]
    pub async fn flush_all(&self) -> Result<(), WriteError> {
        for path in self.slots.paths() {
            self.flush(&path).await?;
        }
        Ok(())
    }

    /// Drops every pending chunk of `path` without committing it.
    #[instrument(name = "WriteBuffer::discard", skip(self))]
    pub async fn discard(&self, path: &str) -> usize {
        let Some(mut pending) = self.slots.lock_existing(path).await else {
            return 0;
        };
        let dropped = pending.len();
        pending.clear();
        drop(pending);
        self.slots.release(path, Vec::is_empty);
        dropped
    }

    /// A snapshot of the pending chunks of `path`, ordered by offset.
    pub async fn pending(&self, path: &str) -> Vec<PendingChunk> {
        let Some(pending) = self.slots.lock_existing(path).await else {
            return Vec::new();
        };
        let mut chunks = pending.clone();
        chunks.sort_by_key(PendingChunk::start);
        chunks
    }

    /// Every path that currently has staged state.
    #[must_use]
    pub fn pending_paths(&self) -> Vec<Arc<str>> {
        self.slots.paths()
    }

    /// Commits `ready` in order. On failure the failed chunk is dropped and the chunks not yet
    /// attempted go back into `pending`.
    async fn commit(
        &self,
        pending: &mut Vec<PendingChunk>,
        ready: Vec<PendingChunk>,
    ) -> Result<(), WriteError> {
        let mut ready = ready.into_iter();
        while let Some(chunk) = ready.next() {
            let segment = chunk.segment();
            debug!(path = chunk.path(), %segment, "committing chunk");
            let data = Bytes::from(chunk.bytes);
            if let Err(e) = self
                .backend
                .write(&chunk.path, data, segment, WriteOptions::default())
                .await
            {
                pending.extend(ready);
                return Err(e.into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(start: u64, bytes: &[u8]) -> PendingChunk {
        PendingChunk::new(Arc::from("/f"), start, bytes.to_vec())
    }

    #[test]
    fn merge_straddling_top_wins() {
        let merged = PendingChunk::merge(chunk(2, b"cdef"), chunk(0, b"XYZ"));
        assert_eq!(merged.start(), 0);
        assert_eq!(merged.bytes(), b"XYZdef");
        assert_eq!(merged.end(), 5);
    }

    #[test]
    fn merge_contained_top() {
        let merged = PendingChunk::merge(chunk(0, b"abcdef"), chunk(2, b"ZZ"));
        assert_eq!(merged.bytes(), b"abZZef");
    }

    #[test]
    fn merge_top_covers_bottom() {
        let merged = PendingChunk::merge(chunk(3, b"d"), chunk(0, b"ABCDEF"));
        assert_eq!(merged.start(), 0);
        assert_eq!(merged.bytes(), b"ABCDEF");
    }

    #[test]
    fn gap_does_not_touch() {
        assert!(!chunk(0, b"ab").touches(&chunk(3, b"d")));
        assert!(chunk(0, b"ab").touches(&chunk(2, b"c")));
        assert!(chunk(2, b"c").touches(&chunk(0, b"ab")));
    }

    #[test]
    fn stage_bridges_two_pending_chunks() {
        let mut pending = vec![chunk(0, b"aa"), chunk(4, b"ee")];
        let ready = stage(&mut pending, chunk(2, b"CC"), 1024);
        assert!(ready.is_empty());
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].start(), 0);
        assert_eq!(pending[0].bytes(), b"aaCCee");
    }

    #[test]
    fn stage_splits_at_target() {
        let mut pending = vec![chunk(0, b"abc")];
        let ready = stage(&mut pending, chunk(3, b"defghij"), 4);
        let ready: Vec<_> = ready.iter().map(|c| (c.start(), c.bytes().to_vec())).collect();
        assert_eq!(ready, vec![(0, b"abcd".to_vec()), (4, b"efgh".to_vec())]);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].start(), 8);
        assert_eq!(pending[0].bytes(), b"ij");
    }

    #[test]
    fn stage_exact_target_leaves_nothing_pending() {
        let mut pending = Vec::new();
        let ready = stage(&mut pending, chunk(10, b"wxyz"), 4);
        assert_eq!(ready.len(), 1);
        assert!(pending.is_empty());
    }
}
