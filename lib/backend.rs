//! The remote object store capability consumed by the I/O core.
//!
//! Implementations talk to the actual store (an IPFS daemon, an in-memory map in tests). The
//! core never retries a call; resilience, if wanted, belongs inside an implementation.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, TryStreamExt as _};
use thiserror::Error;

use crate::segment::Segment;

/// A stream of byte chunks coming from, or going to, the backend.
pub type ByteStream = BoxStream<'static, Result<Bytes, BackendError>>;

/// Failure reported by a [`Backend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend already produced a POSIX error number.
    #[error("backend returned errno {0}")]
    Errno(i32),

    /// The store rejected the call with a message.
    #[error("{message}")]
    Remote {
        /// Human-readable message as sent by the store.
        message: String,
        /// Store-specific error code, if any.
        code: Option<i64>,
    },

    /// The store could not be reached, or replied with something unintelligible.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl BackendError {
    /// Shorthand for a [`BackendError::Remote`] without a code.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            code: None,
        }
    }
}

/// The kind of object the store reports for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ObjectKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// Anything the store could not classify.
    Unknown,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsEntry {
    /// Entry name, relative to the listed directory.
    pub name: String,
    /// Nesting level below the listed directory. Direct children have depth 1.
    pub depth: u32,
    /// Object kind.
    pub kind: ObjectKind,
    /// Size in bytes.
    pub size: u64,
}

/// Attributes of a single object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectStat {
    /// Object kind.
    pub kind: ObjectKind,
    /// Size in bytes.
    pub size: u64,
    /// Number of blocks making up the object.
    pub blocks: u64,
}

/// Repository-wide usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepoStat {
    /// Number of objects stored.
    pub object_count: u64,
    /// Bytes in use.
    pub used_bytes: u64,
    /// Configured capacity in bytes.
    pub capacity_bytes: u64,
}

/// Options for [`Backend::write`] and [`Backend::write_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// Create the file if it does not exist.
    pub create: bool,
    /// Truncate the file before writing.
    pub truncate: bool,
}

/// Options for [`Backend::mkdir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MkdirOptions {
    /// Create missing parents.
    pub parents: bool,
}

/// Options for [`Backend::rm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RmOptions {
    /// Remove directories and their contents.
    pub recursive: bool,
}

/// A remote store that can be mounted.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetches the bytes of `path` within `segment`.
    ///
    /// The segment is a hint: an implementation may return the whole object, fewer bytes, or
    /// deliver them in arbitrarily sized chunks.
    async fn read(&self, path: &str, segment: Segment) -> Result<ByteStream, BackendError>;

    /// Like [`Backend::read`], collected into a single buffer.
    async fn read_bytes(&self, path: &str, segment: Segment) -> Result<Bytes, BackendError> {
        let buf = self
            .read(path, segment)
            .await?
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        Ok(buf.freeze())
    }

    /// Writes `data` at `segment.offset`. `segment.length` equals `data.len()`.
    async fn write(
        &self,
        path: &str,
        data: Bytes,
        segment: Segment,
        options: WriteOptions,
    ) -> Result<(), BackendError>;

    /// Writes every chunk of `data` contiguously, starting at `offset`.
    async fn write_stream(
        &self,
        path: &str,
        offset: u64,
        data: ByteStream,
        options: WriteOptions,
    ) -> Result<(), BackendError>;

    /// Lists the contents of a directory.
    async fn ls(&self, path: &str) -> Result<Vec<LsEntry>, BackendError>;

    /// Stats a single object.
    async fn stat(&self, path: &str) -> Result<ObjectStat, BackendError>;

    /// Creates a directory.
    async fn mkdir(&self, path: &str, options: MkdirOptions) -> Result<(), BackendError>;

    /// Removes a file or directory.
    async fn rm(&self, path: &str, options: RmOptions) -> Result<(), BackendError>;

    /// Moves `from` to `to`.
    async fn mv(&self, from: &str, to: &str) -> Result<(), BackendError>;

    /// Persists any state the store buffers for `path`.
    async fn flush(&self, path: &str) -> Result<(), BackendError>;

    /// Returns repository-wide usage statistics.
    async fn repo_stat(&self) -> Result<RepoStat, BackendError>;
}
