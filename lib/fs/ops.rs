//! Operation handlers.
//!
//! [`IpfsFs`] answers path-addressed filesystem calls by composing the segmented reader, the
//! write strategy and the attribute cache over a [`Backend`]. Every failure comes back as an
//! [`FsError`].

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use super::{DirEntry, FileStat, FsStats, MountKind, ROOT, is_within};
use crate::attr::AttributeCache;
use crate::backend::{Backend, MkdirOptions, ObjectKind, RmOptions, WriteOptions};
use crate::errors::FsError;
use crate::read::{ReadStrategy, SegmentedReader};
use crate::segment::Segment;
use crate::write::{WriteConfig, Writer};

/// Block size reported to the kernel by default: 256 KiB.
///
/// The kernel sizes its write requests after it, so small values make writes slow.
pub const DEFAULT_BLOCK_SIZE: u32 = 256 * 1024;

/// Block size used for capacity figures in [`IpfsFs::statfs`].
const STATFS_BLOCK_SIZE: u32 = 4096;

const MAX_NAME_LENGTH: u32 = 255;

/// Tunables of an [`IpfsFs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsOptions {
    /// What the mount exposes.
    pub kind: MountKind,
    /// Whether the mount root is itself reported as a directory.
    pub display_folder: bool,
    /// Owner reported for every object.
    pub uid: u32,
    /// Group reported for every object.
    pub gid: u32,
    /// Preferred I/O size reported for every object.
    pub block_size: u32,
    /// How reads reach the backend.
    pub read_strategy: ReadStrategy,
    /// How writes reach the backend.
    pub write: WriteConfig,
    /// Upper bound on remembered access times. `None` is unbounded.
    pub attr_cache_capacity: Option<u64>,
}

impl FsOptions {
    /// Defaults for `kind`, owned by the current user.
    #[must_use]
    pub fn for_kind(kind: MountKind) -> Self {
        Self {
            kind,
            display_folder: kind.default_display_folder(),
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            block_size: DEFAULT_BLOCK_SIZE,
            read_strategy: ReadStrategy::default(),
            write: WriteConfig::default(),
            attr_cache_capacity: None,
        }
    }
}

/// Path-addressed filesystem over a [`Backend`].
pub struct IpfsFs {
    backend: Arc<dyn Backend>,
    reader: SegmentedReader,
    writer: Writer,
    attrs: AttributeCache,
    options: FsOptions,
}

impl IpfsFs {
    /// Creates a filesystem over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, options: FsOptions) -> Self {
        Self {
            reader: SegmentedReader::new(Arc::clone(&backend), options.read_strategy),
            writer: Writer::new(Arc::clone(&backend), options.write),
            attrs: AttributeCache::new(options.attr_cache_capacity),
            backend,
            options,
        }
    }

    /// The options this filesystem runs with.
    #[must_use]
    pub fn options(&self) -> &FsOptions {
        &self.options
    }

    /// The write strategy in use.
    #[must_use]
    pub fn writer(&self) -> &Writer {
        &self.writer
    }

    /// The first-access record.
    #[must_use]
    pub fn attrs(&self) -> &AttributeCache {
        &self.attrs
    }

    fn kind(&self) -> MountKind {
        self.options.kind
    }

    fn ensure_writable(&self) -> Result<(), FsError> {
        if self.kind().is_read_only() {
            return Err(FsError::ReadOnly);
        }
        Ok(())
    }

    fn stat_for(&self, path: &str, kind: ObjectKind, size: u64) -> FileStat {
        let first_seen = self.attrs.first_access(path);
        FileStat {
            kind,
            perm: self.kind().permissions(kind),
            size,
            blocks: size.div_ceil(512),
            block_size: self.options.block_size,
            uid: self.options.uid,
            gid: self.options.gid,
            atime: SystemTime::now(),
            mtime: first_seen,
            ctime: first_seen,
        }
    }

    /// Creates an empty file.
    #[instrument(name = "IpfsFs::create", skip(self))]
    pub async fn create(&self, path: &str) -> Result<(), FsError> {
        self.ensure_writable()?;
        let options = WriteOptions {
            create: true,
            truncate: false,
        };
        self.backend
            .write(path, Bytes::new(), Segment::new(0, 0), options)
            .await?;
        Ok(())
    }

    /// Opens a file. Nothing is tracked per handle.
    #[instrument(name = "IpfsFs::open", skip(self))]
    pub async fn open(&self, path: &str) -> Result<(), FsError> {
        Ok(())
    }

    /// Opens a directory.
    #[instrument(name = "IpfsFs::opendir", skip(self))]
    pub async fn opendir(&self, path: &str) -> Result<(), FsError> {
        if path == ROOT && !self.options.display_folder {
            return Err(FsError::NotPermitted);
        }
        Ok(())
    }

    /// Attributes of `path`.
    #[instrument(name = "IpfsFs::getattr", skip(self))]
    pub async fn getattr(&self, path: &str) -> Result<FileStat, FsError> {
        if path == ROOT {
            if !self.options.display_folder {
                return Err(FsError::NotPermitted);
            }
            return Ok(self.stat_for(path, ObjectKind::Directory, 0));
        }

        let stat = self.backend.stat(&self.kind().backend_path(path)).await?;
        let size = match self.writer.pending_end(path).await {
            Some(end) if end > stat.size => end,
            _ => stat.size,
        };
        Ok(self.stat_for(path, stat.kind, size))
    }

    /// Direct children of `path`.
    #[instrument(name = "IpfsFs::readdir", skip(self))]
    pub async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let Some(listing_path) = self.kind().listing_path(path) else {
            debug!("immutable namespace root is not enumerable");
            return Ok(Vec::new());
        };
        let listing = self.backend.ls(&listing_path).await?;
        let total = listing.len();
        let entries: Vec<DirEntry> = listing
            .into_iter()
            .filter(|entry| entry.depth == 1)
            .map(|entry| DirEntry {
                name: entry.name,
                kind: entry.kind,
                size: entry.size,
            })
            .collect();
        if entries.len() != total {
            debug!(
                skipped = total - entries.len(),
                "dropped entries deeper than one level"
            );
        }
        Ok(entries)
    }

    /// Reads up to `buf.len()` bytes of `path` at `offset`. Returns the bytes read.
    #[instrument(name = "IpfsFs::read", skip(self, buf), fields(len = buf.len()))]
    pub async fn read(&self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        if path == ROOT {
            return Err(FsError::NotPermitted);
        }
        let segment = Segment::new(offset, buf.len() as u64);
        let filled = self
            .reader
            .read(&self.kind().backend_path(path), buf, segment)
            .await?;
        #[expect(clippy::cast_possible_truncation, reason = "bounded by buf.len()")]
        Ok(filled.length as usize)
    }

    /// Writes `data` to `path` at `offset`. Returns the bytes accepted.
    #[instrument(name = "IpfsFs::write", skip(self, data), fields(len = data.len()))]
    pub async fn write(&self, path: &str, data: &[u8], offset: u64) -> Result<usize, FsError> {
        if path == ROOT {
            return Err(FsError::NotPermitted);
        }
        self.ensure_writable()?;
        let segment = Segment::new(offset, data.len() as u64);
        self.writer.write(path, data, segment).await?;
        Ok(data.len())
    }

    /// Commits everything written to `path`.
    #[instrument(name = "IpfsFs::flush", skip(self))]
    pub async fn flush(&self, path: &str) -> Result<(), FsError> {
        if self.kind().is_read_only() || path == ROOT {
            return Ok(());
        }
        self.writer.flush(path).await?;
        Ok(())
    }

    /// Commits everything written to any path.
    #[instrument(name = "IpfsFs::flush_all", skip(self))]
    pub async fn flush_all(&self) -> Result<(), FsError> {
        self.writer.flush_all().await?;
        Ok(())
    }

    /// Creates a directory.
    #[instrument(name = "IpfsFs::mkdir", skip(self))]
    pub async fn mkdir(&self, path: &str) -> Result<(), FsError> {
        self.ensure_writable()?;
        self.backend
            .mkdir(path, MkdirOptions { parents: false })
            .await?;
        Ok(())
    }

    /// Removes an empty directory.
    #[instrument(name = "IpfsFs::rmdir", skip(self))]
    pub async fn rmdir(&self, path: &str) -> Result<(), FsError> {
        self.ensure_writable()?;
        if path == ROOT {
            return Err(FsError::NotPermitted);
        }
        if !self.backend.ls(path).await?.is_empty() {
            return Err(FsError::NotEmpty);
        }
        self.backend.rm(path, RmOptions { recursive: true }).await?;
        self.attrs.forget(path);
        Ok(())
    }

    /// Removes a file, dropping anything still staged for it.
    #[instrument(name = "IpfsFs::unlink", skip(self))]
    pub async fn unlink(&self, path: &str) -> Result<(), FsError> {
        self.ensure_writable()?;
        if let Err(e) = self.writer.discard(path).await {
            warn!(error = %e, "discarding staged writes failed");
        }
        self.backend.rm(path, RmOptions { recursive: false }).await?;
        self.attrs.forget(path);
        Ok(())
    }

    /// Moves `from` to `to`.
    ///
    /// Staged writes are keyed by path, so everything staged at or below `from` is committed
    /// first and everything staged at or below `to` is dropped, as the move replaces it.
    #[instrument(name = "IpfsFs::rename", skip(self))]
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        self.ensure_writable()?;
        if from == ROOT || to == ROOT {
            return Err(FsError::NotPermitted);
        }
        let staged = self.writer.staged_paths();
        for path in staged.iter().filter(|p| is_within(p, from)) {
            self.writer.flush(path).await?;
        }
        for path in staged
            .iter()
            .filter(|p| is_within(p, to) && !is_within(p, from))
        {
            debug!(path = &**path, "dropping writes staged for the rename target");
            self.writer.discard(path).await?;
        }
        self.backend.mv(from, to).await?;
        self.attrs.rename(from, to);
        Ok(())
    }

    /// Shrinks `path` to `size` bytes. Only truncation to zero is supported.
    #[instrument(name = "IpfsFs::truncate", skip(self))]
    pub async fn truncate(&self, path: &str, size: u64) -> Result<(), FsError> {
        self.ensure_writable()?;
        if size != 0 {
            return Err(FsError::Unsupported);
        }
        self.writer.discard(path).await?;
        let options = WriteOptions {
            create: false,
            truncate: true,
        };
        self.backend
            .write(path, Bytes::new(), Segment::new(0, 0), options)
            .await?;
        Ok(())
    }

    /// Capacity figures of the store.
    #[instrument(name = "IpfsFs::statfs", skip(self))]
    pub async fn statfs(&self) -> Result<FsStats, FsError> {
        let repo = self.backend.repo_stat().await?;
        let block = u64::from(STATFS_BLOCK_SIZE);
        let free = repo.capacity_bytes.saturating_sub(repo.used_bytes) / block;
        Ok(FsStats {
            block_size: STATFS_BLOCK_SIZE,
            total_blocks: repo.capacity_bytes / block,
            free_blocks: free,
            available_blocks: free,
            total_inodes: repo.object_count,
            free_inodes: 0,
            max_filename_length: MAX_NAME_LENGTH,
        })
    }

    /// Accepted and ignored on a writable mount.
    #[instrument(name = "IpfsFs::utimens", skip(self))]
    pub async fn utimens(&self, path: &str) -> Result<(), FsError> {
        self.ensure_writable()
    }

    /// Accepted and ignored on a writable mount.
    #[instrument(name = "IpfsFs::chown", skip(self))]
    pub async fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<(), FsError> {
        self.ensure_writable()
    }

    /// Accepted and ignored on a writable mount.
    #[instrument(name = "IpfsFs::chmod", skip(self))]
    pub async fn chmod(&self, path: &str, mode: u32) -> Result<(), FsError> {
        self.ensure_writable()
    }
}
