//! FUSE adapter: maps [`fuser::Filesystem`] callbacks onto [`IpfsFs`].
//!
//! Each callback resolves inode numbers to paths, then hands the work to a task on the tokio
//! runtime and returns. Several calls can therefore be in flight at once.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, instrument};

use super::inode_table::{InodeTable, ROOT_INO};
use super::ops::IpfsFs;
use super::{FileStat, InodeAddr, join};
use crate::backend::ObjectKind;
use crate::errors::FsError;

/// Trait abstracting the `.error(errno)` method common to all fuser reply types.
trait FuseReply {
    fn error(self, errno: i32);
}

macro_rules! impl_fuse_reply {
    ($($ty:ty),* $(,)?) => {
        $(impl FuseReply for $ty {
            fn error(self, errno: i32) {
                // Calls the inherent fuser method (not this trait method).
                self.error(errno);
            }
        })*
    };
}

impl_fuse_reply!(
    fuser::ReplyEntry,
    fuser::ReplyAttr,
    fuser::ReplyDirectory,
    fuser::ReplyOpen,
    fuser::ReplyData,
    fuser::ReplyWrite,
    fuser::ReplyEmpty,
    fuser::ReplyStatfs,
    fuser::ReplyCreate,
);

/// Extension trait on `Result<T, FsError>` for FUSE reply handling.
///
/// Centralizes the error-logging + errno-reply path so each FUSE callback
/// only has to express its success path.
trait FuseResultExt<T> {
    fn fuse_reply<R: FuseReply>(self, reply: R, on_ok: impl FnOnce(T, R));
}

impl<T> FuseResultExt<T> for Result<T, FsError> {
    fn fuse_reply<R: FuseReply>(self, reply: R, on_ok: impl FnOnce(T, R)) {
        match self {
            Ok(val) => on_ok(val, reply),
            Err(e) => reply_error(reply, &e),
        }
    }
}

fn reply_error<R: FuseReply>(reply: R, e: &FsError) {
    debug!(error = %e, errno = e.errno(), "replying error");
    reply.error(e.errno());
}

fn kind_to_fuser(kind: ObjectKind) -> fuser::FileType {
    match kind {
        ObjectKind::Directory => fuser::FileType::Directory,
        ObjectKind::File | ObjectKind::Unknown => fuser::FileType::RegularFile,
    }
}

fn stat_to_fuser(ino: InodeAddr, stat: &FileStat) -> fuser::FileAttr {
    fuser::FileAttr {
        ino,
        size: stat.size,
        blocks: stat.blocks,
        atime: stat.atime,
        mtime: stat.mtime,
        ctime: stat.ctime,
        crtime: stat.ctime,
        kind: kind_to_fuser(stat.kind),
        perm: stat.perm.bits(),
        nlink: if stat.kind == ObjectKind::Directory { 2 } else { 1 },
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: stat.block_size,
        flags: 0,
    }
}

fn name_str(name: &OsStr) -> Result<&str, FsError> {
    name.to_str().ok_or(FsError::Errno(libc::EINVAL))
}

/// Bridges [`IpfsFs`] to the [`fuser::Filesystem`] trait.
pub struct FuserAdapter {
    fs: Arc<IpfsFs>,
    inodes: Arc<InodeTable>,
    runtime: tokio::runtime::Handle,
}

impl FuserAdapter {
    // Entries can change behind our back on a shared store, so the kernel is told to
    // revalidate often.
    const TTL: Duration = Duration::from_secs(1);

    /// Creates an adapter serving `fs` on `runtime`.
    pub fn new(fs: Arc<IpfsFs>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            fs,
            inodes: Arc::new(InodeTable::new()),
            runtime,
        }
    }

    fn path(&self, ino: InodeAddr) -> Result<Arc<str>, FsError> {
        self.inodes.path(ino).ok_or(FsError::NotFound)
    }

    fn child_path(&self, parent: InodeAddr, name: &OsStr) -> Result<String, FsError> {
        let parent = self.path(parent)?;
        Ok(join(&parent, name_str(name)?))
    }
}

impl fuser::Filesystem for FuserAdapter {
    #[instrument(name = "FuserAdapter::destroy", skip(self))]
    fn destroy(&mut self) {
        if let Err(e) = self.runtime.block_on(self.fs.flush_all()) {
            error!(error = %e, "failed to flush pending writes on unmount");
        }
    }

    #[instrument(name = "FuserAdapter::lookup", skip(self, _req, reply))]
    fn lookup(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        let inodes = Arc::clone(&self.inodes);
        self.runtime.spawn(async move {
            fs.getattr(&path).await.fuse_reply(reply, |stat, reply| {
                let attr = stat_to_fuser(inodes.lookup(&path), &stat);
                debug!(?attr, "replying...");
                reply.entry(&Self::TTL, &attr, 0);
            });
        });
    }

    #[instrument(name = "FuserAdapter::forget", skip(self, _req))]
    fn forget(&mut self, _req: &fuser::Request<'_>, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    #[instrument(name = "FuserAdapter::getattr", skip(self, _req, _fh, reply))]
    fn getattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: Option<u64>,
        reply: fuser::ReplyAttr,
    ) {
        let path = match self.path(ino) {
            Ok(path) => path,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn(async move {
            fs.getattr(&path).await.fuse_reply(reply, |stat, reply| {
                let attr = stat_to_fuser(ino, &stat);
                debug!(?attr, "replying...");
                reply.attr(&Self::TTL, &attr);
            });
        });
    }

    #[instrument(
        name = "FuserAdapter::setattr",
        skip(self, _req, _ctime, _fh, _crtime, _chgtime, _bkuptime, _flags, reply)
    )]
    fn setattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<fuser::TimeOrNow>,
        mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: fuser::ReplyAttr,
    ) {
        let path = match self.path(ino) {
            Ok(path) => path,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn(async move {
            let result = async {
                if let Some(size) = size {
                    fs.truncate(&path, size).await?;
                }
                if let Some(mode) = mode {
                    fs.chmod(&path, mode).await?;
                }
                if uid.is_some() || gid.is_some() {
                    fs.chown(&path, uid, gid).await?;
                }
                if atime.is_some() || mtime.is_some() {
                    fs.utimens(&path).await?;
                }
                fs.getattr(&path).await
            }
            .await;
            result.fuse_reply(reply, |stat, reply| {
                reply.attr(&Self::TTL, &stat_to_fuser(ino, &stat));
            });
        });
    }

    #[instrument(name = "FuserAdapter::mkdir", skip(self, _req, _mode, _umask, reply))]
    fn mkdir(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: fuser::ReplyEntry,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        let inodes = Arc::clone(&self.inodes);
        self.runtime.spawn(async move {
            let result = async {
                fs.mkdir(&path).await?;
                fs.getattr(&path).await
            }
            .await;
            result.fuse_reply(reply, |stat, reply| {
                reply.entry(&Self::TTL, &stat_to_fuser(inodes.lookup(&path), &stat), 0);
            });
        });
    }

    #[instrument(name = "FuserAdapter::unlink", skip(self, _req, reply))]
    fn unlink(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        let inodes = Arc::clone(&self.inodes);
        self.runtime.spawn(async move {
            fs.unlink(&path).await.fuse_reply(reply, |(), reply| {
                inodes.remove(&path);
                reply.ok();
            });
        });
    }

    #[instrument(name = "FuserAdapter::rmdir", skip(self, _req, reply))]
    fn rmdir(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        let inodes = Arc::clone(&self.inodes);
        self.runtime.spawn(async move {
            fs.rmdir(&path).await.fuse_reply(reply, |(), reply| {
                inodes.remove(&path);
                reply.ok();
            });
        });
    }

    #[instrument(name = "FuserAdapter::rename", skip(self, _req, _flags, reply))]
    fn rename(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: fuser::ReplyEmpty,
    ) {
        let paths = self
            .child_path(parent, name)
            .and_then(|from| Ok((from, self.child_path(newparent, newname)?)));
        let (from, to) = match paths {
            Ok(paths) => paths,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        let inodes = Arc::clone(&self.inodes);
        self.runtime.spawn(async move {
            fs.rename(&from, &to).await.fuse_reply(reply, |(), reply| {
                inodes.rename(&from, &to);
                reply.ok();
            });
        });
    }

    #[instrument(name = "FuserAdapter::open", skip(self, _req, _flags, reply))]
    fn open(&mut self, _req: &fuser::Request<'_>, ino: u64, _flags: i32, reply: fuser::ReplyOpen) {
        let path = match self.path(ino) {
            Ok(path) => path,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn(async move {
            fs.open(&path).await.fuse_reply(reply, |(), reply| {
                reply.opened(0, 0);
            });
        });
    }

    #[instrument(
        name = "FuserAdapter::read",
        skip(self, _req, _fh, _flags, _lock_owner, reply)
    )]
    fn read(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        let path = match self.path(ino) {
            Ok(path) => path,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn(async move {
            let mut buf = vec![0; size as usize];
            fs.read(&path, &mut buf, offset.cast_unsigned())
                .await
                .fuse_reply(reply, |n, reply| {
                    debug!(read_bytes = n, "replying...");
                    reply.data(&buf[..n]);
                });
        });
    }

    #[instrument(
        name = "FuserAdapter::write",
        skip(self, _req, _fh, data, _write_flags, _flags, _lock_owner, reply),
        fields(len = data.len())
    )]
    fn write(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyWrite,
    ) {
        let path = match self.path(ino) {
            Ok(path) => path,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        let data = data.to_vec();
        self.runtime.spawn(async move {
            fs.write(&path, &data, offset.cast_unsigned())
                .await
                .fuse_reply(reply, |n, reply| {
                    #[expect(
                        clippy::cast_possible_truncation,
                        reason = "fuser never hands out more than u32::MAX bytes per write"
                    )]
                    reply.written(n as u32);
                });
        });
    }

    #[instrument(name = "FuserAdapter::flush", skip(self, _req, _fh, _lock_owner, reply))]
    fn flush(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: fuser::ReplyEmpty,
    ) {
        self.flush_path(ino, reply);
    }

    #[instrument(
        name = "FuserAdapter::release",
        skip(self, _req, _fh, _flags, _lock_owner, _flush, reply)
    )]
    fn release(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        self.flush_path(ino, reply);
    }

    #[instrument(name = "FuserAdapter::fsync", skip(self, _req, _fh, _datasync, reply))]
    fn fsync(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        _datasync: bool,
        reply: fuser::ReplyEmpty,
    ) {
        self.flush_path(ino, reply);
    }

    #[instrument(name = "FuserAdapter::opendir", skip(self, _req, _flags, reply))]
    fn opendir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _flags: i32,
        reply: fuser::ReplyOpen,
    ) {
        let path = match self.path(ino) {
            Ok(path) => path,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn(async move {
            fs.opendir(&path).await.fuse_reply(reply, |(), reply| {
                reply.opened(0, 0);
            });
        });
    }

    #[instrument(name = "FuserAdapter::readdir", skip(self, _req, _fh, offset, reply))]
    fn readdir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        reply: fuser::ReplyDirectory,
    ) {
        let path = match self.path(ino) {
            Ok(path) => path,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        let inodes = Arc::clone(&self.inodes);
        self.runtime.spawn(async move {
            fs.readdir(&path).await.fuse_reply(reply, |children, mut reply| {
                let parent_ino = path
                    .rsplit_once('/')
                    .map(|(parent, _)| if parent.is_empty() { "/" } else { parent })
                    .and_then(|parent| inodes.ino(parent))
                    .unwrap_or(ROOT_INO);
                let dots = [
                    (ino, fuser::FileType::Directory, ".".to_owned()),
                    (parent_ino, fuser::FileType::Directory, "..".to_owned()),
                ];
                let entries = dots.into_iter().chain(children.into_iter().map(|child| {
                    let child_ino = inodes.ino_or_insert(&join(&path, &child.name));
                    (child_ino, kind_to_fuser(child.kind), child.name)
                }));

                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "fuser offset is i64 but always non-negative"
                )]
                for (i, (entry_ino, kind, name)) in
                    entries.enumerate().skip(offset.cast_unsigned() as usize)
                {
                    let Ok(idx): Result<i64, _> = (i + 1).try_into() else {
                        error!("Directory entry index {} too large for fuser", i + 1);
                        reply.error(libc::EIO);
                        return;
                    };
                    debug!(?name, ino = entry_ino, "adding entry to reply...");
                    if reply.add(entry_ino, idx, kind, &name) {
                        debug!("buffer full for now, stopping readdir");
                        break;
                    }
                }

                debug!("finalizing reply...");
                reply.ok();
            });
        });
    }

    #[instrument(name = "FuserAdapter::statfs", skip(self, _req, _ino, reply))]
    fn statfs(&mut self, _req: &fuser::Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn(async move {
            fs.statfs().await.fuse_reply(reply, |stats, reply| {
                debug!(?stats, "replying...");
                reply.statfs(
                    stats.total_blocks,
                    stats.free_blocks,
                    stats.available_blocks,
                    stats.total_inodes,
                    stats.free_inodes,
                    stats.block_size,
                    stats.max_filename_length,
                    stats.block_size,
                );
            });
        });
    }

    #[instrument(name = "FuserAdapter::create", skip(self, _req, _mode, _umask, _flags, reply))]
    fn create(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        let inodes = Arc::clone(&self.inodes);
        self.runtime.spawn(async move {
            let result = async {
                fs.create(&path).await?;
                fs.getattr(&path).await
            }
            .await;
            result.fuse_reply(reply, |stat, reply| {
                let attr = stat_to_fuser(inodes.lookup(&path), &stat);
                reply.created(&Self::TTL, &attr, 0, 0, 0);
            });
        });
    }
}

impl FuserAdapter {
    fn flush_path(&self, ino: InodeAddr, reply: fuser::ReplyEmpty) {
        let path = match self.path(ino) {
            Ok(path) => path,
            Err(e) => return reply_error(reply, &e),
        };
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn(async move {
            fs.flush(&path).await.fuse_reply(reply, |(), reply| reply.ok());
        });
    }
}
