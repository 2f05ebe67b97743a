//! [`Backend`] implementation over a Kubo daemon.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt as _, TryStreamExt as _};
use ipfs_mount::backend::{
    Backend, BackendError, ByteStream, LsEntry, MkdirOptions, ObjectKind, ObjectStat, RepoStat,
    RmOptions, WriteOptions,
};
use ipfs_mount::segment::Segment;
use kubo_rpc::models::{FilesEntryType, UnixfsType};
use kubo_rpc::{KuboClient, KuboError, WriteParams};
use tracing::{instrument, trace};

fn to_backend_error(err: KuboError) -> BackendError {
    match err {
        KuboError::Api { message, code, .. } => BackendError::Remote {
            message,
            code: Some(code),
        },
        other @ (KuboError::Http(_) | KuboError::Decode(_)) => {
            BackendError::Transport(Box::new(other))
        }
    }
}

/// Paths the mutable file system API cannot read or list.
fn is_immutable(path: &str) -> bool {
    ["/ipfs", "/ipns"].iter().any(|prefix| {
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

fn write_params(offset: u64, count: Option<u64>, options: WriteOptions) -> WriteParams {
    WriteParams {
        offset,
        count,
        create: options.create,
        truncate: options.truncate,
        parents: false,
        flush: false,
    }
}

/// Talks to one Kubo daemon.
///
/// Immutable paths (`/ipfs/…`, `/ipns/…`) are read with `cat` and listed with `ls`; everything
/// else goes through the mutable file system commands.
pub struct KuboBackend {
    client: KuboClient,
}

impl KuboBackend {
    pub fn new(client: KuboClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Backend for KuboBackend {
    #[instrument(name = "KuboBackend::read", skip(self))]
    async fn read(&self, path: &str, segment: Segment) -> Result<ByteStream, BackendError> {
        let stream = if is_immutable(path) {
            self.client
                .unixfs()
                .cat(path, segment.offset, Some(segment.length))
                .await
        } else {
            self.client
                .files()
                .read(path, segment.offset, Some(segment.length))
                .await
        }
        .map_err(to_backend_error)?;
        Ok(stream.map_err(to_backend_error).boxed())
    }

    #[instrument(name = "KuboBackend::write", skip(self, data), fields(len = data.len()))]
    async fn write(
        &self,
        path: &str,
        data: Bytes,
        segment: Segment,
        options: WriteOptions,
    ) -> Result<(), BackendError> {
        let params = write_params(segment.offset, Some(segment.length), options);
        self.client
            .files()
            .write(path, data, &params)
            .await
            .map_err(to_backend_error)
    }

    #[instrument(name = "KuboBackend::write_stream", skip(self, data))]
    async fn write_stream(
        &self,
        path: &str,
        offset: u64,
        data: ByteStream,
        options: WriteOptions,
    ) -> Result<(), BackendError> {
        let params = write_params(offset, None, options);
        self.client
            .files()
            .write_stream(path, data, &params)
            .await
            .map_err(to_backend_error)
    }

    #[instrument(name = "KuboBackend::ls", skip(self))]
    async fn ls(&self, path: &str) -> Result<Vec<LsEntry>, BackendError> {
        let entries = if is_immutable(path) {
            self.client
                .unixfs()
                .ls(path)
                .await
                .map_err(to_backend_error)?
                .into_iter()
                .map(|link| LsEntry {
                    name: link.name,
                    depth: 1,
                    kind: match link.kind {
                        UnixfsType::Directory => ObjectKind::Directory,
                        UnixfsType::File => ObjectKind::File,
                        UnixfsType::Other(_) => ObjectKind::Unknown,
                    },
                    size: link.size,
                })
                .collect()
        } else {
            self.client
                .files()
                .ls(path)
                .await
                .map_err(to_backend_error)?
                .into_iter()
                .map(|entry| LsEntry {
                    name: entry.name,
                    depth: 1,
                    kind: match entry.kind {
                        FilesEntryType::Directory => ObjectKind::Directory,
                        FilesEntryType::File => ObjectKind::File,
                        FilesEntryType::Other(_) => ObjectKind::Unknown,
                    },
                    size: entry.size,
                })
                .collect()
        };
        Ok(entries)
    }

    #[instrument(name = "KuboBackend::stat", skip(self))]
    async fn stat(&self, path: &str) -> Result<ObjectStat, BackendError> {
        let stat = self
            .client
            .files()
            .stat(path)
            .await
            .map_err(to_backend_error)?;
        trace!(?stat, "stat");
        let kind = match stat.kind.as_str() {
            "file" => ObjectKind::File,
            "directory" => ObjectKind::Directory,
            _ => ObjectKind::Unknown,
        };
        Ok(ObjectStat {
            kind,
            size: stat.size,
            blocks: stat.blocks,
        })
    }

    #[instrument(name = "KuboBackend::mkdir", skip(self))]
    async fn mkdir(&self, path: &str, options: MkdirOptions) -> Result<(), BackendError> {
        self.client
            .files()
            .mkdir(path, options.parents)
            .await
            .map_err(to_backend_error)
    }

    #[instrument(name = "KuboBackend::rm", skip(self))]
    async fn rm(&self, path: &str, options: RmOptions) -> Result<(), BackendError> {
        self.client
            .files()
            .rm(path, options.recursive)
            .await
            .map_err(to_backend_error)
    }

    #[instrument(name = "KuboBackend::mv", skip(self))]
    async fn mv(&self, from: &str, to: &str) -> Result<(), BackendError> {
        self.client
            .files()
            .mv(from, to)
            .await
            .map_err(to_backend_error)
    }

    #[instrument(name = "KuboBackend::flush", skip(self))]
    async fn flush(&self, path: &str) -> Result<(), BackendError> {
        self.client
            .files()
            .flush(path)
            .await
            .map_err(to_backend_error)
    }

    #[instrument(name = "KuboBackend::repo_stat", skip(self))]
    async fn repo_stat(&self) -> Result<RepoStat, BackendError> {
        let stat = self
            .client
            .repo()
            .stat()
            .await
            .map_err(to_backend_error)?;
        Ok(RepoStat {
            object_count: stat.num_objects,
            used_bytes: stat.repo_size,
            capacity_bytes: stat.storage_max,
        })
    }
}
