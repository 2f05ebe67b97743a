#![allow(dead_code, missing_docs, clippy::unwrap_used)]

pub mod backend_mocks;

use std::sync::Arc;

use ipfs_mount::backend::Backend;
use ipfs_mount::fs::MountKind;
use ipfs_mount::fs::ops::{FsOptions, IpfsFs};
use ipfs_mount::write::{WriteConfig, WriteStrategy};

pub use backend_mocks::{Knobs, MemoryBackend, NOT_FOUND, WriteRecord};

/// Options for a test mount owned by uid/gid 1000.
pub fn fs_options(kind: MountKind) -> FsOptions {
    FsOptions {
        uid: 1000,
        gid: 1000,
        ..FsOptions::for_kind(kind)
    }
}

/// An `IpfsFs` over `backend` with the default strategies.
pub fn mount(kind: MountKind, backend: &Arc<MemoryBackend>) -> IpfsFs {
    let backend: Arc<dyn Backend> = Arc::clone(backend) as Arc<dyn Backend>;
    IpfsFs::new(backend, fs_options(kind))
}

/// A writable mount coalescing writes into `target`-byte chunks.
pub fn mfs_with_target(backend: &Arc<MemoryBackend>, target: usize) -> IpfsFs {
    let backend: Arc<dyn Backend> = Arc::clone(backend) as Arc<dyn Backend>;
    IpfsFs::new(
        backend,
        FsOptions {
            write: WriteConfig {
                strategy: WriteStrategy::Coalescing,
                chunk_target_size: target,
            },
            ..fs_options(MountKind::Mfs)
        },
    )
}

pub fn dyn_backend(backend: &Arc<MemoryBackend>) -> Arc<dyn Backend> {
    Arc::clone(backend) as Arc<dyn Backend>
}
