use std::sync::Arc;

use ipfs_mount::fs::ops::IpfsFs;
use ipfs_mount::fs::options::{FuseOptionError, parse_fuse_options};
use kubo_rpc::KuboClient;
use thiserror::Error;
use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::app_config;
use crate::kubo::KuboBackend;
use tracing::{debug, error, info, warn};

/// Failure to bring up or run the mount.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid mount options: {0}")]
    Options(#[from] FuseOptionError),
}

mod managed_fuse {
    //! fuser will not attempt to fuse unmount the filesystem when the `BackgroundSession` is
    //! dropped, and will only do a regular unmount, but we want to be aggressive and force an
    //! unmount if possible.
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use fuser::{BackgroundSession, MountOption};
    use ipfs_mount::fs::fuser::FuserAdapter;
    use ipfs_mount::fs::ops::IpfsFs;
    use nix::errno::Errno;

    use super::{debug, error};

    pub struct FuseCoreScope {
        _session: BackgroundSession,
    }

    pub struct ManagedFuse {
        mount_point: PathBuf,
    }

    impl ManagedFuse {
        pub fn new(mount_point: &Path) -> Self {
            Self {
                mount_point: mount_point.to_path_buf(),
            }
        }

        pub fn spawn(
            &self,
            fs: Arc<IpfsFs>,
            options: &[MountOption],
            handle: tokio::runtime::Handle,
        ) -> Result<FuseCoreScope, std::io::Error> {
            let adapter = FuserAdapter::new(fs, handle);
            Ok(FuseCoreScope {
                _session: fuser::spawn_mount2(adapter, &self.mount_point, options)?,
            })
        }
    }

    impl Drop for ManagedFuse {
        fn drop(&mut self) {
            const UMOUNT_ATTEMPT_COUNT: usize = 10;
            const UMOUNT_ATTEMPT_DELAY: Duration = Duration::from_millis(10);

            debug!(mount_point = ?self.mount_point, "Confirming unmount of FUSE filesystem...");

            for attempt in 1..=UMOUNT_ATTEMPT_COUNT {
                let result = {
                    #[cfg(target_os = "macos")]
                    {
                        nix::mount::unmount(&self.mount_point, nix::mount::MntFlags::MNT_FORCE)
                    }

                    #[cfg(target_os = "linux")]
                    {
                        nix::mount::umount2(&self.mount_point, nix::mount::MntFlags::MNT_DETACH)
                    }
                };

                match result {
                    Ok(()) => {
                        debug!(attempt, "Unmounted FUSE filesystem.");
                        break;
                    }
                    Err(Errno::EBUSY) => {
                        debug!(attempt, "FUSE filesystem still busy.");
                        std::thread::sleep(UMOUNT_ATTEMPT_DELAY);
                    }
                    Err(Errno::EINVAL | Errno::ENOENT) => {
                        debug!(attempt, "FUSE filesystem already unmounted.");
                        break;
                    }
                    Err(e) => {
                        error!(attempt, "Failed to unmount FUSE filesystem: {e}");
                        break;
                    }
                }
            }
        }
    }
}

/// Prepares the mount point directory.
///
/// - If the directory exists and is non-empty, returns an error.
/// - If the directory does not exist, creates it (including parents) and logs an info message.
/// - If the directory exists and is empty, does nothing.
async fn prepare_mount_point(mount_point: &std::path::Path) -> Result<(), std::io::Error> {
    match tokio::fs::read_dir(mount_point).await {
        Ok(mut entries) => {
            if entries.next_entry().await?.is_some() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!(
                        "Mount point '{}' already exists and is not empty.",
                        mount_point.display()
                    ),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(mount_point).await?;
            info!(path = %mount_point.display(), "Created mount point directory.");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Cancels `shutdown` on the first of Ctrl+C, SIGTERM or SIGHUP.
async fn cancel_on_signal(shutdown: CancellationToken) -> Result<(), std::io::Error> {
    use tokio::signal;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut sighup = signal::unix::signal(signal::unix::SignalKind::hangup())?;
    select! {
        _ = signal::ctrl_c() => {
            debug!("Received Ctrl+C signal, shutting down...");
        },
        _ = sigterm.recv() => {
            debug!("Received termination signal, shutting down...");
        },
        _ = sighup.recv() => {
            debug!("Received hangup signal, shutting down...");
        },
        () = shutdown.cancelled() => return Ok(()),
    }
    shutdown.cancel();
    Ok(())
}

fn build_client(config: &app_config::Config) -> KuboClient {
    let mut builder = KuboClient::builder(config.api.url.as_str());
    if let Some(auth) = &config.api.auth {
        builder = builder.auth(auth.clone());
    }
    builder.build()
}

/// Mounts the filesystem and serves it until `shutdown` is cancelled.
///
/// Pending writes are flushed before the session is torn down.
pub async fn run(
    config: app_config::Config,
    handle: tokio::runtime::Handle,
    shutdown: CancellationToken,
) -> Result<(), DaemonError> {
    let kind = config.kind;
    let mut mount_options = parse_fuse_options(&config.fuse_options, kind)?;
    mount_options
        .fuse
        .push(fuser::MountOption::FSName(format!("ipfs-mount-{kind}")));
    if kind.is_read_only() && !mount_options.fuse.contains(&fuser::MountOption::RO) {
        mount_options.fuse.push(fuser::MountOption::RO);
    }

    let display_folder = config
        .display_folder
        .or(mount_options.display_folder)
        .unwrap_or_else(|| kind.default_display_folder());

    let backend = Arc::new(KuboBackend::new(build_client(&config)));
    let fs = Arc::new(IpfsFs::new(backend, config.fs_options(display_folder)));

    let mount_point = config.mount_point();
    prepare_mount_point(&mount_point).await?;

    info!(
        %kind,
        api = %config.api.url,
        "Mounting filesystem at {}.",
        mount_point.display()
    );
    debug!(options = ?mount_options.fuse, "FUSE options.");

    let fuse = managed_fuse::ManagedFuse::new(&mount_point);
    {
        let _session = fuse.spawn(Arc::clone(&fs), &mount_options.fuse, handle)?;
        info!("ipfs-mount is running. Press Ctrl+C to stop.");

        shutdown.cancelled().await;

        info!("Flushing pending writes...");
        if let Err(e) = fs.flush_all().await {
            warn!("Some writes could not be flushed: {e}");
        }
    }
    Ok(())
}

pub fn spawn(config: app_config::Config) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let shutdown = CancellationToken::new();
    let signals = runtime.spawn(cancel_on_signal(shutdown.clone()));

    let result = runtime.block_on(run(config, runtime.handle().clone(), shutdown.clone()));
    shutdown.cancel();

    match runtime.block_on(signals) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Signal handling failed: {e}"),
        Err(e) => error!("Signal task failed: {e}"),
    }
    result
}
