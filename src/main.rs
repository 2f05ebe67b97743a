//! Mount IPFS content or the IPFS mutable file system as a local filesystem.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ipfs_mount::fs::MountKind;
use tracing::{debug, error};

mod app_config;
mod daemon;
mod kubo;
mod term;
mod trc;

use crate::app_config::Config;
use crate::trc::Trc;

#[derive(Parser)]
#[command(
    version,
    about = "Mount IPFS or the IPFS mutable file system through FUSE."
)]
struct Args {
    #[arg(short, long, value_parser, help = "Optional path to a config TOML.")]
    config_path: Option<PathBuf>,

    /// Comma separated mount options, e.g. `allow_other,display_folder=true`.
    #[arg(short = 'o', global = true, value_delimiter = ',')]
    options: Vec<String>,

    /// Base URL of the Kubo RPC API.
    #[arg(long, global = true, env = "IPFS_MOUNT_API")]
    api: Option<String>,

    /// Run in the background.
    #[arg(short, long, global = true)]
    daemonize: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Args)]
struct Target {
    /// Where to mount. Defaults to /ipfs or /mfs.
    #[arg(conflicts_with = "target_flag")]
    target: Option<PathBuf>,

    #[arg(long = "target", value_name = "DIR")]
    target_flag: Option<PathBuf>,
}

impl Target {
    fn into_path(self) -> Option<PathBuf> {
        self.target.or(self.target_flag)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Mount immutable /ipfs content, read-only.
    Ipfs(Target),

    /// Mount the mutable file system.
    Mfs(Target),
}

impl Args {
    /// Layers command line flags over the loaded configuration.
    fn apply(self, mut config: Config) -> (Config, bool) {
        if let Some(command) = self.command {
            let (kind, target) = match command {
                Command::Ipfs(target) => (MountKind::Ipfs, target),
                Command::Mfs(target) => (MountKind::Mfs, target),
            };
            config.kind = kind;
            if let Some(path) = target.into_path() {
                config.mount_point = Some(path);
            }
        }
        if !self.options.is_empty() {
            config.fuse_options = self.options;
        }
        if let Some(api) = self.api {
            config.api.url = api;
        }
        (config, self.daemonize)
    }
}

fn init_tracing(trc: Trc) {
    if let Err(e) = trc.init() {
        eprintln!(
            "Failed to initialize logging. Without logging, we can't provide any useful error \
             messages, so we have to exit: {e}"
        );
        std::process::exit(1);
    }
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    // Errors use eprintln since tracing isn't initialized yet.
    let loaded = Config::load(args.config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });
    let (config, daemonize) = args.apply(loaded);
    if let Err(error_messages) = config.validate() {
        eprintln!("Configuration is invalid.");
        for msg in &error_messages {
            eprintln!(" - {msg}");
        }
        std::process::exit(1);
    }

    if !daemonize {
        init_tracing(Trc::default());
        if let Err(e) = daemon::spawn(config) {
            error!("Daemon failed: {e}");
            std::process::exit(1);
        }
        return;
    }

    for path in [&config.daemon.pid_file, &config.daemon.log_file] {
        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            eprintln!("Failed to create {}: {e}", parent.display());
            std::process::exit(1);
        }
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.daemon.log_file)
        .and_then(|file| Ok((file.try_clone()?, file)));
    let (stdout, stderr) = match log_file {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Failed to open log file: {e}");
            std::process::exit(1);
        }
    };

    let daemonized = daemonize::Daemonize::new()
        .pid_file(&config.daemon.pid_file)
        .chown_pid_file(true)
        .user(config.uid)
        .group(config.gid)
        .stdout(stdout)
        .stderr(stderr)
        .start();

    if let Err(e) = daemonized {
        eprintln!("Failed to spawn the daemon: {e}");
        std::process::exit(1);
    }

    init_tracing(Trc::default().daemon());
    debug!(config = ?config, "Daemon started.");
    if let Err(e) = daemon::spawn(config) {
        error!("Daemon failed: {e}");
        std::process::exit(1);
    }
}
