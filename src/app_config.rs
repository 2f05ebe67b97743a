//! Module for application configuration settings.
//!
//! User configurations may be specified in a configuration file. Command line flags override
//! whatever the file says.

use bytesize::ByteSize;
use ipfs_mount::fs::MountKind;
use ipfs_mount::fs::ops::{DEFAULT_BLOCK_SIZE, FsOptions};
use ipfs_mount::read::ReadStrategy;
use ipfs_mount::write::{DEFAULT_CHUNK_TARGET_SIZE, WriteConfig, WriteStrategy};
use secrecy::SecretString;
use thiserror::Error;
use tracing::debug;

use std::path::{Path, PathBuf};

use serde::Deserialize;

fn runtime_dir() -> Option<PathBuf> {
    if let Some(path) = dirs::runtime_dir() {
        return Some(path.join("ipfs-mount"));
    }

    dirs::home_dir().map(|path| path.join(".local").join("share").join("ipfs-mount"))
}

fn default_pid_file() -> PathBuf {
    runtime_dir().map_or_else(
        || PathBuf::from("/var/run/ipfs-mount.pid"),
        |rd| rd.join("ipfs-mount.pid"),
    )
}

fn default_log_file() -> PathBuf {
    runtime_dir().map_or_else(
        || PathBuf::from("/tmp/ipfs-mount.log"),
        |rd| rd.join("ipfs-mount.log"),
    )
}

fn current_uid() -> u32 {
    nix::unistd::Uid::current().as_raw()
}

fn current_gid() -> u32 {
    nix::unistd::Gid::current().as_raw()
}

fn default_api_url() -> String {
    kubo_rpc::DEFAULT_API_URL.to_owned()
}

/// Where the Kubo daemon listens.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Base URL of the RPC API.
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Sent verbatim as the `Authorization` header when set.
    pub auth: Option<SecretString>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            auth: None,
        }
    }
}

fn default_chunk_target_size() -> ByteSize {
    ByteSize::b(DEFAULT_CHUNK_TARGET_SIZE as u64)
}

fn default_block_size() -> ByteSize {
    ByteSize::b(u64::from(DEFAULT_BLOCK_SIZE))
}

/// Read and write tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IoConfig {
    #[serde(default)]
    pub read_strategy: ReadStrategy,

    #[serde(default)]
    pub write_strategy: WriteStrategy,

    /// Size at which coalesced writes are committed.
    #[serde(default = "default_chunk_target_size")]
    pub chunk_target_size: ByteSize,

    /// Preferred I/O size reported to the kernel.
    #[serde(default = "default_block_size")]
    pub block_size: ByteSize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            read_strategy: ReadStrategy::default(),
            write_strategy: WriteStrategy::default(),
            chunk_target_size: default_chunk_target_size(),
            block_size: default_block_size(),
        }
    }
}

/// Bounds on the access-time cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AttrCacheConfig {
    /// Maximum number of remembered paths. Unbounded when absent.
    pub max_entries: Option<u64>,
}

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DaemonConfig {
    /// The path to the PID file for the daemon.
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Where a daemonized process writes its logs.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: default_pid_file(),
            log_file: default_log_file(),
        }
    }
}

/// Application configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// What to mount.
    #[serde(default)]
    pub kind: MountKind,

    /// The mount point. Falls back to `/ipfs` or `/mfs` depending on [`Config::kind`].
    pub mount_point: Option<PathBuf>,

    /// Comma separated FUSE options, as given to `-o`. Empty means the defaults for the kind.
    #[serde(default)]
    pub fuse_options: Vec<String>,

    /// Overrides whether the mount root is shown as a directory.
    pub display_folder: Option<bool>,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub io: IoConfig,

    #[serde(default)]
    pub attr_cache: AttrCacheConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    /// The user to mount the filesystem as. If not specified, runs as the current user.
    #[serde(default = "current_uid")]
    pub uid: u32,

    /// The group to mount the filesystem as. If not specified, runs as the current group.
    #[serde(default = "current_gid")]
    pub gid: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kind: MountKind::default(),
            mount_point: None,
            fuse_options: Vec::new(),
            display_folder: None,
            api: ApiConfig::default(),
            io: IoConfig::default(),
            attr_cache: AttrCacheConfig::default(),
            daemon: DaemonConfig::default(),
            uid: current_uid(),
            gid: current_gid(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Config {
    /// Validate the correctness of the configuration.
    ///
    /// Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.daemon.pid_file.parent().is_none() {
            errors.push(format!(
                "PID file path '{}' has no parent directory.",
                self.daemon.pid_file.display()
            ));
        }

        if !(self.api.url.starts_with("http://") || self.api.url.starts_with("https://")) {
            errors.push(format!(
                "API url '{}' must start with http:// or https://.",
                self.api.url
            ));
        }

        if self.io.chunk_target_size.as_u64() == 0 {
            errors.push("io.chunk-target-size must be greater than zero.".to_owned());
        }
        if usize::try_from(self.io.chunk_target_size.as_u64()).is_err() {
            errors.push("io.chunk-target-size does not fit in memory.".to_owned());
        }

        match u32::try_from(self.io.block_size.as_u64()) {
            Ok(0) => errors.push("io.block-size must be greater than zero.".to_owned()),
            Ok(_) => {}
            Err(_) => errors.push("io.block-size must be below 4 GiB.".to_owned()),
        }

        if self.attr_cache.max_entries == Some(0) {
            errors.push("attr-cache.max-entries must be greater than zero.".to_owned());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The mount point, or the kind's default.
    pub fn mount_point(&self) -> PathBuf {
        self.mount_point
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.kind.default_target()))
    }

    /// Filesystem tunables. `display_folder` is the already resolved value.
    pub fn fs_options(&self, display_folder: bool) -> FsOptions {
        let chunk_target_size = usize::try_from(self.io.chunk_target_size.as_u64())
            .unwrap_or(DEFAULT_CHUNK_TARGET_SIZE);
        let block_size = u32::try_from(self.io.block_size.as_u64()).unwrap_or(DEFAULT_BLOCK_SIZE);

        FsOptions {
            display_folder,
            uid: self.uid,
            gid: self.gid,
            block_size,
            read_strategy: self.io.read_strategy,
            write: WriteConfig {
                strategy: self.io.write_strategy,
                chunk_target_size,
            },
            attr_cache_capacity: self.attr_cache.max_entries,
            ..FsOptions::for_kind(self.kind)
        }
    }

    /// Returns config file paths in descending priority order.
    /// On macOS, skips `dirs::config_dir()` (resolves to ~/Library/Application Support/).
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(not(target_os = "macos"))]
        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("ipfs-mount").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("ipfs-mount").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/ipfs-mount/config.toml"));

        paths
    }

    /// Loads config from a single TOML file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads configuration from the external path if given, else the first config file found.
    /// Falls back to the defaults when there is none.
    pub fn load(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let found = external_config_path
            .map(Path::to_path_buf)
            .or_else(|| Self::config_search_paths().into_iter().find(|p| p.exists()));

        let Some(path) = found else {
            debug!("No configuration file found, using defaults.");
            return Ok(Self::default());
        };
        Self::load_from_file(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.kind, MountKind::Ipfs);
        assert_eq!(config.mount_point(), PathBuf::from("/ipfs"));
        assert_eq!(config.api.url, kubo_rpc::DEFAULT_API_URL);
        assert_eq!(config.io, IoConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_every_section() {
        let config: Config = toml::from_str(
            r#"
            kind = "mfs"
            mount-point = "/mnt/mfs"
            fuse-options = ["allow_other", "display_folder=false"]

            [api]
            url = "http://10.0.0.2:5001"
            auth = "Basic dXNlcjpwYXNz"

            [io]
            read-strategy = "streaming"
            write-strategy = "write-through"
            chunk-target-size = "64 KiB"
            block-size = 4096

            [attr-cache]
            max-entries = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.kind, MountKind::Mfs);
        assert_eq!(config.mount_point(), PathBuf::from("/mnt/mfs"));
        assert_eq!(config.fuse_options.len(), 2);
        assert!(config.api.auth.is_some());

        let options = config.fs_options(true);
        assert_eq!(options.kind, MountKind::Mfs);
        assert_eq!(options.read_strategy, ReadStrategy::Streaming);
        assert_eq!(options.write.strategy, WriteStrategy::WriteThrough);
        assert_eq!(options.write.chunk_target_size, 64 * 1024);
        assert_eq!(options.block_size, 4096);
        assert_eq!(options.attr_cache_capacity, Some(1000));
    }

    #[test]
    fn validation_collects_every_error() {
        let mut config = Config::default();
        config.api.url = "localhost:5001".to_owned();
        config.io.chunk_target_size = ByteSize::b(0);
        config.io.block_size = ByteSize::b(0);
        config.attr_cache.max_entries = Some(0);

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
    }

    #[test]
    fn loads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "kind = \"mfs\"\n[daemon]\npid-file = \"/tmp/x.pid\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.kind, MountKind::Mfs);
        assert_eq!(config.daemon.pid_file, PathBuf::from("/tmp/x.pid"));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[io]\nwrite-strategy = \"lazy\"\n");
        assert!(result.is_err());
    }
}
