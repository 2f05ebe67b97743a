//! Filesystem-facing types and the operation handlers built on the I/O core.

/// FUSE adapter: maps [`fuser::Filesystem`] callbacks onto [`ops::IpfsFs`].
pub mod fuser;
/// Inode number to path mapping.
pub mod inode_table;
/// Operation handlers.
pub mod ops;
/// Mount option parsing.
pub mod options;

use std::time::SystemTime;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::backend::ObjectKind;

/// Type representing an inode identifier.
pub type InodeAddr = u64;

/// The root path of every mount.
pub const ROOT: &str = "/";

/// Which part of the store a mount exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MountKind {
    /// Immutable, content-addressed objects under `/ipfs`.
    #[default]
    Ipfs,
    /// The mutable file system.
    Mfs,
}

impl MountKind {
    /// Whether every mutating operation is refused.
    #[must_use]
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::Ipfs)
    }

    /// The store path for a mount path.
    #[must_use]
    pub fn backend_path(self, path: &str) -> String {
        match self {
            Self::Ipfs => format!("/ipfs{path}"),
            Self::Mfs => path.to_owned(),
        }
    }

    /// The store path to list for a mount directory.
    ///
    /// `None` for the root of an `Ipfs` mount: `/ipfs` has no listing, its entries are only
    /// reachable by name.
    #[must_use]
    pub fn listing_path(self, path: &str) -> Option<String> {
        match self {
            Self::Ipfs if path == ROOT => None,
            _ => Some(self.backend_path(path)),
        }
    }

    /// Where the mount goes when no target is given.
    #[must_use]
    pub fn default_target(self) -> &'static str {
        match self {
            Self::Ipfs => "/ipfs",
            Self::Mfs => "/mfs",
        }
    }

    /// Mount options used when none, or `defaults`, are given.
    #[must_use]
    pub fn default_options(self) -> &'static [&'static str] {
        match self {
            Self::Ipfs => &["auto_cache", "auto_unmount"],
            Self::Mfs => &["auto_unmount", "big_writes"],
        }
    }

    /// Whether the mount root is listable by default.
    #[must_use]
    pub fn default_display_folder(self) -> bool {
        matches!(self, Self::Mfs)
    }

    /// Permission bits for an object of `kind` on this mount.
    #[must_use]
    pub fn permissions(self, kind: ObjectKind) -> InodePerms {
        match (self, kind) {
            (Self::Ipfs, ObjectKind::Directory) => InodePerms::ALL_EXECUTE,
            (Self::Ipfs, ObjectKind::File) => InodePerms::ALL_READ,
            (Self::Mfs, ObjectKind::Directory) => {
                InodePerms::OWNER_RWX | InodePerms::ALL_READ | InodePerms::ALL_EXECUTE
            }
            (Self::Mfs, ObjectKind::File) => {
                InodePerms::OWNER_READ | InodePerms::OWNER_WRITE | InodePerms::ALL_READ
            }
            (_, ObjectKind::Unknown) => InodePerms::empty(),
        }
    }
}

impl std::fmt::Display for MountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ipfs => "ipfs",
            Self::Mfs => "mfs",
        })
    }
}

bitflags! {
    /// Permission bits for an inode, similar to Unix file permissions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InodePerms: u16 {
        /// Other: execute permission.
        const OTHER_EXECUTE = 1 << 0;
        /// Other: write permission.
        const OTHER_WRITE   = 1 << 1;
        /// Other: read permission.
        const OTHER_READ    = 1 << 2;

        /// Group: execute permission.
        const GROUP_EXECUTE = 1 << 3;
        /// Group: write permission.
        const GROUP_WRITE   = 1 << 4;
        /// Group: read permission.
        const GROUP_READ    = 1 << 5;

        /// Owner: execute permission.
        const OWNER_EXECUTE = 1 << 6;
        /// Owner: write permission.
        const OWNER_WRITE   = 1 << 7;
        /// Owner: read permission.
        const OWNER_READ    = 1 << 8;

        /// Owner: read, write, and execute.
        const OWNER_RWX = Self::OWNER_READ.bits()
            | Self::OWNER_WRITE.bits()
            | Self::OWNER_EXECUTE.bits();
        /// Read for owner, group and other.
        const ALL_READ = Self::OWNER_READ.bits()
            | Self::GROUP_READ.bits()
            | Self::OTHER_READ.bits();
        /// Execute for owner, group and other.
        const ALL_EXECUTE = Self::OWNER_EXECUTE.bits()
            | Self::GROUP_EXECUTE.bits()
            | Self::OTHER_EXECUTE.bits();
    }
}

/// Attributes reported for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Object kind. [`ObjectKind::Unknown`] is reported with empty permissions.
    pub kind: ObjectKind,
    /// Permission bits.
    pub perm: InodePerms,
    /// Size in bytes.
    pub size: u64,
    /// Number of 512-byte blocks.
    pub blocks: u64,
    /// Preferred I/O size. The kernel sizes writes after it.
    pub block_size: u32,
    /// Owner.
    pub uid: u32,
    /// Group.
    pub gid: u32,
    /// Access time.
    pub atime: SystemTime,
    /// Modification time.
    pub mtime: SystemTime,
    /// Status change time.
    pub ctime: SystemTime,
}

impl FileStat {
    /// Full `st_mode`: file type bits plus permissions. Zero for an unknown kind.
    #[must_use]
    pub fn mode(&self) -> u32 {
        let format = match self.kind {
            ObjectKind::Directory => u32::from(libc::S_IFDIR),
            ObjectKind::File => u32::from(libc::S_IFREG),
            ObjectKind::Unknown => return 0,
        };
        format | u32::from(self.perm.bits())
    }
}

/// A directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name.
    pub name: String,
    /// Object kind.
    pub kind: ObjectKind,
    /// Size in bytes.
    pub size: u64,
}

/// Filesystem statistics.
///
/// Block-related sizes are in units of `block_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FsStats {
    /// Filesystem block size (bytes).
    pub block_size: u32,
    /// Total number of data blocks.
    pub total_blocks: u64,
    /// Number of free blocks.
    pub free_blocks: u64,
    /// Number of blocks available to unprivileged users.
    pub available_blocks: u64,
    /// Total number of file nodes (inodes).
    pub total_inodes: u64,
    /// Number of free file nodes.
    pub free_inodes: u64,
    /// Maximum filename length (bytes).
    pub max_filename_length: u32,
}

/// Joins a directory path and an entry name.
#[must_use]
pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Whether `path` equals `ancestor` or lies below it.
#[must_use]
pub fn is_within(path: &str, ancestor: &str) -> bool {
    ancestor == ROOT
        || path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}
