//! Models for `ls`.

use serde::{Deserialize, Deserializer};

use super::saturating_u64;

/// Unixfs node type as reported by `ls`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnixfsType {
    /// A directory (unixfs type 1).
    Directory,
    /// A file (unixfs type 2).
    File,
    /// Anything else: raw blocks, symlinks, HAMT shards.
    Other(i64),
}

impl<'de> Deserialize<'de> for UnixfsType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match i64::deserialize(deserializer)? {
            1 => Self::Directory,
            2 => Self::File,
            other => Self::Other(other),
        })
    }
}

/// A link out of a listed object.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LsLink {
    /// Link name.
    pub name: String,
    /// Target content identifier.
    pub hash: String,
    /// Target size in bytes.
    #[serde(default, deserialize_with = "saturating_u64")]
    pub size: u64,
    /// Target type.
    #[serde(rename = "Type")]
    pub kind: UnixfsType,
}

/// One listed object.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LsObject {
    /// The object's content identifier or path.
    pub hash: String,
    /// Links out of the object.
    #[serde(default)]
    pub links: Vec<LsLink>,
}

/// Response of `ls`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LsResponse {
    /// One entry per listed path.
    pub objects: Vec<LsObject>,
}
