//! Mutable file system models.

use serde::{Deserialize, Deserializer};

use super::saturating_u64;

/// Response of `files/stat`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilesStat {
    /// Content identifier.
    pub hash: String,
    /// Size in bytes.
    #[serde(deserialize_with = "saturating_u64")]
    pub size: u64,
    /// Size including all linked blocks.
    #[serde(default, deserialize_with = "saturating_u64")]
    pub cumulative_size: u64,
    /// Number of child blocks.
    #[serde(default, deserialize_with = "saturating_u64")]
    pub blocks: u64,
    /// `"file"` or `"directory"`.
    #[serde(rename = "Type")]
    pub kind: String,
}

/// Entry type in a `files/ls` listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesEntryType {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// A type this client does not know.
    Other(i64),
}

impl<'de> Deserialize<'de> for FilesEntryType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match i64::deserialize(deserializer)? {
            0 => Self::File,
            1 => Self::Directory,
            other => Self::Other(other),
        })
    }
}

/// One entry of a `files/ls` listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilesEntry {
    /// Entry name.
    pub name: String,
    /// Entry type.
    #[serde(rename = "Type")]
    pub kind: FilesEntryType,
    /// Size in bytes. Only filled in long listings.
    #[serde(default, deserialize_with = "saturating_u64")]
    pub size: u64,
    /// Content identifier. Only filled in long listings.
    #[serde(default)]
    pub hash: String,
}

/// Response of `files/ls`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilesLs {
    /// Directory entries. The daemon sends `null` for an empty directory.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub entries: Vec<FilesEntry>,
}

fn null_as_empty<'de, D: Deserializer<'de>, T: Deserialize<'de>>(
    deserializer: D,
) -> Result<Vec<T>, D::Error> {
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
