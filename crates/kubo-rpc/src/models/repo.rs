//! Repository models.

use serde::Deserialize;

use super::saturating_u64;

/// Response of `repo/stat`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RepoStat {
    /// Bytes used by the repository.
    #[serde(deserialize_with = "saturating_u64")]
    pub repo_size: u64,
    /// Configured maximum size in bytes.
    #[serde(default, deserialize_with = "saturating_u64")]
    pub storage_max: u64,
    /// Number of stored objects.
    #[serde(default, deserialize_with = "saturating_u64")]
    pub num_objects: u64,
    /// Filesystem path of the repository.
    #[serde(default)]
    pub repo_path: String,
    /// Repository format version.
    #[serde(default)]
    pub version: String,
}
