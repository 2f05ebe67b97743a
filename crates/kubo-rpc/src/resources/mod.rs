//! Command namespaces of the Kubo RPC API.

mod files;
mod repo;
mod unixfs;

pub use files::{FilesResource, WriteParams};
pub use repo::RepoResource;
pub use unixfs::UnixfsResource;
