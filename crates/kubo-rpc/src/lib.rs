//! Async client for the Kubo (go-ipfs) HTTP RPC API.
//!
//! Covers the commands a filesystem needs: the mutable file system (`files/*`), raw unixfs
//! access (`cat`, `ls`) and repository statistics (`repo/stat`).

mod client;
pub mod error;
pub mod models;
mod resources;

pub use client::{ByteStream, ClientBuilder, DEFAULT_API_URL, KuboClient};
pub use error::KuboError;
pub use http::StatusCode;
pub use resources::{FilesResource, RepoResource, UnixfsResource, WriteParams};
