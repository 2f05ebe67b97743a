//! Mutable file system commands (`files/*`).

use bytes::Bytes;
use futures::TryStream;
use reqwest::multipart::{Form, Part};

use crate::client::{ByteStream, KuboClient};
use crate::error::KuboError;
use crate::models::{FilesEntry, FilesLs, FilesStat};

/// Parameters of `files/write`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteParams {
    /// Byte offset to start writing at.
    pub offset: u64,
    /// Maximum number of bytes to write.
    pub count: Option<u64>,
    /// Create the file if it does not exist.
    pub create: bool,
    /// Truncate the file before writing.
    pub truncate: bool,
    /// Create missing parent directories.
    pub parents: bool,
    /// Flush the change to the repository right away.
    pub flush: bool,
}

impl WriteParams {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("offset", self.offset.to_string()),
            ("create", self.create.to_string()),
            ("truncate", self.truncate.to_string()),
            ("parents", self.parents.to_string()),
            ("flush", self.flush.to_string()),
        ];
        if let Some(count) = self.count {
            query.push(("count", count.to_string()));
        }
        query
    }
}

/// Commands on the mutable file system.
pub struct FilesResource<'c> {
    client: &'c KuboClient,
}

impl<'c> FilesResource<'c> {
    pub(crate) fn new(client: &'c KuboClient) -> Self {
        Self { client }
    }

    /// Streams the contents of `path`, starting at `offset`, at most `count` bytes.
    pub async fn read(
        &self,
        path: &str,
        offset: u64,
        count: Option<u64>,
    ) -> Result<ByteStream, KuboError> {
        let mut query = vec![("arg", path.to_owned()), ("offset", offset.to_string())];
        if let Some(count) = count {
            query.push(("count", count.to_string()));
        }
        let request = self.client.post("files/read").query(&query);
        self.client.stream(request).await
    }

    /// Writes `data` to `path`.
    pub async fn write(
        &self,
        path: &str,
        data: Bytes,
        params: &WriteParams,
    ) -> Result<(), KuboError> {
        self.write_body(path, reqwest::Body::from(data), params).await
    }

    /// Writes every chunk of `body` to `path`, in order.
    pub async fn write_stream<S>(
        &self,
        path: &str,
        body: S,
        params: &WriteParams,
    ) -> Result<(), KuboError>
    where
        S: TryStream + Send + 'static,
        S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        Bytes: From<S::Ok>,
    {
        self.write_body(path, reqwest::Body::wrap_stream(body), params)
            .await
    }

    async fn write_body(
        &self,
        path: &str,
        body: reqwest::Body,
        params: &WriteParams,
    ) -> Result<(), KuboError> {
        let form = Form::new().part("file", Part::stream(body).file_name("data"));
        let mut query = params.query();
        query.push(("arg", path.to_owned()));
        let request = self
            .client
            .post("files/write")
            .query(&query)
            .multipart(form);
        self.client.empty(request).await
    }

    /// Lists `path` with sizes.
    pub async fn ls(&self, path: &str) -> Result<Vec<FilesEntry>, KuboError> {
        let request = self
            .client
            .post("files/ls")
            .query(&[("arg", path), ("long", "true"), ("U", "true")]);
        let ls: FilesLs = self.client.json(request).await?;
        Ok(ls.entries)
    }

    /// Stats `path`. Works for any IPFS path, not only the mutable file system.
    pub async fn stat(&self, path: &str) -> Result<FilesStat, KuboError> {
        let request = self.client.post("files/stat").query(&[("arg", path)]);
        self.client.json(request).await
    }

    /// Creates a directory.
    pub async fn mkdir(&self, path: &str, parents: bool) -> Result<(), KuboError> {
        let request = self
            .client
            .post("files/mkdir")
            .query(&[("arg", path), ("parents", bool_str(parents))]);
        self.client.empty(request).await
    }

    /// Removes a file or, with `recursive`, a directory.
    pub async fn rm(&self, path: &str, recursive: bool) -> Result<(), KuboError> {
        let request = self
            .client
            .post("files/rm")
            .query(&[("arg", path), ("recursive", bool_str(recursive))]);
        self.client.empty(request).await
    }

    /// Moves `from` to `to`.
    pub async fn mv(&self, from: &str, to: &str) -> Result<(), KuboError> {
        let request = self
            .client
            .post("files/mv")
            .query(&[("arg", from), ("arg", to)]);
        self.client.empty(request).await
    }

    /// Flushes `path` to the repository.
    pub async fn flush(&self, path: &str) -> Result<(), KuboError> {
        let request = self.client.post("files/flush").query(&[("arg", path)]);
        self.client.empty(request).await
    }
}

fn bool_str(b: bool) -> &'static str {
    if b { "true" } else { "false" }
}
