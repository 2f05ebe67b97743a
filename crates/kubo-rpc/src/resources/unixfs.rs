//! Raw unixfs commands (`cat`, `ls`).

use crate::client::{ByteStream, KuboClient};
use crate::error::KuboError;
use crate::models::{LsLink, LsResponse};

/// Read-only commands on immutable paths.
pub struct UnixfsResource<'c> {
    client: &'c KuboClient,
}

impl<'c> UnixfsResource<'c> {
    pub(crate) fn new(client: &'c KuboClient) -> Self {
        Self { client }
    }

    /// Streams the contents of `path`, starting at `offset`, at most `length` bytes.
    pub async fn cat(
        &self,
        path: &str,
        offset: u64,
        length: Option<u64>,
    ) -> Result<ByteStream, KuboError> {
        let mut query = vec![("arg", path.to_owned()), ("offset", offset.to_string())];
        if let Some(length) = length {
            query.push(("length", length.to_string()));
        }
        let request = self.client.post("cat").query(&query);
        self.client.stream(request).await
    }

    /// Lists the links of `path`.
    pub async fn ls(&self, path: &str) -> Result<Vec<LsLink>, KuboError> {
        let request = self
            .client
            .post("ls")
            .query(&[("arg", path), ("resolve-type", "true"), ("size", "true")]);
        let response: LsResponse = self.client.json(request).await?;
        Ok(response
            .objects
            .into_iter()
            .flat_map(|object| object.links)
            .collect())
    }
}
