//! The Kubo client and its builder.

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt as _, TryStreamExt as _};
use reqwest::{RequestBuilder, Response};
use secrecy::{ExposeSecret as _, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::error::{ApiErrorBody, KuboError};
use crate::resources::{FilesResource, RepoResource, UnixfsResource};

/// Default RPC endpoint of a local daemon.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5001";

/// Streamed response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, KuboError>>;

/// Builder for [`KuboClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    url: String,
    auth: Option<SecretString>,
    http: Option<reqwest::Client>,
}

impl ClientBuilder {
    /// Sets the `Authorization` header sent with every call.
    #[must_use]
    pub fn auth(mut self, auth: SecretString) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Uses an existing [`reqwest::Client`].
    #[must_use]
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Builds the client.
    #[must_use]
    pub fn build(self) -> KuboClient {
        KuboClient {
            http: self.http.unwrap_or_default(),
            base: self.url.trim_end_matches('/').to_owned(),
            auth: self.auth,
        }
    }
}

/// Client for one Kubo daemon. Cheap to clone.
#[derive(Debug, Clone)]
pub struct KuboClient {
    http: reqwest::Client,
    base: String,
    auth: Option<SecretString>,
}

impl KuboClient {
    /// Starts building a client for the daemon at `url`, e.g. `http://127.0.0.1:5001`.
    pub fn builder(url: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            url: url.into(),
            auth: None,
            http: None,
        }
    }

    /// The daemon's base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Mutable file system commands.
    #[must_use]
    pub fn files(&self) -> FilesResource<'_> {
        FilesResource::new(self)
    }

    /// Raw unixfs commands.
    #[must_use]
    pub fn unixfs(&self) -> UnixfsResource<'_> {
        UnixfsResource::new(self)
    }

    /// Repository commands.
    #[must_use]
    pub fn repo(&self) -> RepoResource<'_> {
        RepoResource::new(self)
    }

    /// Starts a `POST /api/v0/{command}` request.
    pub(crate) fn post(&self, command: &str) -> RequestBuilder {
        let url = format!("{}/api/v0/{command}", self.base);
        trace!(%url, "building request");
        let builder = self.http.post(url);
        match &self.auth {
            Some(auth) => builder.header(http::header::AUTHORIZATION, auth.expose_secret()),
            None => builder,
        }
    }

    /// Sends a request and turns a non-success status into [`KuboError::Api`].
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response, KuboError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await?;
        let (message, code) = match serde_json::from_slice::<ApiErrorBody>(&body) {
            Ok(err) => (err.message, err.code),
            Err(_) => (String::from_utf8_lossy(&body).trim().to_owned(), 0),
        };
        debug!(%status, %message, code, "daemon returned error");
        Err(KuboError::Api {
            status,
            message,
            code,
        })
    }

    /// Sends a request and decodes a JSON response.
    pub(crate) async fn json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, KuboError> {
        let body = self.send(request).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Sends a request whose response body carries nothing of interest.
    pub(crate) async fn empty(&self, request: RequestBuilder) -> Result<(), KuboError> {
        let _ = self.send(request).await?.bytes().await?;
        Ok(())
    }

    /// Sends a request and streams the response body.
    pub(crate) async fn stream(&self, request: RequestBuilder) -> Result<ByteStream, KuboError> {
        let response = self.send(request).await?;
        Ok(response.bytes_stream().map_err(KuboError::from).boxed())
    }
}
