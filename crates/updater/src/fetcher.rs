use crate::error::{Result, UpdaterError};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::{Client, StatusCode, Url};
use std::io::Read;
use std::net::IpAddr;

/// Abstraction over the server that publishes manifests and artefacts.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch the file stored under `name` at the source root. Missing files
    /// are reported as [`UpdaterError::NotFound`].
    async fn fetch(&self, name: &str) -> Result<Bytes>;
}

/// Builder for [`HttpManifestSource`].
#[derive(Default)]
pub struct HttpManifestSourceBuilder {
    base: Option<Url>,
    client: Option<Client>,
}

impl HttpManifestSourceBuilder {
    /// Set the base URL (e.g. `http://127.0.0.1:8080/`).
    pub fn base_url(mut self, url: Url) -> Self {
        self.base = Some(url);
        self
    }

    /// Provide a custom reqwest client instance.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the source.
    pub fn build(self) -> Result<HttpManifestSource> {
        let mut base = self
            .base
            .ok_or_else(|| UpdaterError::validation("manifest source needs a base URL"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = match self.client {
            Some(client) => client,
            // A local file server is never reached through a proxy.
            None if is_loopback(&base) => Client::builder().no_proxy().build()?,
            None => Client::new(),
        };

        Ok(HttpManifestSource { base, client })
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host_str() {
        Some(host) if host.eq_ignore_ascii_case("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

/// Fetches files over HTTP relative to a base URL.
#[derive(Clone, Debug)]
pub struct HttpManifestSource {
    base: Url,
    client: Client,
}

impl HttpManifestSource {
    /// Create a new builder.
    pub fn builder() -> HttpManifestSourceBuilder {
        HttpManifestSourceBuilder::default()
    }

    /// Source rooted at `base`, parsed from a string.
    pub fn from_base(base: &str) -> Result<Self> {
        let url = Url::parse(base)
            .map_err(|err| UpdaterError::validation(format!("invalid base URL {base:?}: {err}")))?;
        Self::builder().base_url(url).build()
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn file_url(&self, name: &str) -> Result<Url> {
        self.base
            .join(name.trim_start_matches('/'))
            .map_err(|err| UpdaterError::validation(format!("invalid file name {name:?}: {err}")))
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self, name: &str) -> Result<Bytes> {
        let url = self.file_url(name)?;
        tracing::debug!(target: "updater", %url, "fetching");
        let response = self.client.get(url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.bytes().await?),
            StatusCode::NOT_FOUND => Err(UpdaterError::NotFound(name.to_string())),
            status => Err(UpdaterError::HttpStatus {
                name: name.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

/// Decompress a gzip blob fetched as `name`.
pub(crate) fn gunzip(name: &str, bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoded = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut decoded)
        .map_err(|source| UpdaterError::Decompress {
            name: name.to_string(),
            source,
        })?;
    Ok(decoded)
}
