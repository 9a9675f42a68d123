use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// Backing service the encrypted profiles are fetched from. Kept here as
/// deploy-time configuration so the fetch logic stays service-agnostic.
pub(crate) const BASE_URL: &str = "https://tunnel.deno.dev";
pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");

const VERSION_HEADER: &str = "x-version";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("remote answered with status {0}")]
    Status(reqwest::StatusCode),
}

/// The `{encrypt, iv}` document served for one identity. Consumed exactly
/// once by the decryptor.
#[derive(Deserialize, Debug, PartialEq)]
pub(crate) struct EncryptedPayload {
    pub encrypt: String,
    pub iv: String,
}

#[derive(Deserialize)]
struct VersionInfo {
    current: String,
}

pub(crate) struct Fetcher {
    client: reqwest::Client,
    base_url: String,
    version: String,
}

impl Fetcher {
    pub fn new(base_url: &str, version: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Fetcher {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            version: version.to_string(),
        })
    }

    /// Asks the service for the latest released version. A mismatch is
    /// informational only and never blocks startup, so anything short of a
    /// transport failure counts as success here.
    pub async fn check_version(&self) -> Result<(), FetchError> {
        let response = self.get(&format!("{}/check-version", self.base_url)).await?;
        match response.json::<VersionInfo>().await {
            Ok(remote) if remote.current != self.version => {
                println!("a newer version is available: v{}", remote.current);
            }
            Ok(_) => info!("client version is current"),
            Err(err) => debug!("unparsable version-check response: {err}"),
        }
        Ok(())
    }

    /// Fetches the encrypted configuration document for `identity`.
    pub async fn fetch_payload(&self, identity: &str) -> Result<EncryptedPayload, FetchError> {
        let response = self
            .get(&format!("{}/{}.json", self.base_url, identity))
            .await?;
        Ok(response.json().await?)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .header(VERSION_HEADER, &self.version)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }
        Ok(response)
    }
}
