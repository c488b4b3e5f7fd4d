//! HTTP/JSON directory client

use super::DirectoryClient;
use crate::error::ApiError;
use crate::types::{Server, ServerConfiguration};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Directory served over HTTP(S)
///
/// * `GET {base}/servers`
/// * `GET {base}/servers/{id}/configuration?protocol={protocol_id}`
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: Client,
    base: Url,
}

impl HttpDirectory {
    /// Create a client for the directory rooted at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut base = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl {
            message: format!("Failed to parse URL: {}", e),
        })?;

        match base.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ApiError::InvalidUrl {
                    message: format!("Only HTTP/HTTPS schemes are supported, got: {}", scheme),
                })
            }
        }

        // Url::join replaces the last segment unless the path ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| ApiError::Transport {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl {
                message: format!("{} cannot be a base URL", self.base),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!(%url, "Directory request");

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            warn!(%url, error = %e, "Directory request failed");
            ApiError::Transport {
                message: if e.is_timeout() {
                    "Request timed out".to_string()
                } else {
                    e.to_string()
                },
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "Directory returned error status");
            return Err(ApiError::Status {
                code: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectory {
    #[tracing::instrument(skip(self))]
    async fn servers(&self) -> Result<Vec<Server>, ApiError> {
        let url = self.endpoint(&["servers"])?;
        self.get_json(url).await
    }

    #[tracing::instrument(skip(self))]
    async fn configuration(
        &self,
        server_id: &str,
        protocol_id: &str,
    ) -> Result<ServerConfiguration, ApiError> {
        let mut url = self.endpoint(&["servers", server_id, "configuration"])?;
        url.query_pairs_mut().append_pair("protocol", protocol_id);
        self.get_json(url).await
    }
}
