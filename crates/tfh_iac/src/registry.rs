//! Terraform registry lookups.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::RegistryError;

/// Public Terraform registry module API.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.terraform.io/v1/modules";

/// Client-side timeout for registry requests.
pub const REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves the newest published version of a module.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Latest version string, as the first entry the registry lists.
    async fn get_latest_version(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
    ) -> Result<String, RegistryError>;
}

#[derive(Debug, Deserialize)]
struct VersionsResponse {
    versions: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    version: String,
}

/// HTTP client for the registry versions endpoint.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRegistryClient {
    /// Client for the public registry.
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_base_url(DEFAULT_REGISTRY_URL)
    }

    /// Client for a registry at a different base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(REGISTRY_TIMEOUT)
            .build()
            .map_err(RegistryError::Client)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn get_latest_version(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
    ) -> Result<String, RegistryError> {
        let url = format!("{}/{}/{}/{}/versions", self.base_url, namespace, name, provider);
        debug!("Fetching module versions from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(RegistryError::Network)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RegistryError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(RegistryError::Body)?;
        let parsed: VersionsResponse =
            serde_json::from_slice(&body).map_err(RegistryError::Parse)?;

        parsed
            .versions
            .into_iter()
            .next()
            .map(|entry| entry.version)
            .ok_or_else(|| RegistryError::NoVersions(format!("{}/{}/{}", namespace, name, provider)))
    }
}
