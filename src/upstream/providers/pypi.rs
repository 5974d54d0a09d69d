//! PyPI upstream provider
//!
//! Resolves the newest release of a Python package via the PyPI JSON API.

use serde::Deserialize;
use tracing::warn;

use crate::upstream::error::ProviderError;
use crate::upstream::origin::OriginConfig;
use crate::upstream::provider::UpstreamProvider;
use crate::upstream::providers::http_client;

const DEFAULT_BASE_URL: &str = "https://pypi.org";

#[derive(Debug, Deserialize)]
struct PypiResponse {
    info: PypiInfo,
}

#[derive(Debug, Deserialize)]
struct PypiInfo {
    version: String,
}

pub struct PypiProvider {
    http: reqwest::Client,
    base_url: String,
}

impl PypiProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for PypiProvider {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait::async_trait]
impl UpstreamProvider for PypiProvider {
    fn name(&self) -> &'static str {
        "pypi"
    }

    async fn latest_version(
        &self,
        origin: &OriginConfig,
    ) -> Result<Option<String>, ProviderError> {
        if origin.method != "release" {
            return Err(ProviderError::InvalidConfig(format!(
                "invalid pypi query method '{}'",
                origin.method
            )));
        }

        let url = format!(
            "{}/pypi/{}/json",
            self.base_url,
            origin.tool.trim_matches('/')
        );
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!("PyPI API returned {} for {}", status, origin.tool);
            return Err(ProviderError::InvalidResponse(format!(
                "Unexpected status: {status}"
            )));
        }

        let body: PypiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(Some(body.info.version))
    }
}
