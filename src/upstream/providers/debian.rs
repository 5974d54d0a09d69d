//! Debian upstream provider
//!
//! Resolves the newest package version for a distribution suite via the
//! sources.debian.org API. A package missing from the configured suite is
//! absence, not an error — suites legitimately carry different subsets.

use serde::Deserialize;
use tracing::warn;

use crate::upstream::error::ProviderError;
use crate::upstream::origin::OriginConfig;
use crate::upstream::provider::UpstreamProvider;
use crate::upstream::providers::http_client;

const DEFAULT_BASE_URL: &str = "https://sources.debian.org/api/src";

#[derive(Debug, Deserialize)]
struct SourceResponse {
    #[serde(default)]
    versions: Vec<SourceVersion>,
}

#[derive(Debug, Deserialize)]
struct SourceVersion {
    version: String,
    #[serde(default)]
    suites: Vec<String>,
}

pub struct DebianProvider {
    http: reqwest::Client,
    base_url: String,
}

impl DebianProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for DebianProvider {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait::async_trait]
impl UpstreamProvider for DebianProvider {
    fn name(&self) -> &'static str {
        "debian"
    }

    async fn latest_version(
        &self,
        origin: &OriginConfig,
    ) -> Result<Option<String>, ProviderError> {
        if origin.method != "release" {
            return Err(ProviderError::InvalidConfig(format!(
                "invalid debian query method '{}'",
                origin.method
            )));
        }

        let url = format!("{}/{}", self.base_url, origin.tool.trim_matches('/'));
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!("Debian sources API returned {} for {}", status, origin.tool);
            return Err(ProviderError::InvalidResponse(format!(
                "Unexpected status: {status}"
            )));
        }

        let body: SourceResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        // Versions are listed newest first per suite; take the first entry
        // matching the configured suite, or the newest overall when no
        // suite is pinned.
        let version = body
            .versions
            .into_iter()
            .find(|v| origin.suite.is_empty() || v.suites.iter().any(|s| s == &origin.suite))
            .map(|v| v.version);
        Ok(version)
    }
}
