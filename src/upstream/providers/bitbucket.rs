//! Bitbucket upstream provider
//!
//! Resolves the newest download or tag of a repository via the
//! Bitbucket API 2.0.

use serde::Deserialize;
use tracing::warn;

use crate::upstream::error::ProviderError;
use crate::upstream::origin::OriginConfig;
use crate::upstream::provider::UpstreamProvider;
use crate::upstream::providers::http_client;

const DEFAULT_BASE_URL: &str = "https://api.bitbucket.org/2.0";

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    values: Vec<NamedValue>,
}

#[derive(Debug, Deserialize)]
struct NamedValue {
    name: String,
}

pub struct BitbucketProvider {
    http: reqwest::Client,
    base_url: String,
}

impl BitbucketProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn first_value(
        &self,
        origin: &OriginConfig,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<String>, ProviderError> {
        let url = format!(
            "{}/repositories/{}/{}/{}",
            self.base_url,
            origin.repository.trim_matches('/'),
            origin.tool.trim_matches('/'),
            path
        );
        let response = self.http.get(&url).query(query).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!(
                "Bitbucket API returned {} for {}/{}",
                status, origin.repository, origin.tool
            );
            return Err(ProviderError::InvalidResponse(format!(
                "Unexpected status: {status}"
            )));
        }
        let page: Page = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(page.values.into_iter().next().map(|v| v.name))
    }
}

impl Default for BitbucketProvider {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait::async_trait]
impl UpstreamProvider for BitbucketProvider {
    fn name(&self) -> &'static str {
        "bitbucket"
    }

    async fn latest_version(
        &self,
        origin: &OriginConfig,
    ) -> Result<Option<String>, ProviderError> {
        match origin.method.as_str() {
            "release" => self.first_value(origin, "downloads", &[]).await,
            // Inverse sort by name (alias tag)
            "tag-release" => {
                self.first_value(origin, "refs/tags", &[("sort", "-name")])
                    .await
            }
            other => Err(ProviderError::InvalidConfig(format!(
                "invalid bitbucket query method '{other}'"
            ))),
        }
    }
}
