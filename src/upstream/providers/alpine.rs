//! Alpine upstream provider
//!
//! Resolves the newest package version by reading the `pkgver` variable
//! straight out of the APKBUILD in the aports tree. The branch is
//! selected by the origin's suite (e.g. `3.19-stable`).

use tracing::warn;

use crate::upstream::error::ProviderError;
use crate::upstream::origin::OriginConfig;
use crate::upstream::provider::UpstreamProvider;
use crate::upstream::providers::http_client;

const DEFAULT_BASE_URL: &str = "https://git.alpinelinux.org/aports/plain";
const VERSION_VARIABLE: &str = "pkgver";

pub struct AlpineProvider {
    http: reqwest::Client,
    base_url: String,
}

impl AlpineProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for AlpineProvider {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Pull `pkgver=3.4.0` out of an APKBUILD body
fn parse_pkgver(apkbuild: &str) -> Option<String> {
    apkbuild.lines().find_map(|line| {
        line.trim()
            .strip_prefix(VERSION_VARIABLE)
            .and_then(|rest| rest.strip_prefix('='))
            .map(|value| value.trim_matches('"').to_string())
    })
}

#[async_trait::async_trait]
impl UpstreamProvider for AlpineProvider {
    fn name(&self) -> &'static str {
        "alpine"
    }

    async fn latest_version(
        &self,
        origin: &OriginConfig,
    ) -> Result<Option<String>, ProviderError> {
        if origin.method != "release" {
            return Err(ProviderError::InvalidConfig(format!(
                "invalid alpine query method '{}'",
                origin.method
            )));
        }
        if origin.repository.is_empty() {
            return Err(ProviderError::InvalidConfig(
                "alpine origin needs the aports repository (e.g. community)".to_string(),
            ));
        }

        let url = format!(
            "{}/{}/{}/APKBUILD",
            self.base_url,
            origin.repository.trim_matches('/'),
            origin.tool.trim_matches('/')
        );
        let mut request = self.http.get(&url);
        if !origin.suite.is_empty() {
            request = request.query(&[("h", origin.suite.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!(
                "Alpine aports returned {} for {}/{}",
                status, origin.repository, origin.tool
            );
            return Err(ProviderError::InvalidResponse(format!(
                "Unexpected status: {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(parse_pkgver(&body))
    }
}
