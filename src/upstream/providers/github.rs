//! GitHub upstream provider
//!
//! Resolves the newest release, tag or commit of a repository via the
//! GitHub REST API. Unauthenticated requests are limited to 60 per hour;
//! a zero-scope token raises the limit and is attached when configured.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use crate::upstream::error::ProviderError;
use crate::upstream::origin::OriginConfig;
use crate::upstream::provider::UpstreamProvider;
use crate::upstream::providers::{http_client, latest_by_numeric_core};

const DEFAULT_BASE_URL: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Commit {
    sha: String,
}

pub struct GithubProvider {
    http: reqwest::Client,
    base_url: String,
    tokens: HashMap<String, String>,
}

impl GithubProvider {
    pub fn new(base_url: &str, tokens: HashMap<String, String>) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn with_tokens(tokens: HashMap<String, String>) -> Self {
        Self::new(DEFAULT_BASE_URL, tokens)
    }

    fn request(&self, origin: &OriginConfig, path: &str) -> reqwest::RequestBuilder {
        let repository = origin.repository.trim_matches('/');
        let tool = origin.tool.trim_matches('/');
        let mut req = self
            .http
            .get(format!(
                "{}/repos/{}/{}/{}",
                self.base_url, repository, tool, path
            ))
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = self.tokens.get(origin.token_key()) {
            req = req.header("Authorization", format!("token {token}"));
        }
        req
    }

    async fn by_release(&self, origin: &OriginConfig) -> Result<Option<String>, ProviderError> {
        let response = self.request(origin, "releases/latest").send().await?;
        match triage(response, origin)? {
            Some(response) => {
                let release: Release = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
                Ok(Some(release.tag_name))
            }
            // Repositories without releases answer 404 here
            None => Ok(None),
        }
    }

    async fn by_tag(&self, origin: &OriginConfig) -> Result<Option<String>, ProviderError> {
        let response = self.request(origin, "tags").send().await?;
        match triage(response, origin)? {
            Some(response) => {
                let tags: Vec<Tag> = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
                Ok(latest_by_numeric_core(tags.into_iter().map(|t| t.name)))
            }
            None => Ok(None),
        }
    }

    async fn by_commit(&self, origin: &OriginConfig) -> Result<Option<String>, ProviderError> {
        let response = self.request(origin, "commits/HEAD").send().await?;
        match triage(response, origin)? {
            Some(response) => {
                let commit: Commit = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
                Ok(Some(commit.sha))
            }
            None => Ok(None),
        }
    }
}

/// Shared status triage: absence for 404, rate-limit and error mapping
fn triage(
    response: reqwest::Response,
    origin: &OriginConfig,
) -> Result<Option<reqwest::Response>, ProviderError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        return Err(ProviderError::RateLimited {
            retry_after_secs: retry_after,
        });
    }
    if !status.is_success() {
        warn!(
            "GitHub API returned {} for {}/{}",
            status, origin.repository, origin.tool
        );
        return Err(ProviderError::InvalidResponse(format!(
            "Unexpected status: {status}"
        )));
    }
    Ok(Some(response))
}

#[async_trait::async_trait]
impl UpstreamProvider for GithubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn latest_version(
        &self,
        origin: &OriginConfig,
    ) -> Result<Option<String>, ProviderError> {
        match origin.method.as_str() {
            "release" => self.by_release(origin).await,
            "tag-release" => self.by_tag(origin).await,
            "commit" => self.by_commit(origin).await,
            other => Err(ProviderError::InvalidConfig(format!(
                "invalid github query method '{other}'"
            ))),
        }
    }
}
