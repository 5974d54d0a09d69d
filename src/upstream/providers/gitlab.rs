//! GitLab upstream provider
//!
//! Resolves the newest release or tag of a project via the GitLab API v4.
//! Project paths are addressed URL-encoded (`group%2Fproject`).

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use crate::upstream::error::ProviderError;
use crate::upstream::origin::OriginConfig;
use crate::upstream::provider::UpstreamProvider;
use crate::upstream::providers::http_client;

const DEFAULT_BASE_URL: &str = "https://gitlab.com/api/v4";

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tag_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

pub struct GitlabProvider {
    http: reqwest::Client,
    base_url: String,
    tokens: HashMap<String, String>,
}

impl GitlabProvider {
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

    /// Project id in path form: `namespace/project` percent-encoded
    fn project_id(origin: &OriginConfig) -> String {
        format!(
            "{}/{}",
            origin.repository.trim_matches('/'),
            origin.tool.trim_matches('/')
        )
        .replace('/', "%2F")
    }

    fn request(&self, origin: &OriginConfig, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.get(format!(
            "{}/projects/{}/{}",
            self.base_url,
            Self::project_id(origin),
            path
        ));
        if let Some(token) = self.tokens.get(origin.token_key()) {
            req = req.header("PRIVATE-TOKEN", token);
        }
        req
    }

    async fn by_release(&self, origin: &OriginConfig) -> Result<Option<String>, ProviderError> {
        let response = self.request(origin, "releases").send().await?;
        let Some(response) = triage(response, origin)? else {
            return Ok(None);
        };
        let releases: Vec<Release> = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        // Newest first in the API response
        Ok(releases
            .into_iter()
            .next()
            .and_then(|r| r.name.or(r.tag_name)))
    }

    async fn by_tag(&self, origin: &OriginConfig) -> Result<Option<String>, ProviderError> {
        let response = self.request(origin, "repository/tags").send().await?;
        let Some(response) = triage(response, origin)? else {
            return Ok(None);
        };
        let tags: Vec<Tag> = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(tags.into_iter().next().map(|t| t.name))
    }
}

fn triage(
    response: reqwest::Response,
    origin: &OriginConfig,
) -> Result<Option<reqwest::Response>, ProviderError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        warn!(
            "GitLab API returned {} for {}/{}",
            status, origin.repository, origin.tool
        );
        return Err(ProviderError::InvalidResponse(format!(
            "Unexpected status: {status}"
        )));
    }
    Ok(Some(response))
}

#[async_trait::async_trait]
impl UpstreamProvider for GitlabProvider {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    async fn latest_version(
        &self,
        origin: &OriginConfig,
    ) -> Result<Option<String>, ProviderError> {
        match origin.method.as_str() {
            "release" => self.by_release(origin).await,
            "tag-release" => self.by_tag(origin).await,
            other => Err(ProviderError::InvalidConfig(format!(
                "invalid gitlab query method '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn origin(method: &str) -> OriginConfig {
        OriginConfig {
            repository: "wireshark".to_string(),
            tool: "wireshark".to_string(),
            provider: "gitlab".to_string(),
            method: method.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn release_method_takes_newest_release() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/wireshark%2Fwireshark/releases")
            .with_status(200)
            .with_body(
                r#"[{"name": "v4.2.0", "tag_name": "v4.2.0"},
                    {"name": "v4.0.0", "tag_name": "v4.0.0"}]"#,
            )
            .create_async()
            .await;

        let provider = GitlabProvider::new(&server.url(), HashMap::new());
        let version = provider.latest_version(&origin("release")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(version.as_deref(), Some("v4.2.0"));
    }

    #[tokio::test]
    async fn release_without_name_falls_back_to_tag_name() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/projects/wireshark%2Fwireshark/releases")
            .with_status(200)
            .with_body(r#"[{"tag_name": "v4.2.0"}]"#)
            .create_async()
            .await;

        let provider = GitlabProvider::new(&server.url(), HashMap::new());
        let version = provider.latest_version(&origin("release")).await.unwrap();
        assert_eq!(version.as_deref(), Some("v4.2.0"));
    }

    #[tokio::test]
    async fn tag_method_takes_first_listed_tag() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/projects/wireshark%2Fwireshark/repository/tags")
            .with_status(200)
            .with_body(r#"[{"name": "v4.2.0"}, {"name": "v4.0.0"}]"#)
            .create_async()
            .await;

        let provider = GitlabProvider::new(&server.url(), HashMap::new());
        let version = provider
            .latest_version(&origin("tag-release"))
            .await
            .unwrap();
        assert_eq!(version.as_deref(), Some("v4.2.0"));
    }

    #[tokio::test]
    async fn missing_project_is_absence() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/projects/wireshark%2Fwireshark/releases")
            .with_status(404)
            .create_async()
            .await;

        let provider = GitlabProvider::new(&server.url(), HashMap::new());
        let version = provider.latest_version(&origin("release")).await.unwrap();
        assert!(version.is_none());
    }

    #[tokio::test]
    async fn token_goes_out_as_private_token_header() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/wireshark%2Fwireshark/releases")
            .match_header("private-token", "secret")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let tokens = HashMap::from([("gitlab".to_string(), "secret".to_string())]);
        let provider = GitlabProvider::new(&server.url(), tokens);
        let version = provider.latest_version(&origin("release")).await.unwrap();

        mock.assert_async().await;
        assert!(version.is_none(), "empty release list is absence");
    }
}
