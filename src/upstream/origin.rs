//! Per-tool metadata descriptor: the configured upstream origins
//!
//! The descriptor is a JSON file shipped inside the image's final layer:
//!
//! ```json
//! { "upstreams": [ { "uri": "...", "repository": "...", "tool": "...",
//!                    "provider": "github", "method": "release",
//!                    "origin": true, "docker_origin": false } ] }
//! ```

use serde::{Deserialize, Serialize};

use crate::upstream::error::ProviderError;

/// One configured upstream origin for a tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    pub uri: String,
    pub repository: String,
    pub tool: String,
    pub provider: String,
    pub method: String,
    pub suite: String,
    /// Authoritative source-of-truth origin for the tool itself
    pub origin: bool,
    /// Source the Dockerfile installs the tool from
    pub docker_origin: bool,
    /// Token lookup key when it differs from the provider name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_provider: Option<String>,
}

impl OriginConfig {
    /// Check the fields every provider requires.
    ///
    /// Either a URI or the repository/tool/provider triple must be
    /// present. A violation is a configuration error scoped to this
    /// origin; it never fails the whole tool or batch.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.provider.is_empty() {
            return Err(ProviderError::InvalidConfig(
                "origin without a provider name".to_string(),
            ));
        }
        if self.uri.is_empty() && (self.repository.is_empty() || self.tool.is_empty()) {
            return Err(ProviderError::InvalidConfig(format!(
                "origin for provider '{}' needs either a uri or repository and tool",
                self.provider
            )));
        }
        Ok(())
    }

    /// Token lookup key: explicit override, else the provider name
    pub fn token_key(&self) -> &str {
        self.token_provider.as_deref().unwrap_or(&self.provider)
    }
}

/// The full descriptor: every origin configured for one tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamDescriptor {
    pub upstreams: Vec<OriginConfig>,
}

impl UpstreamDescriptor {
    pub fn parse(content: &str) -> Result<Self, ProviderError> {
        serde_json::from_str(content)
            .map_err(|e| ProviderError::InvalidConfig(format!("metadata descriptor: {e}")))
    }
}
