//! Upstream provider capability and the name → implementation registry

use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::upstream::error::ProviderError;
use crate::upstream::origin::OriginConfig;
use crate::upstream::providers::{
    alpine::AlpineProvider, bitbucket::BitbucketProvider, debian::DebianProvider,
    github::GithubProvider, gitlab::GitlabProvider, pypi::PypiProvider,
};

/// Trait for resolving the newest known version from one external source
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait UpstreamProvider: Send + Sync {
    /// Provider name as referenced by metadata descriptors
    fn name(&self) -> &'static str;

    /// Resolve the latest version for a configured origin
    ///
    /// # Returns
    /// * `Ok(Some(version))` - newest version in the source's native format
    /// * `Ok(None)` - the source has no resolvable version (legitimate)
    /// * `Err(ProviderError)` - the query itself failed
    async fn latest_version(&self, origin: &OriginConfig)
    -> Result<Option<String>, ProviderError>;
}

/// Name → implementation lookup table, read-only after startup.
///
/// Adding a provider means one implementation plus one `register` call;
/// the orchestrator only ever sees the trait.
pub struct ProviderSet {
    providers: HashMap<String, Arc<dyn UpstreamProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// All built-in providers, with API tokens keyed by provider name
    pub fn with_builtins(tokens: &HashMap<String, String>) -> Self {
        let mut set = Self::new();
        set.register(Arc::new(GithubProvider::with_tokens(tokens.clone())));
        set.register(Arc::new(GitlabProvider::with_tokens(tokens.clone())));
        set.register(Arc::new(BitbucketProvider::default()));
        set.register(Arc::new(PypiProvider::default()));
        set.register(Arc::new(DebianProvider::default()));
        set.register(Arc::new(AlpineProvider::default()));
        set
    }

    pub fn register(&mut self, provider: Arc<dyn UpstreamProvider>) {
        self.providers
            .insert(provider.name().to_lowercase(), provider);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn UpstreamProvider>> {
        self.providers.get(&name.to_lowercase())
    }
}

impl Default for ProviderSet {
    fn default() -> Self {
        Self::with_builtins(&HashMap::new())
    }
}
