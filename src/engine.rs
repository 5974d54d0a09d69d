//! Version resolution engine
//!
//! Composes the registry client, local inspector, upstream provider
//! framework and metadata cache into per-tool reports: the triad of
//! {local, remote, upstream} version records plus pairwise verdicts.
//!
//! Partial failure is the normal case, not the exception — a tier or
//! origin that cannot be resolved degrades to an unresolved outcome with
//! a reason and never aborts the rest of the tool or the batch.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use futures::StreamExt;
use futures::stream;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{Config, FETCH_STAGGER_DELAY_MS};
use crate::registry::error::RegistryError;
use crate::registry::local::{DockerInspector, LocalImage, LocalRuntime};
use crate::registry::remote::{RegistryClient, RemoteImage};
use crate::upstream::{self, ProviderSet, UpstreamDescriptor};
use crate::version::cache::{Cache, CacheKey};
use crate::version::normalizer::compare;
use crate::version::types::{
    ImageReference, Tier, TierOutcome, ToolIdentity, ToolReport, Verdict, Verdicts, VersionRecord,
};

pub struct EngineOptions {
    /// Freshness window for the remote and upstream tiers
    pub cache_ttl: TimeDelta,
    /// Bound on concurrently resolved tools
    pub max_concurrent: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            cache_ttl: TimeDelta::hours(crate::config::DEFAULT_CACHE_TTL_HOURS),
            max_concurrent: crate::config::DEFAULT_MAX_CONCURRENT,
        }
    }
}

pub struct Engine {
    registry: RegistryClient,
    inspector: Arc<dyn LocalRuntime>,
    providers: ProviderSet,
    cache: Arc<Cache>,
    options: EngineOptions,
}

impl Engine {
    /// Build an engine from configuration, talking to the configured
    /// registry and the local Docker socket.
    pub fn new(config: &Config, cache: Arc<Cache>) -> Result<Self, crate::registry::error::InspectError> {
        let registry = RegistryClient::new(
            &config.registry_root,
            &config.version_variable,
            &config.metadata_filename,
        );
        let inspector = Arc::new(DockerInspector::connect(&config.version_variable)?);
        Ok(Self::with_parts(
            registry,
            inspector,
            ProviderSet::with_builtins(&config.tokens),
            cache,
            EngineOptions {
                cache_ttl: TimeDelta::hours(config.cache_ttl_hours),
                max_concurrent: config.max_concurrent.max(1),
            },
        ))
    }

    /// Assemble an engine from explicit parts
    pub fn with_parts(
        registry: RegistryClient,
        inspector: Arc<dyn LocalRuntime>,
        providers: ProviderSet,
        cache: Arc<Cache>,
        options: EngineOptions,
    ) -> Self {
        Self {
            registry,
            inspector,
            providers,
            cache,
            options,
        }
    }

    /// Resolve one tool across all three tiers.
    ///
    /// Local and remote are always attempted (concurrently); upstream
    /// origins only when the remote image ships a metadata descriptor
    /// that parses. `force_refresh` bypasses the cache for every tier.
    pub async fn resolve_tool(
        &self,
        tool: &ToolIdentity,
        tag: &str,
        force_refresh: bool,
    ) -> ToolReport {
        let reference = ImageReference::new(&tool.repository(), tag);
        debug!("Resolving {}", reference);

        let (local, remote) = tokio::join!(
            self.resolve_local(&reference),
            self.resolve_remote(tool, &reference, force_refresh)
        );
        let (remote, descriptor) = remote;

        let upstreams = match descriptor {
            Some(descriptor) => {
                upstream::resolve_origins(
                    &self.providers,
                    &self.cache,
                    tool,
                    &descriptor,
                    self.options.cache_ttl,
                    force_refresh,
                )
                .await
            }
            None => Vec::new(),
        };

        let authoritative = upstream::pick_authoritative(&upstreams);
        let verdicts = Verdicts {
            local_remote: verdict_local_remote(&local, &remote),
            remote_upstream: compare(
                remote.version(),
                authoritative.and_then(|r| r.raw.as_deref()),
            ),
        };

        ToolReport {
            tool: tool.repository(),
            local,
            remote,
            upstreams,
            verdicts,
        }
    }

    /// Resolve a whole fleet with bounded concurrency.
    ///
    /// Tools are independent; one tool's failures only degrade its own
    /// report. Reports come back sorted by tool name.
    pub async fn resolve_fleet(
        &self,
        tools: &[ToolIdentity],
        tag: &str,
        force_refresh: bool,
    ) -> Vec<ToolReport> {
        info!("Resolving versions for {} tools", tools.len());

        let mut reports: Vec<ToolReport> = stream::iter(tools.iter().enumerate().map(
            |(i, tool)| async move {
                sleep(Duration::from_millis(FETCH_STAGGER_DELAY_MS * i as u64)).await;
                self.resolve_tool(tool, tag, force_refresh).await
            },
        ))
        .buffer_unordered(self.options.max_concurrent)
        .collect()
        .await;

        reports.sort_by(|a, b| a.tool.cmp(&b.tool));
        reports
    }

    /// Local tier: always queried live, the runtime is on-host and cheap
    async fn resolve_local(&self, reference: &ImageReference) -> TierOutcome {
        match self.inspector.inspect(reference).await {
            Ok(Some(image)) => TierOutcome::Resolved {
                record: local_record(image),
            },
            Ok(None) => TierOutcome::absent("not present locally"),
            Err(e) => {
                warn!("Local inspection of {} failed: {}", reference, e);
                TierOutcome::failed(e)
            }
        }
    }

    /// Remote tier: registry lookup behind the metadata cache. The cached
    /// payload carries the version signal, digest, size and the metadata
    /// descriptor so a fresh cache entry answers without any network call.
    async fn resolve_remote(
        &self,
        tool: &ToolIdentity,
        reference: &ImageReference,
        force_refresh: bool,
    ) -> (TierOutcome, Option<UpstreamDescriptor>) {
        let key = CacheKey::new(&tool.repository(), "registry").param("tag", &reference.tag);

        let result = self
            .cache
            .get_or_fetch::<_, _, RegistryError>(
                &key,
                self.options.cache_ttl,
                force_refresh,
                || async {
                    let image = self.registry.resolve_image(reference).await?;
                    serde_json::to_string(&image)
                        .map_err(|e| RegistryError::InvalidResponse(e.to_string()))
                },
            )
            .await;

        let image: RemoteImage = match result {
            Ok(payload) => match serde_json::from_str(&payload) {
                Ok(image) => image,
                Err(e) => {
                    return (
                        TierOutcome::failed(format!("corrupt cached payload: {e}")),
                        None,
                    );
                }
            },
            Err(RegistryError::NotFound(_)) => {
                return (TierOutcome::absent("not present on the registry"), None);
            }
            Err(e) => {
                warn!("Remote resolution of {} failed: {}", reference, e);
                return (TierOutcome::failed(e), None);
            }
        };

        let descriptor = match image.descriptor.as_deref() {
            Some(content) => match UpstreamDescriptor::parse(content) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    warn!("Metadata descriptor of {} is invalid: {}", reference, e);
                    None
                }
            },
            None => None,
        };

        let record = VersionRecord::new(Tier::Remote, image.version)
            .with_tags(vec![reference.tag.clone()])
            .with_digest(image.digest)
            .with_size(Some(image.compressed_size));
        (TierOutcome::Resolved { record }, descriptor)
    }
}

fn local_record(image: LocalImage) -> VersionRecord {
    let size = image.size;
    let mut record = VersionRecord::new(Tier::Local, image.version.clone())
        .with_tags(image.tags)
        .with_digest(image.id)
        .with_size(size);
    record.repo_digests = image.repo_digests;
    record
}

/// Local vs remote verdict.
///
/// Tags pointing at the same registry content digest are
/// version-equivalent no matter how the version strings are formatted;
/// otherwise the comparator decides on the version signals.
fn verdict_local_remote(local: &TierOutcome, remote: &TierOutcome) -> Verdict {
    if let (Some(local), Some(remote)) = (local.record(), remote.record()) {
        if let Some(remote_digest) = remote.digest.as_deref() {
            if local
                .repo_digests
                .iter()
                .any(|d| d.ends_with(remote_digest))
            {
                return Verdict::Match;
            }
        }
    }
    compare(local.version(), remote.version())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(tier: Tier, version: Option<&str>) -> TierOutcome {
        TierOutcome::Resolved {
            record: VersionRecord::new(tier, version.map(String::from)),
        }
    }

    #[test]
    fn same_digest_matches_despite_differing_version_strings() {
        let mut local = VersionRecord::new(Tier::Local, Some("undefined".to_string()));
        local.repo_digests = vec!["cincan/tshark@sha256:d1".to_string()];
        let local = TierOutcome::Resolved { record: local };

        let remote = TierOutcome::Resolved {
            record: VersionRecord::new(Tier::Remote, Some("2.0".to_string()))
                .with_digest(Some("sha256:d1".to_string())),
        };

        assert_eq!(verdict_local_remote(&local, &remote), Verdict::Match);
    }

    #[test]
    fn differing_digests_fall_back_to_version_comparison() {
        let mut local = VersionRecord::new(Tier::Local, Some("2.0".to_string()));
        local.repo_digests = vec!["cincan/tshark@sha256:d1".to_string()];
        let local = TierOutcome::Resolved { record: local };

        let remote = TierOutcome::Resolved {
            record: VersionRecord::new(Tier::Remote, Some("2.1".to_string()))
                .with_digest(Some("sha256:d2".to_string())),
        };

        assert_eq!(verdict_local_remote(&local, &remote), Verdict::Deviation);
    }

    #[test]
    fn absent_tier_yields_unknown() {
        let local = TierOutcome::absent("not present locally");
        let remote = resolved(Tier::Remote, Some("2.1"));
        assert_eq!(verdict_local_remote(&local, &remote), Verdict::Unknown);

        let failed = TierOutcome::failed("timeout");
        assert_eq!(verdict_local_remote(&failed, &remote), Verdict::Unknown);
    }

    #[test]
    fn equivalent_version_strings_match_without_digests() {
        let local = resolved(Tier::Local, Some("v2.0"));
        let remote = resolved(Tier::Remote, Some("2.0"));
        assert_eq!(verdict_local_remote(&local, &remote), Verdict::Match);
    }

    #[test]
    fn resolved_tier_without_version_yields_unknown() {
        let local = resolved(Tier::Local, None);
        let remote = resolved(Tier::Remote, Some("2.0"));
        assert_eq!(verdict_local_remote(&local, &remote), Verdict::Unknown);
    }
}
