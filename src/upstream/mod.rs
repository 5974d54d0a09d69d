//! Upstream version resolution: the pluggable provider framework
//!
//! # Modules
//!
//! - [`origin`]: metadata descriptor types and validation
//! - [`provider`]: the `UpstreamProvider` capability and provider registry
//! - [`providers`]: concrete implementations (GitHub, GitLab, Bitbucket,
//!   PyPI, Debian, Alpine)
//! - [`error`]: provider error type
//!
//! The functions here drive one tool's configured origins: each origin is
//! resolved independently through the metadata cache, and the precedence
//! rule picks the single record that decides the upstream verdict.

pub mod error;
pub mod origin;
pub mod provider;
pub mod providers;

use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::FETCH_STAGGER_DELAY_MS;
use crate::version::cache::{Cache, CacheKey};
use crate::version::types::{Tier, ToolIdentity, VersionRecord};

pub use error::ProviderError;
pub use origin::{OriginConfig, UpstreamDescriptor};
pub use provider::{ProviderSet, UpstreamProvider};

use chrono::TimeDelta;

/// Outcome of resolving one configured origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OriginOutcome {
    Resolved { record: VersionRecord },
    /// The source answered but has no resolvable version
    Absent,
    Failed { reason: String },
}

impl OriginOutcome {
    pub fn record(&self) -> Option<&VersionRecord> {
        match self {
            Self::Resolved { record } => Some(record),
            _ => None,
        }
    }
}

/// One origin's configuration summary plus its resolution outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginReport {
    pub provider: String,
    pub origin: bool,
    pub docker_origin: bool,
    pub outcome: OriginOutcome,
}

/// Resolve every origin of one tool's descriptor.
///
/// Origins are independent: they run concurrently (with staggered starts
/// to stay friendly to external rate limits) and one failing or absent
/// origin never blocks the others. Results keep descriptor order.
pub async fn resolve_origins(
    providers: &ProviderSet,
    cache: &Cache,
    tool: &ToolIdentity,
    descriptor: &UpstreamDescriptor,
    ttl: TimeDelta,
    force_refresh: bool,
) -> Vec<OriginReport> {
    let futures = descriptor
        .upstreams
        .iter()
        .enumerate()
        .map(|(i, origin)| async move {
            sleep(Duration::from_millis(FETCH_STAGGER_DELAY_MS * i as u64)).await;
            let outcome =
                resolve_single_origin(providers, cache, tool, origin, ttl, force_refresh).await;
            OriginReport {
                provider: origin.provider.clone(),
                origin: origin.origin,
                docker_origin: origin.docker_origin,
                outcome,
            }
        });
    join_all(futures).await
}

async fn resolve_single_origin(
    providers: &ProviderSet,
    cache: &Cache,
    tool: &ToolIdentity,
    origin: &OriginConfig,
    ttl: TimeDelta,
    force_refresh: bool,
) -> OriginOutcome {
    if let Err(e) = origin.validate() {
        warn!("Skipping misconfigured origin for {}: {}", tool, e);
        return OriginOutcome::Failed {
            reason: e.to_string(),
        };
    }
    let Some(provider) = providers.get(&origin.provider) else {
        warn!(
            "No upstream provider implemented for '{}' (tool {})",
            origin.provider, tool
        );
        return OriginOutcome::Failed {
            reason: ProviderError::UnknownProvider(origin.provider.clone()).to_string(),
        };
    };

    let key = origin_cache_key(tool, origin);
    let result = cache
        .get_or_fetch::<_, _, ProviderError>(&key, ttl, force_refresh, || async {
            debug!(
                "Fetching upstream version from provider {} for {}",
                origin.provider, tool
            );
            let version = provider.latest_version(origin).await?;
            // Absence is cached like any value to avoid hammering sources
            // that legitimately lack a release
            serde_json::to_string(&version)
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
        })
        .await;

    match result {
        Ok(payload) => match serde_json::from_str::<Option<String>>(&payload) {
            Ok(Some(version)) => OriginOutcome::Resolved {
                record: VersionRecord::new(Tier::Upstream, Some(version))
                    .with_source(&origin.provider),
            },
            Ok(None) => OriginOutcome::Absent,
            Err(e) => OriginOutcome::Failed {
                reason: format!("corrupt cached payload: {e}"),
            },
        },
        Err(e) => {
            warn!(
                "Upstream check via {} failed for {}: {}",
                origin.provider, tool, e
            );
            OriginOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

/// Cache key fully determined by tool identity, provider and query
/// parameters, so distinct origins of one tool never collide
fn origin_cache_key(tool: &ToolIdentity, origin: &OriginConfig) -> CacheKey {
    CacheKey::new(&tool.repository(), &origin.provider)
        .param("uri", &origin.uri)
        .param("repository", &origin.repository)
        .param("tool", &origin.tool)
        .param("method", &origin.method)
        .param("suite", &origin.suite)
}

/// Pick the record that decides the upstream verdict.
///
/// Precedence: the first successfully resolved `origin: true` entry in
/// descriptor order wins; failing that, the first resolved
/// `docker_origin: true` entry; failing that, there is no authoritative
/// upstream and the verdict stays UNKNOWN.
pub fn pick_authoritative(reports: &[OriginReport]) -> Option<&VersionRecord> {
    reports
        .iter()
        .filter(|r| r.origin)
        .find_map(|r| r.outcome.record())
        .or_else(|| {
            reports
                .iter()
                .filter(|r| r.docker_origin)
                .find_map(|r| r.outcome.record())
        })
}
