//! Core data model shared across the resolution tiers

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::version::normalizer::normalize;

/// Which tier a version signal was observed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Local,
    Remote,
    Upstream,
}

/// Identifies one tool of the fleet across all tiers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolIdentity {
    pub name: String,
    pub namespace: String,
}

impl ToolIdentity {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.trim_matches('/').to_string(),
            namespace: namespace.trim_matches('/').to_string(),
        }
    }

    /// Parse `name` or `namespace/name`, falling back to the default namespace
    pub fn parse(raw: &str, default_namespace: &str) -> Self {
        match raw.rsplit_once('/') {
            Some((namespace, name)) => Self::new(name, namespace),
            None => Self::new(raw, default_namespace),
        }
    }

    /// Repository path as used by the registry, e.g. `cincan/tshark`
    pub fn repository(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }
}

impl std::fmt::Display for ToolIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.repository())
    }
}

/// A repository/tag pair as understood by registries and the local runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn new(repository: &str, tag: &str) -> Self {
        Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
        }
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// One observed version signal
///
/// `raw` is absent when the tier was reachable but carried no version
/// (e.g. an image built without the version variable). That state is
/// distinct from a failed or skipped tier, which never produces a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRecord {
    pub tier: Tier,
    pub raw: Option<String>,
    pub normalized: Option<String>,
    pub observed_at: DateTime<Utc>,
    /// All tags referencing the same image content, for local/remote tiers
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    /// Registry content digest (remote) or image id (local)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Registry digests the local runtime knows for this image
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub repo_digests: Vec<String>,
    /// Compressed size in bytes, when the source reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Provider name for upstream records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl VersionRecord {
    pub fn new(tier: Tier, raw: Option<String>) -> Self {
        let normalized = raw.as_deref().map(normalize);
        Self {
            tier,
            raw,
            normalized,
            observed_at: Utc::now(),
            tags: Vec::new(),
            digest: None,
            repo_digests: Vec::new(),
            size: None,
            source: None,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_digest(mut self, digest: Option<String>) -> Self {
        self.digest = digest;
        self
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }
}

/// Outcome of resolving one tier for one tool
///
/// Absence (no local image, no metadata descriptor) is legitimate data
/// and must never be folded into the failure case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TierOutcome {
    Resolved { record: VersionRecord },
    Absent { reason: String },
    Failed { reason: String },
}

impl TierOutcome {
    pub fn absent(reason: &str) -> Self {
        Self::Absent {
            reason: reason.to_string(),
        }
    }

    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            reason: reason.to_string(),
        }
    }

    pub fn record(&self) -> Option<&VersionRecord> {
        match self {
            Self::Resolved { record } => Some(record),
            _ => None,
        }
    }

    /// Raw version string, when this tier resolved to one
    pub fn version(&self) -> Option<&str> {
        self.record().and_then(|r| r.raw.as_deref())
    }
}

/// Result of comparing two version signals
///
/// UNKNOWN means at least one side could not be resolved at all; it is
/// never used for two present-but-different versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Match,
    Deviation,
    Unknown,
}

/// Pairwise verdicts for one tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdicts {
    pub local_remote: Verdict,
    pub remote_upstream: Verdict,
}

/// The engine's complete output for one tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolReport {
    pub tool: String,
    pub local: TierOutcome,
    pub remote: TierOutcome,
    pub upstreams: Vec<crate::upstream::OriginReport>,
    pub verdicts: Verdicts,
}
