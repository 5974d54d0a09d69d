//! Wire types for the Docker Registry HTTP V2 documents
//!
//! Only schema version 2 documents (image manifest, manifest list, and
//! their OCI equivalents) are accepted. The deprecated schema 1 manifest
//! is rejected before any blob is requested.

use serde::Deserialize;
use serde_json::Value;

use crate::registry::error::RegistryError;

pub const MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MANIFEST_LIST_V2: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const CONTAINER_CONFIG_V1: &str = "application/vnd.docker.container.image.v1+json";

/// Accept header offered when fetching manifests
pub const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json";

/// Single-platform image manifest
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: i64,
    #[serde(default)]
    pub media_type: String,
    pub config: ConfigReference,
    pub layers: Vec<LayerDescriptor>,
}

impl ImageManifest {
    /// Compressed image size: sum of the layer blob sizes
    pub fn compressed_size(&self) -> u64 {
        self.layers.iter().map(|l| l.size).sum()
    }
}

/// Reference to the image configuration blob
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReference {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    pub digest: String,
}

/// One filesystem layer referenced by a manifest
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDescriptor {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    pub digest: String,
}

/// Multi-architecture manifest list ("fat manifest" / OCI index)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestList {
    pub schema_version: i64,
    #[serde(default)]
    pub media_type: String,
    pub manifests: Vec<PlatformManifestRef>,
}

impl ManifestList {
    /// Digest of the manifest for the given platform
    pub fn platform_digest(&self, os: &str, architecture: &str) -> Option<&str> {
        self.manifests
            .iter()
            .find(|m| {
                m.platform
                    .as_ref()
                    .is_some_and(|p| p.os == os && p.architecture == architecture)
            })
            .map(|m| m.digest.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformManifestRef {
    #[serde(default)]
    pub media_type: String,
    pub digest: String,
    #[serde(default)]
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
}

/// A fetched manifest document, either shape
#[derive(Debug, Clone)]
pub enum ManifestKind {
    Image(ImageManifest),
    List(ManifestList),
}

/// Parse a raw manifest document, rejecting anything but schema 2.
pub fn parse_manifest(value: Value) -> Result<ManifestKind, RegistryError> {
    let schema_version = value.get("schemaVersion").and_then(Value::as_i64);
    if schema_version != Some(2) {
        return Err(RegistryError::UnsupportedSchema(format!(
            "schemaVersion {}",
            schema_version.map_or_else(|| "missing".to_string(), |v| v.to_string())
        )));
    }

    let media_type = value
        .get("mediaType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let is_list = media_type.eq_ignore_ascii_case(MANIFEST_LIST_V2)
        || media_type.eq_ignore_ascii_case(OCI_INDEX)
        // OCI documents may omit mediaType; the body shape decides
        || (media_type.is_empty() && value.get("manifests").is_some());
    let is_image = media_type.eq_ignore_ascii_case(MANIFEST_V2)
        || media_type.eq_ignore_ascii_case(OCI_MANIFEST)
        || (media_type.is_empty() && value.get("config").is_some());

    if is_list {
        let list: ManifestList = serde_json::from_value(value)
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;
        Ok(ManifestKind::List(list))
    } else if is_image {
        let manifest: ImageManifest = serde_json::from_value(value)
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;
        Ok(ManifestKind::Image(manifest))
    } else {
        Err(RegistryError::UnsupportedSchema(format!(
            "mediaType {media_type}"
        )))
    }
}

/// Image configuration blob, per the OCI image config schema
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfigBlob {
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub config: Option<RuntimeConfig>,
}

/// The `config` section holding the baked-in runtime environment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default, rename = "Env")]
    pub env: Vec<String>,
}

impl ImageConfigBlob {
    /// Value of one environment variable baked into the image
    pub fn env_value(&self, name: &str) -> Option<String> {
        self.config.as_ref().and_then(|c| env_value(&c.env, name))
    }
}

/// Look up `NAME=value` in a container environment list
pub fn env_value(env: &[String], name: &str) -> Option<String> {
    env.iter().find_map(|entry| {
        entry
            .split_once('=')
            .filter(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    })
}
