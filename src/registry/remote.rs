//! Docker Registry HTTP V2 client
//!
//! Talks to a container registry to obtain an image's manifest, its
//! configuration blob (the baked-in environment, which carries the tool's
//! self-reported version) and a single named file out of the final
//! filesystem layer — without ever pulling the whole image.

use std::io::Read;
use std::sync::LazyLock;
use std::time::Duration;

use flate2::read::GzDecoder;
use regex::Regex;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tar::Archive;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{FETCH_TIMEOUT_SECS, USER_AGENT};
use crate::registry::error::RegistryError;
use crate::registry::manifest::{
    CONTAINER_CONFIG_V1, ImageConfigBlob, ImageManifest, MANIFEST_ACCEPT, ManifestKind,
    parse_manifest,
};
use crate::version::types::ImageReference;

/// Bounded attempts for transient (network/5xx) failures
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Key/value pairs inside a WWW-Authenticate challenge
static CHALLENGE_FIELDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)[:=][\s"]?([^",]+)"?"#).expect("valid regex"));

/// Everything the registry knows about one image reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteImage {
    pub digest: Option<String>,
    pub compressed_size: u64,
    pub version: Option<String>,
    pub created: Option<String>,
    /// Content of the per-tool metadata descriptor, when the image ships one
    pub descriptor: Option<String>,
}

#[derive(Debug, Clone)]
struct AuthChallenge {
    scheme: String,
    realm: String,
    service: String,
}

#[derive(Debug, Clone)]
enum AuthProbe {
    /// Registry answered without a challenge; requests go out unauthenticated
    Anonymous,
    Challenge(AuthChallenge),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: String,
}

pub struct RegistryClient {
    http: Client,
    registry_root: String,
    version_var: String,
    meta_filename: String,
    /// Memoized auth probe; cleared when a token stops being accepted
    auth: Mutex<Option<AuthProbe>>,
}

impl RegistryClient {
    pub fn new(registry_root: &str, version_var: &str, meta_filename: &str) -> Self {
        Self {
            http: Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
                .build()
                .expect("Failed to create HTTP client"),
            registry_root: registry_root.trim_end_matches('/').to_string(),
            version_var: version_var.to_string(),
            meta_filename: meta_filename.to_string(),
            auth: Mutex::new(None),
        }
    }

    /// Resolve everything the engine needs for the remote tier in one pass:
    /// digest, compressed size, baked-in version and the metadata descriptor.
    pub async fn resolve_image(
        &self,
        reference: &ImageReference,
    ) -> Result<RemoteImage, RegistryError> {
        let (manifest, digest) = self.manifest(reference).await?;
        let config = self
            .image_config(&reference.repository, &manifest.config.digest)
            .await?;
        let version = config.env_value(&self.version_var);

        // A missing or unreadable descriptor only disables upstream
        // checking for this tool; the version signal above still counts.
        let descriptor = match self
            .file_from_last_layer(&reference.repository, &manifest, &self.meta_filename)
            .await
        {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Failed to read metadata descriptor for {}: {}", reference, e);
                None
            }
        };

        Ok(RemoteImage {
            digest,
            compressed_size: manifest.compressed_size(),
            version,
            created: config.created.clone(),
            descriptor,
        })
    }

    /// Fetch the manifest for a reference, resolving a manifest list to its
    /// linux/amd64 image manifest. Returns the manifest together with the
    /// content digest identifying it on the registry.
    pub async fn manifest(
        &self,
        reference: &ImageReference,
    ) -> Result<(ImageManifest, Option<String>), RegistryError> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.registry_root, reference.repository, reference.tag
        );
        let resp = self
            .authorized_get(&reference.repository, &url, MANIFEST_ACCEPT)
            .await?;
        let header_digest = content_digest(&resp);
        let value: Value = resp
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;

        match parse_manifest(value)? {
            ManifestKind::Image(manifest) => Ok((manifest, header_digest)),
            ManifestKind::List(list) => {
                let digest = list
                    .platform_digest("linux", "amd64")
                    .ok_or_else(|| {
                        RegistryError::InvalidResponse(format!(
                            "no linux/amd64 manifest for {reference}"
                        ))
                    })?
                    .to_string();
                debug!("Resolved manifest list for {} to {}", reference, digest);

                let url = format!(
                    "{}/v2/{}/manifests/{}",
                    self.registry_root, reference.repository, digest
                );
                let resp = self
                    .authorized_get(&reference.repository, &url, MANIFEST_ACCEPT)
                    .await?;
                let value: Value = resp
                    .json()
                    .await
                    .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;
                match parse_manifest(value)? {
                    ManifestKind::Image(manifest) => Ok((manifest, Some(digest))),
                    ManifestKind::List(_) => Err(RegistryError::InvalidResponse(
                        "manifest list pointing at another list".to_string(),
                    )),
                }
            }
        }
    }

    /// Fetch the image configuration blob referenced by a manifest
    pub async fn image_config(
        &self,
        repository: &str,
        config_digest: &str,
    ) -> Result<ImageConfigBlob, RegistryError> {
        let url = format!(
            "{}/v2/{}/blobs/{}",
            self.registry_root, repository, config_digest
        );
        let resp = self
            .authorized_get(repository, &url, CONTAINER_CONFIG_V1)
            .await?;
        resp.json()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))
    }

    /// Extract one named file from the manifest's final filesystem layer.
    ///
    /// Only that single layer blob is fetched; `Ok(None)` means the image
    /// carries no such file, which is not an error.
    pub async fn file_from_last_layer(
        &self,
        repository: &str,
        manifest: &ImageManifest,
        filename: &str,
    ) -> Result<Option<String>, RegistryError> {
        let Some(layer) = manifest.layers.last() else {
            return Ok(None);
        };
        let url = format!(
            "{}/v2/{}/blobs/{}",
            self.registry_root, repository, layer.digest
        );
        let resp = self
            .authorized_get(repository, &url, &layer.media_type)
            .await?;
        let bytes = resp.bytes().await?.to_vec();

        let name = filename.to_string();
        tokio::task::spawn_blocking(move || extract_file_from_archive(&bytes, &name))
            .await
            .map_err(|e| RegistryError::Io(std::io::Error::other(e)))?
    }

    /// GET with a pull-scoped token, transparently retrying once with a
    /// fresh token when the registry rejects the first attempt as
    /// unauthorized.
    async fn authorized_get(
        &self,
        repository: &str,
        url: &str,
        accept: &str,
    ) -> Result<Response, RegistryError> {
        let mut authorization = self.pull_token(repository).await?;

        for attempt in 0..2 {
            let mut req = self.http.get(url).header("Accept", accept);
            if let Some(value) = &authorization {
                req = req.header("Authorization", value);
            }
            let resp = self.send_with_retry(req).await?;

            match resp.status() {
                StatusCode::UNAUTHORIZED if attempt == 0 => {
                    debug!("Token rejected for {}, re-authenticating once", repository);
                    *self.auth.lock().await = None;
                    authorization = self.pull_token(repository).await?;
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(RegistryError::Unauthorized(repository.to_string()));
                }
                StatusCode::NOT_FOUND => {
                    return Err(RegistryError::NotFound(repository.to_string()));
                }
                status if status.is_success() => return Ok(resp),
                status => {
                    return Err(RegistryError::InvalidResponse(format!(
                        "Unexpected status {status} for {url}"
                    )));
                }
            }
        }

        Err(RegistryError::Unauthorized(repository.to_string()))
    }

    /// Acquire the Authorization header value for a repository, or None for
    /// registries that never issued a challenge.
    async fn pull_token(&self, repository: &str) -> Result<Option<String>, RegistryError> {
        let AuthProbe::Challenge(challenge) = self.auth_probe().await? else {
            return Ok(None);
        };

        let scope = format!("repository:{repository}:pull");
        let req = self.http.get(&challenge.realm).query(&[
            ("service", challenge.service.as_str()),
            ("scope", scope.as_str()),
        ]);
        let resp = self.send_with_retry(req).await?;
        if !resp.status().is_success() {
            return Err(RegistryError::Unauthorized(repository.to_string()));
        }
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;
        Ok(Some(format!("{} {}", challenge.scheme, body.token)))
    }

    /// Probe the registry root once and remember whether it demands a
    /// bearer-token exchange.
    async fn auth_probe(&self) -> Result<AuthProbe, RegistryError> {
        let mut guard = self.auth.lock().await;
        if let Some(probe) = guard.as_ref() {
            return Ok(probe.clone());
        }

        let url = format!("{}/v2/", self.registry_root);
        let resp = self.send_with_retry(self.http.get(&url)).await?;
        let www_auth = resp
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let probe = if www_auth.is_empty() {
            AuthProbe::Anonymous
        } else {
            let scheme = www_auth.split_whitespace().next().unwrap_or("Bearer");
            let mut fields = std::collections::HashMap::new();
            for capture in CHALLENGE_FIELDS.captures_iter(&www_auth) {
                fields.insert(capture[1].to_string(), capture[2].to_string());
            }
            let realm = fields.remove("realm").ok_or_else(|| {
                RegistryError::InvalidResponse(
                    "WWW-Authenticate challenge without realm".to_string(),
                )
            })?;
            AuthProbe::Challenge(AuthChallenge {
                scheme: scheme.to_string(),
                realm,
                service: fields.remove("service").unwrap_or_default(),
            })
        };

        *guard = Some(probe.clone());
        Ok(probe)
    }

    /// Send a request, retrying bounded times on transient conditions
    /// (connection failures, 5xx). Client errors are returned as-is.
    async fn send_with_retry(&self, req: RequestBuilder) -> Result<Response, RegistryError> {
        let mut last_err: Option<RegistryError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                sleep(Duration::from_millis(
                    RETRY_BASE_DELAY_MS * (1 << (attempt - 1)),
                ))
                .await;
            }
            let Some(req) = req.try_clone() else { break };

            match req.send().await {
                Ok(resp) if resp.status().is_server_error() => {
                    warn!("Registry returned {} (attempt {})", resp.status(), attempt + 1);
                    last_err = Some(RegistryError::InvalidResponse(format!(
                        "Server error {}",
                        resp.status()
                    )));
                }
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    warn!("Registry request failed (attempt {}): {}", attempt + 1, e);
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RegistryError::InvalidResponse("request not sent".to_string())))
    }
}

/// Scan a gzipped tar layer for a single file by name
fn extract_file_from_archive(
    bytes: &[u8],
    filename: &str,
) -> Result<Option<String>, RegistryError> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let is_match = entry
            .path()
            .map(|p| p.file_name() == Some(std::ffi::OsStr::new(filename)))
            .unwrap_or(false);
        if is_match {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            return Ok(Some(content));
        }
    }
    Ok(None)
}

fn content_digest(resp: &Response) -> Option<String> {
    resp.headers()
        .get("docker-content-digest")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
