//! Local container runtime inspection
//!
//! Reads the same version signal the registry client extracts remotely,
//! but from images already present on the local runtime. A missing image
//! is legitimate absence, never an error.

#[cfg(test)]
use mockall::automock;

use bollard::Docker;
use tracing::debug;

use crate::registry::error::InspectError;
use crate::registry::manifest::env_value;
use crate::version::types::ImageReference;

/// What the local runtime knows about one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    /// Runtime image id (config digest)
    pub id: Option<String>,
    pub version: Option<String>,
    /// Every tag referencing the same image content; all of them are
    /// version-equivalent for comparison purposes
    pub tags: Vec<String>,
    /// Registry digests the runtime recorded for this image content
    pub repo_digests: Vec<String>,
    pub size: Option<u64>,
}

/// Trait for querying the local container runtime
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait LocalRuntime: Send + Sync {
    /// Inspect an image by reference
    ///
    /// # Returns
    /// * `Ok(Some(image))` - the image exists locally
    /// * `Ok(None)` - not present locally (legitimate absence)
    /// * `Err(InspectError)` - the runtime could not be queried
    async fn inspect(&self, reference: &ImageReference)
    -> Result<Option<LocalImage>, InspectError>;
}

/// Docker-daemon-backed implementation
pub struct DockerInspector {
    docker: Docker,
    version_var: String,
}

impl DockerInspector {
    pub fn connect(version_var: &str) -> Result<Self, InspectError> {
        Ok(Self {
            docker: Docker::connect_with_local_defaults()?,
            version_var: version_var.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl LocalRuntime for DockerInspector {
    async fn inspect(
        &self,
        reference: &ImageReference,
    ) -> Result<Option<LocalImage>, InspectError> {
        let name = reference.to_string();
        let inspect = match self.docker.inspect_image(&name).await {
            Ok(inspect) => inspect,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!("Image {} not present locally", name);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let version = inspect
            .config
            .as_ref()
            .and_then(|c| c.env.as_ref())
            .and_then(|env| env_value(env, &self.version_var));

        Ok(Some(LocalImage {
            id: inspect.id,
            version,
            tags: inspect.repo_tags.unwrap_or_default(),
            repo_digests: inspect.repo_digests.unwrap_or_default(),
            size: inspect.size.and_then(|s| u64::try_from(s).ok()),
        }))
    }
}
