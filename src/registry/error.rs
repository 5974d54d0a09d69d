use thiserror::Error;

use crate::version::error::CacheError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Layer archive error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unauthorized for repository {0}")]
    Unauthorized(String),

    #[error("Unsupported manifest schema: {0}")]
    UnsupportedSchema(String),

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("Container runtime error: {0}")]
    Runtime(#[from] bollard::errors::Error),
}
