//! Container image version sources: remote registry and local runtime
//!
//! # Modules
//!
//! - [`remote`]: Docker Registry HTTP V2 client (manifests, blobs,
//!   layer-scoped file extraction)
//! - [`local`]: local container runtime inspection via the Docker socket
//! - [`manifest`]: registry wire document types
//! - [`error`]: error types for both sources

pub mod error;
pub mod local;
pub mod manifest;
pub mod remote;
