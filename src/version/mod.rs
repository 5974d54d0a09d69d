//! Version data model, canonicalization and the metadata cache
//!
//! This layer carries everything the resolution tiers share:
//!
//! - [`types`]: tiers, identities, version records and verdicts
//! - [`normalizer`]: canonical form and the sameness comparator
//! - [`cache`]: durable SQLite store with TTL freshness semantics
//! - [`error`]: cache error type

pub mod cache;
pub mod error;
pub mod normalizer;
pub mod types;
