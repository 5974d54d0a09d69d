//! Version tracking for fleets of containerized tools
//!
//! toolver resolves a tool's version across three tiers and decides
//! whether they agree:
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    Local    │     │   Remote    │     │  Upstream   │
//! │  (runtime)  │     │ (registry)  │     │ (providers) │
//! └──────┬──────┘     └──────┬──────┘     └──────┬──────┘
//!        │                   │                   │
//!        └───────────┬───────┴───────────────────┘
//!                    ▼
//!             ┌─────────────┐     ┌─────────────┐
//!             │   Engine    │────▶│  Comparator │
//!             │ (join+cache)│     │ (sameness)  │
//!             └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`engine`]: the orchestrator producing per-tool reports
//! - [`registry`]: registry client and local runtime inspector
//! - [`upstream`]: pluggable upstream provider framework
//! - [`version`]: data model, comparator and the metadata cache
//! - [`config`]: constants, configuration and well-known paths

pub mod config;
pub mod engine;
pub mod registry;
pub mod upstream;
pub mod version;
