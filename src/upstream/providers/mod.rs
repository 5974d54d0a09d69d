//! Concrete upstream provider implementations
//!
//! One module per external source kind. Every provider performs exactly
//! one logical "what is the newest X" query and reports the version in
//! the source's native format; canonicalization happens later in the
//! comparator.

pub mod alpine;
pub mod bitbucket;
pub mod debian;
pub mod github;
pub mod gitlab;
pub mod pypi;

use std::time::Duration;

use reqwest::Client;

use crate::config::{FETCH_TIMEOUT_SECS, USER_AGENT};
use crate::version::normalizer::{normalize, numeric_core};

/// HTTP client shared shape for all providers: identified and time-bounded
pub(crate) fn http_client() -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()
        .expect("Failed to create HTTP client")
}

/// Pick the tag with the highest numeric core from an unordered tag list.
///
/// Tags without any numeric content sort lowest, mirroring how version
/// tags are usually mixed with named tags like `stable` or `nightly`.
pub(crate) fn latest_by_numeric_core<I>(names: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    names
        .into_iter()
        .map(|name| (numeric_core(&normalize(&name)), name))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, name)| name)
}
