//! Version string canonicalization and sameness comparison
//!
//! The comparator answers one question only: do two version signals refer
//! to the same version? No ordering is ever derived — sources range from
//! semver tags to distro package versions to bare commit hashes, and no
//! universal convention exists to rank them.

use std::sync::LazyLock;

use regex::Regex;

use crate::version::types::Verdict;

/// SHA-1 (40) or SHA-256 (64) commit hashes pass through untouched
static COMMIT_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-fA-F0-9]{40}|[a-fA-F0-9]{64})$").expect("valid regex"));

/// Canonicalize a raw version string for comparison.
///
/// Strips surrounding whitespace, a leading `v`/`V` prefix, build
/// metadata after `+`, and unifies `_` separators to `.`. Commit hashes
/// are only case-folded. Idempotent: `normalize(normalize(v)) == normalize(v)`.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if COMMIT_HASH.is_match(trimmed) {
        return trimmed.to_ascii_lowercase();
    }
    let unprefixed = match trimmed.strip_prefix(['v', 'V']) {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => trimmed,
    };
    let without_build = unprefixed.split('+').next().unwrap_or(unprefixed);
    without_build.replace('_', ".")
}

/// Leading numeric core of a canonical version string.
///
/// The core is the run of dot-separated digit groups before the first `-`
/// qualifier: `2.6.0-1+deb11u1` → `[2, 6, 0]`, `1.2.3` → `[1, 2, 3]`.
/// Returns None when the string starts with no digit group at all
/// (commit hashes, code names).
pub fn numeric_core(canonical: &str) -> Option<Vec<u64>> {
    let head = canonical.split('-').next().unwrap_or(canonical);
    let mut core = Vec::new();
    for segment in head.split('.') {
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            // Oversized groups (dates, serials) would overflow u64 parse
            core.push(segment.parse().ok()?);
        } else {
            // A qualifier glued to a digit group ("0rc1") still contributes
            // its leading digits, so 5.0rc1 and 5.1rc1 keep distinct cores
            let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
            if !digits.is_empty() {
                core.push(digits.parse().ok()?);
            }
            break;
        }
    }
    if core.is_empty() { None } else { Some(core) }
}

/// Compare two version signals for sameness.
///
/// Absence on either side is UNKNOWN — an unresolved tier is never
/// reported as a deviation. Two present values match on canonical
/// equality, or on an identical numeric core when one side carries a
/// qualifier the other lacks (distro revision suffixes). Two different
/// numeric cores never match.
pub fn compare(a: Option<&str>, b: Option<&str>) -> Verdict {
    let (Some(a), Some(b)) = (a, b) else {
        return Verdict::Unknown;
    };
    let ca = normalize(a);
    let cb = normalize(b);
    if ca == cb {
        return Verdict::Match;
    }
    match (numeric_core(&ca), numeric_core(&cb)) {
        (Some(core_a), Some(core_b)) if core_a == core_b => Verdict::Match,
        _ => Verdict::Deviation,
    }
}
