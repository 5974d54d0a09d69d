use toolver::version::normalizer::{compare, normalize};
use toolver::version::types::Verdict;

#[test]
fn normalize_is_idempotent() {
    for v in [
        "v1.2.3",
        "1.2.3+build5",
        "4_5_0",
        "  V2.0 ",
        "2.6.0-1+deb11u1",
        "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3",
        "latest",
    ] {
        assert_eq!(normalize(&normalize(v)), normalize(v), "for {v:?}");
    }
}

#[test]
fn compare_is_reflexive() {
    for v in ["v1.2.3", "2.6.0-1", "latest", "2021.04"] {
        assert_eq!(compare(Some(v), Some(v)), Verdict::Match, "for {v:?}");
    }
}

#[test]
fn equivalent_conventions_match() {
    assert_eq!(compare(Some("v1.2.3"), Some("1.2.3")), Verdict::Match);
    assert_eq!(compare(Some("1.2.3+build5"), Some("1.2.3")), Verdict::Match);
    assert_eq!(compare(Some("4_5_0"), Some("4.5.0")), Verdict::Match);
}

#[test]
fn different_numeric_cores_deviate() {
    assert_eq!(compare(Some("1.2.3"), Some("1.2.4")), Verdict::Deviation);
    assert_eq!(compare(Some("1.2"), Some("1.2.3")), Verdict::Deviation);
}

#[test]
fn absence_is_unknown_never_deviation() {
    assert_eq!(compare(None, Some("1.2.3")), Verdict::Unknown);
    assert_eq!(compare(Some("1.2.3"), None), Verdict::Unknown);
    assert_eq!(compare(None, None), Verdict::Unknown);
}

#[test]
fn revision_suffixes_share_the_numeric_core() {
    assert_eq!(
        compare(Some("2.6.0-1+deb11u1"), Some("v2.6.0")),
        Verdict::Match
    );
    assert_eq!(compare(Some("1.2.3-r1"), Some("1.2.3")), Verdict::Match);
}
