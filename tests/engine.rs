//! End-to-end resolution scenarios against a mocked registry

use std::collections::HashMap;
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;
use mockito::ServerGuard;
use serde_json::json;
use tempfile::TempDir;

use toolver::engine::{Engine, EngineOptions};
use toolver::registry::error::InspectError;
use toolver::registry::local::{LocalImage, LocalRuntime};
use toolver::registry::remote::RegistryClient;
use toolver::upstream::ProviderSet;
use toolver::upstream::providers::github::GithubProvider;
use toolver::version::cache::Cache;
use toolver::version::types::{ImageReference, TierOutcome, ToolIdentity, Verdict};

const VERSION_VAR: &str = "TOOL_VERSION";
const META_FILE: &str = "meta.json";

/// Local runtime stub answering with a fixed image
struct StubRuntime {
    image: Option<LocalImage>,
}

#[async_trait::async_trait]
impl LocalRuntime for StubRuntime {
    async fn inspect(
        &self,
        _reference: &ImageReference,
    ) -> Result<Option<LocalImage>, InspectError> {
        Ok(self.image.clone())
    }
}

fn local_image(version: &str, digest: &str) -> LocalImage {
    LocalImage {
        id: Some("sha256:imageid".to_string()),
        version: Some(version.to_string()),
        tags: vec!["cincan/demo:latest".to_string(), "cincan/demo:dev".to_string()],
        repo_digests: vec![format!("cincan/demo@{digest}")],
        size: Some(1000),
    }
}

fn layer_archive(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Mock the full remote resolution path for one repository
async fn mock_remote_image(
    server: &mut ServerGuard,
    repository: &str,
    digest: &str,
    version: &str,
    descriptor: Option<&str>,
) {
    let config_digest = format!("sha256:cfg-{version}");
    let layer_digest = format!("sha256:layer-{version}");

    server.mock("GET", "/v2/").with_status(200).create_async().await;
    server
        .mock(
            "GET",
            format!("/v2/{repository}/manifests/latest").as_str(),
        )
        .with_status(200)
        .with_header("docker-content-digest", digest)
        .with_body(
            json!({
                "schemaVersion": 2,
                "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                "config": {
                    "mediaType": "application/vnd.docker.container.image.v1+json",
                    "size": 100,
                    "digest": config_digest
                },
                "layers": [
                    {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                     "size": 500, "digest": layer_digest}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock(
            "GET",
            format!("/v2/{repository}/blobs/{config_digest}").as_str(),
        )
        .with_status(200)
        .with_body(
            json!({
                "architecture": "amd64",
                "os": "linux",
                "config": {"Env": [format!("{VERSION_VAR}={version}")]},
                "rootfs": {"type": "layers", "diff_ids": []}
            })
            .to_string(),
        )
        .create_async()
        .await;
    let files: Vec<(&str, &str)> = match descriptor {
        Some(content) => vec![("opt/tool/meta.json", content)],
        None => vec![("usr/bin/tool", "binary")],
    };
    server
        .mock(
            "GET",
            format!("/v2/{repository}/blobs/{layer_digest}").as_str(),
        )
        .with_status(200)
        .with_body(layer_archive(&files))
        .create_async()
        .await;
}

fn build_engine(
    server: &ServerGuard,
    cache: Arc<Cache>,
    local: Option<LocalImage>,
) -> Engine {
    let registry = RegistryClient::new(&server.url(), VERSION_VAR, META_FILE);
    let mut providers = ProviderSet::new();
    // Upstream queries go against the same mock server
    providers.register(Arc::new(GithubProvider::new(&server.url(), HashMap::new())));
    Engine::with_parts(
        registry,
        Arc::new(StubRuntime { image: local }),
        providers,
        cache,
        EngineOptions::default(),
    )
}

fn open_cache(dir: &TempDir) -> Arc<Cache> {
    Arc::new(Cache::open(&dir.path().join("metadata.db")).unwrap())
}

#[tokio::test]
async fn same_digest_matches_then_remote_drift_deviates_and_stays_cached() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);
    let tool = ToolIdentity::new("demo", "cincan");

    // Local and remote both at digest d1, version 2.0
    mock_remote_image(&mut server, "cincan/demo", "sha256:d1", "2.0", None).await;
    let engine = build_engine(&server, cache, Some(local_image("2.0", "sha256:d1")));

    let report = engine.resolve_tool(&tool, "latest", false).await;
    assert_eq!(report.verdicts.local_remote, Verdict::Match);
    assert_eq!(report.remote.version(), Some("2.0"));

    // Remote moves to digest d2 with version 2.1 while local stays at 2.0.
    // Within the TTL window the drift is only visible with force_refresh.
    server.reset();
    mock_remote_image(&mut server, "cincan/demo", "sha256:d2", "2.1", None).await;

    let cached = engine.resolve_tool(&tool, "latest", false).await;
    assert_eq!(cached.remote.version(), Some("2.0"), "served from cache");
    assert_eq!(cached.verdicts.local_remote, Verdict::Match);

    let refreshed = engine.resolve_tool(&tool, "latest", true).await;
    assert_eq!(refreshed.remote.version(), Some("2.1"));
    assert_eq!(refreshed.verdicts.local_remote, Verdict::Deviation);

    // Re-running within the TTL window keeps reporting the cached pair
    // without any registry traffic
    server.reset();
    let within_ttl = engine.resolve_tool(&tool, "latest", false).await;
    assert_eq!(within_ttl.remote.version(), Some("2.1"));
    assert_eq!(within_ttl.local.version(), Some("2.0"));
    assert_eq!(within_ttl.verdicts.local_remote, Verdict::Deviation);
}

#[tokio::test]
async fn descriptor_drives_upstream_resolution_and_verdict() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);
    let tool = ToolIdentity::new("demo", "cincan");

    let descriptor = json!({
        "upstreams": [
            {"repository": "demo", "tool": "demo", "provider": "github",
             "method": "release", "origin": true}
        ]
    })
    .to_string();
    mock_remote_image(&mut server, "cincan/demo", "sha256:d1", "2.0", Some(&descriptor)).await;
    server
        .mock("GET", "/repos/demo/demo/releases/latest")
        .with_status(200)
        .with_body(r#"{"tag_name": "v2.0"}"#)
        .create_async()
        .await;

    let engine = build_engine(&server, cache, Some(local_image("2.0", "sha256:d1")));
    let report = engine.resolve_tool(&tool, "latest", false).await;

    assert_eq!(report.upstreams.len(), 1);
    assert_eq!(
        report.upstreams[0].outcome.record().unwrap().raw.as_deref(),
        Some("v2.0")
    );
    // v2.0 vs 2.0: canonical forms agree
    assert_eq!(report.verdicts.remote_upstream, Verdict::Match);
    assert_eq!(report.verdicts.local_remote, Verdict::Match);
}

#[tokio::test]
async fn missing_descriptor_means_empty_upstreams_and_unknown_verdict() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);

    let with_descriptor = json!({
        "upstreams": [
            {"repository": "demo", "tool": "demo", "provider": "github",
             "method": "release", "origin": true}
        ]
    })
    .to_string();
    mock_remote_image(&mut server, "cincan/demo", "sha256:d1", "2.0", Some(&with_descriptor)).await;
    mock_remote_image(&mut server, "cincan/bare", "sha256:d9", "1.5", None).await;
    server
        .mock("GET", "/repos/demo/demo/releases/latest")
        .with_status(200)
        .with_body(r#"{"tag_name": "v2.0"}"#)
        .create_async()
        .await;

    let engine = build_engine(&server, cache, None);
    let tools = vec![
        ToolIdentity::new("bare", "cincan"),
        ToolIdentity::new("demo", "cincan"),
    ];
    let reports = engine.resolve_fleet(&tools, "latest", false).await;

    assert_eq!(reports.len(), 2);
    // Sorted by tool name: cincan/bare first
    let bare = &reports[0];
    assert_eq!(bare.tool, "cincan/bare");
    assert!(bare.upstreams.is_empty());
    assert_eq!(bare.verdicts.remote_upstream, Verdict::Unknown);
    assert_eq!(bare.remote.version(), Some("1.5"));

    // The descriptor-carrying tool in the same batch is unaffected
    let demo = &reports[1];
    assert_eq!(demo.tool, "cincan/demo");
    assert_eq!(demo.verdicts.remote_upstream, Verdict::Match);
}

#[tokio::test]
async fn legacy_manifest_schema_degrades_remote_tier_without_blob_fetches() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);
    let tool = ToolIdentity::new("legacy", "cincan");

    server.mock("GET", "/v2/").with_status(200).create_async().await;
    server
        .mock("GET", "/v2/cincan/legacy/manifests/latest")
        .with_status(200)
        .with_body(
            json!({
                "schemaVersion": 1,
                "name": "cincan/legacy",
                "history": [{"v1Compatibility": "{}"}]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let blobs = server
        .mock("GET", mockito::Matcher::Regex("/blobs/".to_string()))
        .expect(0)
        .create_async()
        .await;

    let engine = build_engine(&server, cache, Some(local_image("1.0", "sha256:d1")));
    let report = engine.resolve_tool(&tool, "latest", false).await;

    blobs.assert_async().await;
    match &report.remote {
        TierOutcome::Failed { reason } => {
            assert!(reason.contains("schema"), "reason: {reason}")
        }
        other => panic!("expected failed remote tier, got {other:?}"),
    }
    // The other tiers still resolve
    assert_eq!(report.local.version(), Some("1.0"));
    assert_eq!(report.verdicts.local_remote, Verdict::Unknown);
    assert_eq!(report.verdicts.remote_upstream, Verdict::Unknown);
}

#[tokio::test]
async fn registry_absence_is_reported_as_absent_not_failed() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);
    let tool = ToolIdentity::new("ghost", "cincan");

    server.mock("GET", "/v2/").with_status(200).create_async().await;
    server
        .mock("GET", "/v2/cincan/ghost/manifests/latest")
        .with_status(404)
        .with_body(r#"{"errors": [{"code": "MANIFEST_UNKNOWN"}]}"#)
        .create_async()
        .await;

    let engine = build_engine(&server, cache, None);
    let report = engine.resolve_tool(&tool, "latest", false).await;

    assert!(matches!(report.remote, TierOutcome::Absent { .. }));
    assert!(matches!(report.local, TierOutcome::Absent { .. }));
    assert_eq!(report.verdicts.local_remote, Verdict::Unknown);
}
