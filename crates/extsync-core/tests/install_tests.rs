//! Integration tests for installing and uninstalling from repositories.

mod common;

use common::TestEnv;
use extsync_core::mirror::frontmatter;
use extsync_core::{ExtSync, ExtensionHost, FailureCategory, FsHost, SyncError, VersionSource};
use std::sync::Arc;

const SAMPLE_MANIFEST: &str = r#"{"id":"sample-ext","name":"Sample Extension","version":"1.2.0"}"#;

fn sample_env() -> TestEnv {
    let env = TestEnv::new();
    env.releases.add_release(
        "acme/sample-ext",
        "1.2.0",
        false,
        &[("manifest.json", SAMPLE_MANIFEST), ("main.js", "module.exports = {};")],
    );
    env
}

#[tokio::test]
async fn test_install_from_release_tag() {
    let env = sample_env();
    let sync = env.build().await;
    sync.startup().await.unwrap();

    let report = sync
        .install_extension("https://github.com/acme/sample-ext.git", Some("1.2.0"))
        .await
        .unwrap();
    assert_eq!(report.id, "sample-ext");
    assert_eq!(report.version, "1.2.0");
    assert_eq!(report.repository, "acme/sample-ext");

    let bundle = env.host.bundle("sample-ext").unwrap();
    assert!(bundle.styles.is_none());
    assert!(env.host.enabled_ids().await.unwrap().contains("sample-ext"));

    let record = sync.registry().get("sample-ext").await.unwrap();
    assert!(record.enabled);
    assert!(record.is_tool_installed());
    let settings = sync.registry().settings().await;
    assert_eq!(
        settings.repo_overrides.get("sample-ext").map(String::as_str),
        Some("acme/sample-ext")
    );
    assert!(settings.installed_by_tool.contains("sample-ext"));

    let doc = sync.mirror_dir().unwrap().join("Sample Extension.md");
    let content = std::fs::read_to_string(doc).unwrap();
    let (fields, _) = frontmatter::parse_document(&content).unwrap().unwrap();
    assert_eq!(fields.id.as_deref(), Some("sample-ext"));
    assert_eq!(fields.repo.as_deref(), Some("acme/sample-ext"));

    let status = sync.statuses().await.remove("sample-ext").unwrap();
    assert_eq!(status.source, VersionSource::Repository);
    assert_eq!(status.has_update, Some(false));
}

#[tokio::test]
async fn test_install_falls_back_to_raw_files() {
    let env = TestEnv::new();
    env.releases
        .add_raw_file("acme/raw-ext", "HEAD", "manifest.json", r#"{"id":"raw-ext","name":"Raw","version":"0.1.0"}"#);
    env.releases
        .add_raw_file("acme/raw-ext", "HEAD", "main.js", "// main");
    env.releases
        .add_raw_file("acme/raw-ext", "HEAD", "styles.css", "body {}");
    let sync = env.build().await;

    let report = sync.install_extension("acme/raw-ext", None).await.unwrap();
    assert_eq!(report.id, "raw-ext");
    assert_eq!(
        env.host.bundle("raw-ext").unwrap().styles.as_deref(),
        Some("body {}")
    );
}

#[tokio::test]
async fn test_install_requires_main_bundle() {
    let env = TestEnv::new();
    env.releases.add_release(
        "acme/broken",
        "1.0.0",
        false,
        &[("manifest.json", r#"{"id":"broken","name":"Broken","version":"1.0.0"}"#)],
    );
    let sync = env.build().await;

    let err = sync.install_extension("acme/broken", None).await.unwrap_err();
    assert!(matches!(err, SyncError::MissingAsset { ref asset } if asset == "main.js"));
    assert_eq!(err.category(), FailureCategory::NotFound);
    assert!(env.host.bundle("broken").is_none());
}

#[tokio::test]
async fn test_install_rejects_manifest_without_id() {
    let env = TestEnv::new();
    env.releases.add_release(
        "acme/anon",
        "1.0.0",
        false,
        &[
            ("manifest.json", r#"{"name":"Anon","version":"1.0.0"}"#),
            ("main.js", "// main"),
        ],
    );
    let sync = env.build().await;

    let err = sync.install_extension("acme/anon", None).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidManifest { ref field } if field == "id"));
}

#[tokio::test]
async fn test_install_rejects_id_leaving_host_root() {
    let env = TestEnv::new();
    env.releases.add_release(
        "acme/evil",
        "1.0.0",
        false,
        &[
            ("manifest.json", r#"{"id":"../../escaped","name":"Evil","version":"1.0.0"}"#),
            ("main.js", "// main"),
        ],
    );
    let root = env.data_dir().join("host");
    std::fs::create_dir_all(&root).unwrap();
    let sync = ExtSync::builder(env.data_dir())
        .host(Arc::new(FsHost::new(&root, common::SELF_ID)))
        .with_official_feed(env.official.clone())
        .with_community_index(env.index.clone())
        .with_release_source(env.releases.clone())
        .build()
        .await
        .unwrap();

    let err = sync.install_extension("acme/evil", None).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidManifest { ref field } if field == "id"));
    assert!(!env.data_dir().join("escaped").exists());
    assert!(!root.join("extensions").exists());
}

#[tokio::test]
async fn test_install_theme_rejects_path_like_name() {
    let env = TestEnv::new();
    env.releases.add_release(
        "acme/evil-theme",
        "1.0.0",
        false,
        &[
            ("manifest.json", r#"{"name":"../Evil","version":"1.0.0"}"#),
            ("theme.css", "body {}"),
        ],
    );
    let sync = env.build().await;

    let err = sync.install_theme("acme/evil-theme", None).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidManifest { ref field } if field == "name"));
    assert!(env.host.theme("../Evil").is_none());
}

#[tokio::test]
async fn test_install_theme_picks_known_stylesheet() {
    let env = TestEnv::new();
    env.releases.add_release(
        "acme/dark",
        "2.0.0",
        false,
        &[
            ("manifest.json", r#"{"name":"Dark","version":"2.0.0"}"#),
            ("themes.css", ".theme-dark {}"),
        ],
    );
    let sync = env.build().await;

    let report = sync.install_theme("acme/dark", None).await.unwrap();
    assert_eq!(report.name, "Dark");
    assert_eq!(env.host.theme("Dark").unwrap().stylesheet, ".theme-dark {}");
}

#[tokio::test]
async fn test_uninstall_removes_everywhere() {
    let env = sample_env();
    env.host.add_simple("other", "1.0.0", true);
    let sync = env.build().await;
    sync.startup().await.unwrap();
    sync.install_extension("acme/sample-ext", None).await.unwrap();

    sync.uninstall("sample-ext").await.unwrap();
    assert!(!sync.registry().contains("sample-ext").await);
    assert!(!sync
        .registry()
        .settings()
        .await
        .installed_by_tool
        .contains("sample-ext"));
    assert!(sync.registry().contains("other").await);
    assert!(env.host.calls().contains(&"uninstall sample-ext".to_string()));
}

#[tokio::test]
async fn test_uninstall_refuses_self() {
    let env = TestEnv::new();
    let sync = env.build().await;
    let err = sync.uninstall(common::SELF_ID).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation { .. }));
}

#[tokio::test]
async fn test_list_release_versions_keeps_api_order() {
    let env = TestEnv::new();
    env.releases.add_release("acme/multi", "2.0.0-rc1", true, &[]);
    env.releases.add_release("acme/multi", "1.0.0", false, &[]);
    let sync = env.build().await;

    let versions = sync.list_release_versions("git@github.com:acme/multi.git").await.unwrap();
    let tags: Vec<(&str, bool)> = versions
        .iter()
        .map(|v| (v.version.as_str(), v.prerelease))
        .collect();
    assert_eq!(tags, vec![("2.0.0-rc1", true), ("1.0.0", false)]);
}
