//! Orchestrator lifecycle tests: PATH override, cached fast path, update
//! checks, degraded fallback, install and pruning. The GitHub API and the
//! download host are both played by a local mock server.

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use iwe_provision::lookup::PathLookup;
use iwe_provision::platform::{self, ArchiveKind};
use iwe_provision::provision::Provisioner;
use iwe_provision::release::ReleaseFetcher;
use iwe_provision::state::StateStore;
use iwe_provision::types::ProvisioningConfig;
use iwe_provision::{ProvisionError, UPSTREAM_REPO};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct NoPathHit;
impl PathLookup for NoPathHit {
    fn find(&self, _binary: &str) -> Option<PathBuf> {
        None
    }
}

struct FixedPathHit(PathBuf);
impl PathLookup for FixedPathHit {
    fn find(&self, _binary: &str) -> Option<PathBuf> {
        Some(self.0.clone())
    }
}

fn provisioner(root: &Path, server: &MockServer, config: ProvisioningConfig) -> Provisioner {
    Provisioner::new(root, config)
        .with_fetcher(ReleaseFetcher::with_api_base(UPSTREAM_REPO, &server.uri()))
        .with_path_lookup(Box::new(NoPathHit))
}

fn binary_name() -> &'static str {
    platform::binary_file_name(&platform::get_system_info().os)
}

fn platform_asset_name(version: &str) -> String {
    let info = platform::get_system_info();
    platform::asset_name(version, &info.os, &info.arch).unwrap()
}

/// Archive bytes in whichever format the current platform downloads,
/// containing the server binary nested under `iwe-{bare version}/`.
fn archive_bytes(version: &str) -> Vec<u8> {
    let info = platform::get_system_info();
    let entry = format!("iwe-{}/{}", version.trim_start_matches('v'), binary_name());
    let data: &[u8] = b"#!/bin/sh\necho iwes\n";

    match ArchiveKind::for_platform(&info.os) {
        ArchiveKind::TarGz => {
            let encoder = GzEncoder::new(Vec::new(), Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, &entry, data).unwrap();
            builder.into_inner().unwrap().finish().unwrap()
        }
        ArchiveKind::Zip => {
            let mut cursor = std::io::Cursor::new(Vec::new());
            {
                let mut writer = zip::ZipWriter::new(&mut cursor);
                writer
                    .start_file(entry, zip::write::FileOptions::default())
                    .unwrap();
                writer.write_all(data).unwrap();
                writer.finish().unwrap();
            }
            cursor.into_inner()
        }
    }
}

/// Mount the releases/latest endpoint and the matching asset download.
async fn mount_release(server: &MockServer, version: &str) {
    let asset = platform_asset_name(version);
    let body = serde_json::json!({
        "tag_name": version,
        "assets": [{
            "name": asset,
            "browser_download_url": format!("{}/download/{}", server.uri(), asset),
        }]
    });
    Mock::given(method("GET"))
        .and(path("/repos/iwe-org/iwe/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/download/{}", asset)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive_bytes(version)))
        .mount(server)
        .await;
}

fn seed_cached_install(root: &Path, version: &str, last_check: i64) -> PathBuf {
    let dir = root.join(format!("iwe-{}", version));
    fs::create_dir_all(&dir).unwrap();
    let binary = dir.join(binary_name());
    fs::write(&binary, b"#!/bin/sh\n").unwrap();

    let store = StateStore::new(root);
    let mut state = store.load().unwrap();
    state.binary_path = Some(binary.clone());
    state.installed_version = Some(version.to_string());
    state.last_update_check = last_check;
    store.save(&state).unwrap();
    binary
}

fn version_dirs(root: &Path) -> Vec<String> {
    let mut dirs: Vec<String> = fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("iwe-"))
        .collect();
    dirs.sort();
    dirs
}

#[tokio::test]
async fn test_path_override_makes_no_network_calls() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let dev_binary = root.path().join("dev-iwes");
    fs::write(&dev_binary, b"#!/bin/sh\n").unwrap();

    let provisioner = provisioner(root.path(), &server, ProvisioningConfig::default())
        .with_path_lookup(Box::new(FixedPathHit(dev_binary.clone())));

    let path = provisioner.provision().await.unwrap();
    assert_eq!(path, dev_binary);

    // The override is persisted, with no managed version attached
    let state = StateStore::new(root.path()).load().unwrap();
    assert_eq!(state.binary_path, Some(dev_binary));
    assert!(state.installed_version.is_none());
}

#[tokio::test]
async fn test_cached_binary_returned_when_check_not_due() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let cached = seed_cached_install(root.path(), "v1.0.0", Utc::now().timestamp_millis());

    let provisioner = provisioner(root.path(), &server, ProvisioningConfig::default());
    assert_eq!(provisioner.provision().await.unwrap(), cached);
}

#[tokio::test]
async fn test_auto_update_disabled_never_checks() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    // Last check far in the past; auto-update off must still skip the fetch
    let cached = seed_cached_install(root.path(), "v1.0.0", 0);

    let config = ProvisioningConfig {
        auto_update: false,
        ..Default::default()
    };
    let provisioner = provisioner(root.path(), &server, config);

    assert_eq!(provisioner.provision().await.unwrap(), cached);
    assert_eq!(provisioner.provision().await.unwrap(), cached);
}

#[tokio::test]
async fn test_fetch_failure_falls_back_to_cache() {
    let server = MockServer::start().await;
    // One fetch, then the recorded timestamp suppresses the next attempt
    Mock::given(method("GET"))
        .and(path("/repos/iwe-org/iwe/releases/latest"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let cached = seed_cached_install(root.path(), "v1.0.0", 0);

    let provisioner = provisioner(root.path(), &server, ProvisioningConfig::default());
    assert_eq!(provisioner.provision().await.unwrap(), cached);

    // The check timestamp advanced even though the fetch failed
    let state = StateStore::new(root.path()).load().unwrap();
    assert!(state.last_update_check > 0);

    // Immediately provisioning again stays on the cached fast path
    assert_eq!(provisioner.provision().await.unwrap(), cached);
}

#[tokio::test]
async fn test_fetch_failure_without_cache_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/iwe-org/iwe/releases/latest"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let provisioner = provisioner(root.path(), &server, ProvisioningConfig::default());

    let err = provisioner.provision().await.unwrap_err();
    assert!(matches!(err, ProvisionError::ProvisioningUnavailable));

    // Even the failed attempt records the check time
    let state = StateStore::new(root.path()).load().unwrap();
    assert!(state.last_update_check > 0);
}

#[tokio::test]
async fn test_missing_platform_asset_surfaced_despite_cache() {
    let server = MockServer::start().await;
    let body = serde_json::json!({ "tag_name": "v9.9.9", "assets": [] });
    Mock::given(method("GET"))
        .and(path("/repos/iwe-org/iwe/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    seed_cached_install(root.path(), "v1.0.0", 0);

    let provisioner = provisioner(root.path(), &server, ProvisioningConfig::default());

    // A registry missing this platform's build is an explicit error, not a
    // silent fallback.
    let err = provisioner.provision().await.unwrap_err();
    assert!(matches!(err, ProvisionError::AssetNotFound(_)));
}

#[tokio::test]
async fn test_fresh_install_end_to_end() {
    let server = MockServer::start().await;
    mount_release(&server, "v2.0.0").await;

    let root = tempfile::tempdir().unwrap();
    let provisioner = provisioner(root.path(), &server, ProvisioningConfig::default());

    let installed = provisioner.provision().await.unwrap();
    assert_eq!(installed, root.path().join("iwe-v2.0.0").join(binary_name()));
    assert!(installed.is_file());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&installed).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    let state = StateStore::new(root.path()).load().unwrap();
    assert_eq!(state.binary_path, Some(installed));
    assert_eq!(state.installed_version.as_deref(), Some("v2.0.0"));
    assert!(state.installed_at.is_some());

    assert_eq!(version_dirs(root.path()), vec!["iwe-v2.0.0".to_string()]);
}

#[tokio::test]
async fn test_update_prunes_superseded_version_dirs() {
    let server = MockServer::start().await;
    mount_release(&server, "v2.0.0").await;

    let root = tempfile::tempdir().unwrap();
    let old = seed_cached_install(root.path(), "v1.0.0", 0);

    let provisioner = provisioner(root.path(), &server, ProvisioningConfig::default());
    let installed = provisioner.provision().await.unwrap();

    assert_ne!(installed, old);
    assert!(!old.exists());
    assert_eq!(version_dirs(root.path()), vec!["iwe-v2.0.0".to_string()]);
}

#[tokio::test]
async fn test_up_to_date_install_is_reused() {
    let server = MockServer::start().await;
    let asset = platform_asset_name("v2.0.0");
    let body = serde_json::json!({
        "tag_name": "v2.0.0",
        "assets": [{
            "name": asset,
            "browser_download_url": format!("{}/download/{}", server.uri(), asset),
        }]
    });
    Mock::given(method("GET"))
        .and(path("/repos/iwe-org/iwe/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    // The fetched version equals the installed one, so nothing is downloaded
    Mock::given(method("GET"))
        .and(path(format!("/download/{}", asset)))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let cached = seed_cached_install(root.path(), "v2.0.0", 0);

    let provisioner = provisioner(root.path(), &server, ProvisioningConfig::default());
    assert_eq!(provisioner.provision().await.unwrap(), cached);
}

#[tokio::test]
async fn test_force_update_reinstalls_regardless_of_interval() {
    let server = MockServer::start().await;
    mount_release(&server, "v2.0.0").await;

    let root = tempfile::tempdir().unwrap();
    // Same version installed and recently checked; a plain provision would
    // take the cached fast path.
    seed_cached_install(root.path(), "v2.0.0", Utc::now().timestamp_millis());

    let dev_binary = root.path().join("dev-iwes");
    fs::write(&dev_binary, b"#!/bin/sh\n").unwrap();

    let provisioner = provisioner(root.path(), &server, ProvisioningConfig::default())
        // A PATH hit must not short-circuit a forced update
        .with_path_lookup(Box::new(FixedPathHit(dev_binary)));

    let installed = provisioner.force_update().await.unwrap();
    assert_eq!(installed, root.path().join("iwe-v2.0.0").join(binary_name()));

    let state = StateStore::new(root.path()).load().unwrap();
    assert_eq!(state.installed_version.as_deref(), Some("v2.0.0"));
}

#[tokio::test]
async fn test_install_failure_falls_back_to_cache() {
    let server = MockServer::start().await;
    let asset = platform_asset_name("v2.0.0");
    let body = serde_json::json!({
        "tag_name": "v2.0.0",
        "assets": [{
            "name": asset,
            "browser_download_url": format!("{}/download/{}", server.uri(), asset),
        }]
    });
    Mock::given(method("GET"))
        .and(path("/repos/iwe-org/iwe/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/download/{}", asset)))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let cached = seed_cached_install(root.path(), "v1.0.0", 0);

    let provisioner = provisioner(root.path(), &server, ProvisioningConfig::default());
    assert_eq!(provisioner.provision().await.unwrap(), cached);

    // The aborted install leaves no empty version directory behind
    assert_eq!(version_dirs(root.path()), vec!["iwe-v1.0.0".to_string()]);
}

#[tokio::test]
async fn test_stale_cached_path_triggers_reinstall() {
    let server = MockServer::start().await;
    mount_release(&server, "v2.0.0").await;

    let root = tempfile::tempdir().unwrap();
    // State points at a binary that no longer exists on disk
    let store = StateStore::new(root.path());
    let mut state = store.load().unwrap();
    state.binary_path = Some(root.path().join("iwe-v2.0.0").join(binary_name()));
    state.installed_version = Some("v2.0.0".to_string());
    state.last_update_check = Utc::now().timestamp_millis();
    store.save(&state).unwrap();

    let provisioner = provisioner(root.path(), &server, ProvisioningConfig::default());
    let installed = provisioner.provision().await.unwrap();
    assert!(installed.is_file());
}
