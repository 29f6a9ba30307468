//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the market's download endpoint
//! and run the full crawl cycle end-to-end against a SQLite file.

use market_refresh::config::load_config_with_hash;
use market_refresh::crawler::{crawl, crawl_config_file};
use market_refresh::CrawlError;
use market_refresh::storage::{RunStatus, SqliteStorage, StatusLookup, Storage};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Writes a config file pointing at `download_base` and a database in `dir`
fn write_config(dir: &TempDir, download_base: &str) -> std::path::PathBuf {
    let db_path = dir.path().join("market.db");
    let config_path = dir.path().join("config.toml");
    let contents = format!(
        r#"
[crawler]
page-size = 2
concurrency = 4
request-timeout-secs = 2
connect-timeout-secs = 1

[market]
name = "Market_Test"
download-base = "{}"
use-proxies = false

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"

[output]
database-path = "{}"
"#,
        download_base,
        db_path.display()
    );
    std::fs::write(&config_path, contents).expect("Failed to write config");
    config_path
}

fn seed_packages(config_path: &Path, packages: &[&str]) -> std::path::PathBuf {
    let (config, _) = load_config_with_hash(config_path).expect("Failed to load config");
    let db_path = std::path::PathBuf::from(&config.output.database_path);
    let mut storage =
        SqliteStorage::new(&db_path, Duration::from_secs(5)).expect("Failed to open DB");
    for package in packages {
        storage.insert_package(package).expect("Failed to seed package");
    }
    db_path
}

async fn mount_redirect(server: &MockServer, package: &str, location: &str) {
    Mock::given(method("HEAD"))
        .and(path(format!("/appdown/{}", package)))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", location))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_records_redirects() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_redirect(
        &mock_server,
        "com.example.alpha",
        &format!("{}/files/com.example.alpha_102.apk", base_url),
    )
    .await;
    // Relative targets resolve against the probed URL
    mount_redirect(&mock_server, "com.example.gamma", "/files/com.example.gamma_7.apk").await;
    Mock::given(method("HEAD"))
        .and(path("/appdown/com.example.beta"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, &format!("{}/appdown", base_url));
    let db_path = seed_packages(
        &config_path,
        &[
            "com.example.alpha",
            "com.example.beta",
            "com.example.gamma",
            "com.example.delta_3.apk",
        ],
    );

    let (config, hash) = load_config_with_hash(&config_path).expect("Failed to load config");
    let summary = crawl(config, &hash).await.expect("Crawl failed");

    assert_eq!(summary.identifiers, 4);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.probed, 3);
    assert_eq!(summary.resolved, 2);
    assert_eq!(summary.no_redirect, 1);

    let storage = SqliteStorage::new(&db_path, Duration::from_secs(5)).expect("Failed to open DB");
    match storage.query_status("com.example.alpha", "102").unwrap() {
        StatusLookup::Found { .. } => {}
        StatusLookup::NotFound => panic!("alpha should have a status record"),
    }
    let gamma = storage.status_history("com.example.gamma", "7").unwrap();
    assert_eq!(gamma.len(), 1);
    assert_eq!(
        gamma[0].download_url,
        format!("{}/files/com.example.gamma_7.apk", base_url)
    );
    assert_eq!(
        storage.query_status("com.example.beta", "1").unwrap(),
        StatusLookup::NotFound
    );

    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.resolved_count, 2);
    assert_eq!(run.config_hash, hash);

    // The probe never asked for the already-resolved file name
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests
        .iter()
        .all(|r| !r.url.path().ends_with(".apk")));
}

#[tokio::test]
async fn test_second_run_appends_newer_record() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_redirect(
        &mock_server,
        "com.example.alpha",
        &format!("{}/files/com.example.alpha_5.apk", base_url),
    )
    .await;

    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, &format!("{}/appdown", base_url));
    let db_path = seed_packages(&config_path, &["com.example.alpha"]);

    for _ in 0..2 {
        crawl_config_file(&config_path).await.expect("Crawl failed");
    }

    let storage = SqliteStorage::new(&db_path, Duration::from_secs(5)).unwrap();
    let history = storage.status_history("com.example.alpha", "5").unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].distribution_id > history[1].distribution_id);
    assert_eq!(
        storage.query_latest_distribution_id("com.example.alpha", "5").unwrap(),
        Some(history[0].distribution_id)
    );
    assert_eq!(storage.statistics().unwrap().runs, 2);
}

#[tokio::test]
async fn test_unreachable_market_counts_transport_failures() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, "http://market.invalid/appdown");
    seed_packages(&config_path, &["com.example.alpha", "com.example.beta"]);

    let (config, hash) = load_config_with_hash(&config_path).unwrap();
    let summary = crawl(config, &hash).await.expect("Crawl should survive probe failures");

    assert_eq!(summary.probed, 2);
    assert_eq!(summary.transport_failures, 2);
    assert_eq!(summary.resolved, 0);
}

#[tokio::test]
async fn test_invalid_config_file_is_config_error() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, "ftp://apk.example.com/appdown");

    let result = crawl_config_file(&config_path).await;

    assert!(matches!(result, Err(CrawlError::Config(_))));
}
