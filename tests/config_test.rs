use grabber::Error;
use grabber::config::{ConfigLoader, EngineConfig, MessengerConfig, StoreConfig};
use std::fs;

#[test]
fn defaults_fill_an_empty_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    fs::write(&path, "{}").unwrap();

    let config = ConfigLoader::load(&path).unwrap();
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.rate_limit.max_requests, 3);
    assert_eq!(config.rate_limit.window_seconds, 300);
    assert_eq!(config.max_concurrency, 2);
    assert_eq!(config.max_duration_secs, 900);
    assert_eq!(config.max_file_size_bytes, 100 * 1024 * 1024);
    assert_eq!(config.attempt_backoff_ms, 2000);
    assert_eq!(config.attempt_timeout_secs, 600);
    assert!(config.cleanup_artifacts);
    assert_eq!(config.messenger, MessengerConfig::Console);
}

#[test]
fn loads_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.yaml");
    fs::write(
        &path,
        r#"
rate_limit:
  max_requests: 5
  window_seconds: 60
max_concurrency: 4
cookies:
  instagram: cookies/instagram.txt
analytics:
  type: sqlite
  path: analytics.db
messenger:
  type: webhook
  url: http://localhost:9000/events
"#,
    )
    .unwrap();

    let config = ConfigLoader::load(&path).unwrap();
    assert_eq!(config.rate_limit.max_requests, 5);
    assert_eq!(config.max_concurrency, 4);
    assert_eq!(
        config.cookies.instagram.as_deref(),
        Some("cookies/instagram.txt")
    );
    assert_eq!(
        config.analytics,
        StoreConfig::Sqlite {
            path: "analytics.db".to_string(),
            table: "analytics".to_string(),
        }
    );
    assert_eq!(
        config.messenger,
        MessengerConfig::Webhook {
            url: "http://localhost:9000/events".to_string(),
            timeout_secs: 10,
        }
    );
}

#[test]
fn loads_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.toml");
    fs::write(
        &path,
        r#"
max_duration_secs = 120
extractor_binary = "/usr/local/bin/yt-dlp"

[analytics]
type = "memory"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load(&path).unwrap();
    assert_eq!(config.max_duration_secs, 120);
    assert_eq!(config.extractor_binary, "/usr/local/bin/yt-dlp");
    assert_eq!(config.analytics, StoreConfig::Memory);
}

#[test]
fn child_overrides_parent() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("base.json"),
        r#"{
            "rate_limit": { "max_requests": 10, "window_seconds": 120 },
            "download_dir": "/srv/media",
            "messenger": { "type": "json", "path": "transcript.jsonl" }
        }"#,
    )
    .unwrap();
    let child = dir.path().join("prod.yaml");
    fs::write(
        &child,
        "extends: base.json\nmax_concurrency: 6\nrate_limit:\n  window_seconds: 30\n",
    )
    .unwrap();

    let config = ConfigLoader::load(&child).unwrap();
    assert_eq!(config.max_concurrency, 6);
    assert_eq!(config.rate_limit.max_requests, 10);
    assert_eq!(config.rate_limit.window_seconds, 30);
    assert_eq!(config.download_dir, "/srv/media");
    assert_eq!(
        config.messenger,
        MessengerConfig::Json {
            path: "transcript.jsonl".to_string()
        }
    );
    assert!(config.extends.is_none());
}

#[test]
fn circular_inheritance_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.json"), r#"{ "extends": "b.json" }"#).unwrap();
    fs::write(dir.path().join("b.json"), r#"{ "extends": "a.json" }"#).unwrap();

    let result = ConfigLoader::load(dir.path().join("a.json"));
    match result {
        Err(Error::Config(message)) => assert!(message.contains("Circular inheritance")),
        other => panic!("expected a config error, got {:?}", other),
    }
}

#[test]
fn zero_workers_fail_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    fs::write(&path, r#"{ "max_concurrency": 0 }"#).unwrap();

    assert!(matches!(
        ConfigLoader::load(&path),
        Err(Error::Validation(_))
    ));
}

#[test]
fn nested_rate_limit_is_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    fs::write(&path, r#"{ "rate_limit": { "max_requests": 0 } }"#).unwrap();

    assert!(matches!(
        ConfigLoader::load(&path),
        Err(Error::Validation(_))
    ));
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.ini");
    fs::write(&path, "max_concurrency=2").unwrap();

    assert!(matches!(ConfigLoader::load(&path), Err(Error::Config(_))));
}
