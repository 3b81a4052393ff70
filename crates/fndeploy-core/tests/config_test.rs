use fndeploy_core::FndeployConfig;
use tempfile::TempDir;

#[test]
fn load_returns_defaults_when_no_config_file() {
    let tmp = TempDir::new().unwrap();
    let config = FndeployConfig::load(tmp.path()).unwrap();

    assert!(config.project.project_id.is_none());
    assert_eq!(config.project.region, "us-central1");
    assert_eq!(
        config.client.base_url,
        "https://cloudfunctions.googleapis.com/v1"
    );
    assert_eq!(config.client.poll_interval_secs, 5);
    assert_eq!(config.client.deploy_timeout_secs, 300);
    assert_eq!(config.client.max_retries, 3);
    assert_eq!(config.client.retry_backoff_ms, 500);
}

#[test]
fn load_parses_full_config() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[project]
project_id = "my-gcp-project"
region = "asia-northeast1"

[client]
base_url = "http://localhost:8080/v1"
poll_interval_secs = 2
deploy_timeout_secs = 0
max_retries = 5
retry_backoff_ms = 100
"#;
    std::fs::write(tmp.path().join("fndeploy.toml"), toml).unwrap();

    let config = FndeployConfig::load(tmp.path()).unwrap();

    assert_eq!(config.project.project_id.as_deref(), Some("my-gcp-project"));
    assert_eq!(config.project.region, "asia-northeast1");
    assert_eq!(config.client.base_url, "http://localhost:8080/v1");
    assert_eq!(config.client.poll_interval_secs, 2);
    assert_eq!(config.client.deploy_timeout_secs, 0);
    assert_eq!(config.client.max_retries, 5);
    assert_eq!(config.client.retry_backoff_ms, 100);
}

#[test]
fn load_partial_config_fills_defaults() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[project]
project_id = "partial-project"
"#;
    std::fs::write(tmp.path().join("fndeploy.toml"), toml).unwrap();

    let config = FndeployConfig::load(tmp.path()).unwrap();

    assert_eq!(config.project.project_id.as_deref(), Some("partial-project"));
    assert_eq!(config.project.region, "us-central1");
    assert_eq!(config.client.poll_interval_secs, 5);
}

#[test]
fn load_invalid_toml_errors() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("fndeploy.toml"), "[project\nregion = 1").unwrap();

    let err = FndeployConfig::load(tmp.path()).unwrap_err();
    assert!(err.to_string().contains("failed to parse config"), "got: {err}");
}
