use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fndeploy_build::ArchiveEntry;
use fndeploy_cloud::auth::StaticTokenProvider;
use fndeploy_cloud::client::{
    ClientConfig, CloudFunctionsClient, DeployError, DeployOptions, OperationError,
};
use fndeploy_cloud::http::{HttpError, HttpExecutor, HttpRequest, HttpResponse, Method};
use fndeploy_cloud::observer::{DeployObserver, NoopObserver};
use fndeploy_cloud::poller::{PollError, PollPolicy};
use fndeploy_cloud::rest::ApiError;
use fndeploy_core::{CloudFunction, HttpsTrigger, Trigger};
use mockall::mock;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

mock! {
    Http {}

    impl HttpExecutor for Http {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
    }
}

const BASE_URL: &str = "https://cf.test/v1";
const FUNCTION: &str = "projects/p/locations/l/functions/f";
const UPLOAD_URL: &str = "https://storage.test/upload?sig=abc";

const FUNCTION_JSON: &str = r#"{
    "name": "projects/p/locations/l/functions/f",
    "runtime": "nodejs20",
    "status": "ACTIVE",
    "versionId": "4",
    "httpsTrigger": {"url": "https://l-p.cloudfunctions.net/f"}
}"#;

fn config() -> ClientConfig {
    ClientConfig {
        base_url: BASE_URL.to_owned(),
        project_id: Some("p".to_owned()),
        location: Some("l".to_owned()),
        poll_interval: Duration::from_secs(1),
        retry_backoff: Duration::from_millis(10),
        ..ClientConfig::default()
    }
}

fn client(mock: MockHttp) -> CloudFunctionsClient<MockHttp, StaticTokenProvider> {
    CloudFunctionsClient::with_parts(mock, StaticTokenProvider::new("test-token"), config())
}

fn definition() -> CloudFunction {
    CloudFunction {
        name: "f".to_owned(),
        runtime: "nodejs20".to_owned(),
        trigger: Some(Trigger::Https(HttpsTrigger::default())),
        ..Default::default()
    }
}

fn source_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.js"), "exports.f = () => {};").unwrap();
    std::fs::write(dir.path().join("package.json"), "{}").unwrap();
    dir
}

fn ok(body: &str) -> Result<HttpResponse, HttpError> {
    Ok(HttpResponse::new(200, body))
}

fn is_lookup(r: &HttpRequest) -> bool {
    r.method == Method::Get && r.url == format!("{BASE_URL}/{FUNCTION}")
}

fn is_operation_get(r: &HttpRequest) -> bool {
    r.method == Method::Get && r.url.contains("/operations/")
}

/// Upload URL generation and the PUT itself, which streams the archive
/// while it is still on disk.
fn expect_upload(mock: &mut MockHttp) {
    mock.expect_execute()
        .withf(|r| r.method == Method::Post && r.url.ends_with(":generateUploadUrl"))
        .times(1)
        .returning(|_| ok(&format!(r#"{{"uploadUrl":"{UPLOAD_URL}"}}"#)));
    mock.expect_execute()
        .withf(|r| {
            r.method == Method::Put
                && r.url == UPLOAD_URL
                && r.body_path().is_some_and(|p| p.is_file())
        })
        .times(1)
        .returning(|_| ok(""));
}

fn expect_operation_done(mock: &mut MockHttp) {
    mock.expect_execute()
        .withf(is_operation_get)
        .returning(|_| {
            ok(&format!(
                r#"{{"name":"operations/op-1","done":true,"response":{FUNCTION_JSON}}}"#
            ))
        });
}

#[derive(Default)]
struct Recorder {
    zips: usize,
    included: Vec<String>,
    polls: Vec<u32>,
    new: usize,
    existing: usize,
}

impl DeployObserver for Recorder {
    fn on_zip(&mut self, _source_dir: &Path, _archive: &Path) {
        self.zips += 1;
    }

    fn on_entry(&mut self, entry: ArchiveEntry<'_>) {
        if let ArchiveEntry::Included(path) = entry {
            self.included.push(path.to_owned());
        }
    }

    fn on_poll(&mut self, attempt: u32) {
        self.polls.push(attempt);
    }

    fn on_new(&mut self) {
        self.new += 1;
    }

    fn on_existing(&mut self) {
        self.existing += 1;
    }
}

// ── Orchestrator ──

#[tokio::test]
async fn deploy_creates_when_function_is_absent() {
    let mut mock = MockHttp::new();
    expect_upload(&mut mock);
    mock.expect_execute()
        .withf(is_lookup)
        .times(1)
        .returning(|_| Ok(HttpResponse::new(404, r#"{"error":{"status":"NOT_FOUND"}}"#)));
    mock.expect_execute()
        .withf(|r| r.method == Method::Post && r.url == format!("{BASE_URL}/projects/p/locations/l/functions"))
        .times(1)
        .returning(|r| {
            let body: serde_json::Value =
                serde_json::from_slice(r.body_bytes().unwrap()).unwrap();
            assert_eq!(body["name"], FUNCTION);
            assert_eq!(body["runtime"], "nodejs20");
            assert_eq!(body["sourceUploadUrl"], UPLOAD_URL);
            assert!(body.get("httpsTrigger").is_some());
            ok(r#"{"name":"operations/op-1"}"#)
        });
    mock.expect_execute()
        .withf(|r| r.method == Method::Patch)
        .times(0);
    expect_operation_done(&mut mock);

    let src = source_dir();
    let mut recorder = Recorder::default();
    let function = client(mock)
        .deploy_from_local_source(definition(), src.path(), &DeployOptions::default(), &mut recorder)
        .await
        .unwrap();

    assert_eq!(function.name, FUNCTION);
    assert_eq!(function.runtime, "nodejs20");
    assert_eq!(function.status.as_deref(), Some("ACTIVE"));
    assert_eq!(function.https_url(), Some("https://l-p.cloudfunctions.net/f"));

    assert_eq!(recorder.new, 1);
    assert_eq!(recorder.existing, 0);
    assert_eq!(recorder.zips, 1);
    recorder.included.sort();
    assert_eq!(recorder.included, vec!["index.js", "package.json"]);
    assert_eq!(recorder.polls, vec![1]);
}

#[tokio::test]
async fn deploy_patches_when_function_exists() {
    let mut mock = MockHttp::new();
    expect_upload(&mut mock);
    mock.expect_execute()
        .withf(is_lookup)
        .times(1)
        .returning(|_| ok(FUNCTION_JSON));
    mock.expect_execute()
        .withf(|r| r.method == Method::Patch)
        .times(1)
        .returning(|r| {
            assert_eq!(
                r.url,
                format!(
                    "{BASE_URL}/{FUNCTION}?updateMask=name,sourceUploadUrl,runtime,httpsTrigger"
                )
            );
            ok(r#"{"name":"operations/op-1"}"#)
        });
    mock.expect_execute()
        .withf(|r| r.method == Method::Post && r.url.ends_with("/functions"))
        .times(0);
    expect_operation_done(&mut mock);

    let src = source_dir();
    let mut recorder = Recorder::default();
    let function = client(mock)
        .deploy_from_local_source(definition(), src.path(), &DeployOptions::default(), &mut recorder)
        .await
        .unwrap();

    assert_eq!(function.version_id.as_deref(), Some("4"));
    assert_eq!(recorder.existing, 1);
    assert_eq!(recorder.new, 0);
}

#[tokio::test]
async fn deploy_patches_when_existing_function_is_sparse() {
    let mut mock = MockHttp::new();
    expect_upload(&mut mock);
    mock.expect_execute()
        .withf(is_lookup)
        .times(1)
        .returning(|_| {
            ok(r#"{
                "name": "projects/p/locations/l/functions/f",
                "runtime": "nodejs20",
                "httpsTrigger": {},
                "secretVolumes": [
                    {"mountPath": "/etc/secrets", "projectId": "p", "secret": "s"}
                ]
            }"#)
        });
    mock.expect_execute()
        .withf(|r| r.method == Method::Patch)
        .times(1)
        .returning(|_| ok(r#"{"name":"operations/op-1"}"#));
    mock.expect_execute()
        .withf(|r| r.method == Method::Post && r.url.ends_with("/functions"))
        .times(0);
    mock.expect_execute()
        .withf(is_operation_get)
        .returning(|_| {
            ok(r#"{
                "name": "operations/op-1",
                "done": true,
                "response": {
                    "name": "projects/p/locations/l/functions/f",
                    "runtime": "nodejs20",
                    "versionId": "5",
                    "httpsTrigger": {"url": "https://l-p.cloudfunctions.net/f"},
                    "secretVolumes": [
                        {"mountPath": "/etc/secrets", "projectId": "p", "secret": "s"}
                    ]
                }
            }"#)
        });

    let src = source_dir();
    let mut recorder = Recorder::default();
    let function = client(mock)
        .deploy_from_local_source(definition(), src.path(), &DeployOptions::default(), &mut recorder)
        .await
        .unwrap();

    assert_eq!(recorder.existing, 1);
    assert_eq!(recorder.new, 0);
    assert_eq!(function.version_id.as_deref(), Some("5"));
    assert!(function.secret_volumes.unwrap()[0].versions.is_empty());
}

#[tokio::test]
async fn exists_accepts_any_successful_body() {
    let mut mock = MockHttp::new();
    mock.expect_execute()
        .withf(is_lookup)
        .times(1)
        .returning(|_| ok(r#"{"name":"projects/p/locations/l/functions/f","unknownField":[1,2]}"#));

    assert!(client(mock).exists(FUNCTION).await.unwrap());
}

#[tokio::test]
async fn exists_is_false_on_not_found() {
    let mut mock = MockHttp::new();
    mock.expect_execute()
        .withf(is_lookup)
        .times(1)
        .returning(|_| Ok(HttpResponse::new(404, r#"{"error":{"status":"NOT_FOUND"}}"#)));

    assert!(!client(mock).exists(FUNCTION).await.unwrap());
}

#[tokio::test]
async fn lookup_failure_is_not_treated_as_absent() {
    let mut mock = MockHttp::new();
    expect_upload(&mut mock);
    mock.expect_execute()
        .withf(is_lookup)
        .times(1)
        .returning(|_| Ok(HttpResponse::new(403, "PERMISSION_DENIED")));
    mock.expect_execute()
        .withf(|r| r.method == Method::Post && r.url.ends_with("/functions"))
        .times(0);
    mock.expect_execute()
        .withf(|r| r.method == Method::Patch)
        .times(0);

    let src = source_dir();
    let err = client(mock)
        .deploy_from_local_source(definition(), src.path(), &DeployOptions::default(), &mut NoopObserver)
        .await
        .unwrap_err();

    match err {
        DeployError::Lookup { name, source } => {
            assert_eq!(name, FUNCTION);
            assert_eq!(source.status(), Some(403));
            assert!(source.to_string().contains("PERMISSION_DENIED"));
        }
        other => panic!("expected lookup error, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_upload_aborts_and_removes_archive() {
    let mut mock = MockHttp::new();
    mock.expect_execute()
        .withf(|r| r.method == Method::Post && r.url.ends_with(":generateUploadUrl"))
        .returning(|_| ok(&format!(r#"{{"uploadUrl":"{UPLOAD_URL}"}}"#)));
    mock.expect_execute()
        .withf(|r| r.method == Method::Put)
        .times(1)
        .returning(|_| Ok(HttpResponse::new(403, "SignatureDoesNotMatch")));
    mock.expect_execute().withf(is_lookup).times(0);

    let src = source_dir();
    let out = TempDir::new().unwrap();
    let archive = out.path().join("source.zip");
    let options = DeployOptions {
        archive_path: Some(archive.clone()),
        ..Default::default()
    };

    let err = client(mock)
        .deploy_from_local_source(definition(), src.path(), &options, &mut NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Upload { .. }), "got {err:?}");
    assert!(!archive.exists());
}

#[tokio::test]
async fn upload_preparation_failure_is_distinct() {
    let mut mock = MockHttp::new();
    mock.expect_execute()
        .withf(|r| r.method == Method::Post && r.url.ends_with(":generateUploadUrl"))
        .times(1)
        .returning(|_| Ok(HttpResponse::new(500, "backend error")));

    let src = source_dir();
    let err = client(mock)
        .deploy_from_local_source(definition(), src.path(), &DeployOptions::default(), &mut NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::UploadPreparation { .. }), "got {err:?}");
}

#[tokio::test]
async fn missing_source_dir_fails_before_any_request() {
    let mut mock = MockHttp::new();
    mock.expect_execute().times(0);

    let out = TempDir::new().unwrap();
    let err = client(mock)
        .deploy_from_local_source(
            definition(),
            &out.path().join("missing"),
            &DeployOptions::default(),
            &mut NoopObserver,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Archive { .. }), "got {err:?}");
}

#[tokio::test]
async fn operation_error_surfaces_provider_message() {
    let mut mock = MockHttp::new();
    expect_upload(&mut mock);
    mock.expect_execute()
        .withf(is_lookup)
        .returning(|_| Ok(HttpResponse::new(404, "")));
    mock.expect_execute()
        .withf(|r| r.method == Method::Post && r.url.ends_with("/functions"))
        .times(1)
        .returning(|_| ok(r#"{"name":"operations/op-1"}"#));
    mock.expect_execute()
        .withf(is_operation_get)
        .times(1)
        .returning(|_| {
            ok(r#"{"name":"operations/op-1","done":true,"error":{"code":9,"message":"conflict"}}"#)
        });

    let src = source_dir();
    let err = client(mock)
        .deploy_from_local_source(definition(), src.path(), &DeployOptions::default(), &mut NoopObserver)
        .await
        .unwrap_err();

    match err {
        DeployError::Create {
            source:
                OperationError::Poll {
                    source: PollError::OperationFailed { code, message },
                },
            ..
        } => {
            assert_eq!(code, 9);
            assert_eq!(message, "conflict");
        }
        other => panic!("expected operation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn operation_without_function_is_an_error() {
    let mut mock = MockHttp::new();
    mock.expect_execute()
        .withf(|r| r.method == Method::Post && r.url.ends_with("/functions"))
        .returning(|_| ok(r#"{"name":"operations/op-1"}"#));
    mock.expect_execute()
        .withf(is_operation_get)
        .returning(|_| ok(r#"{"name":"operations/op-1","done":true}"#));

    let err = client(mock)
        .create(
            &definition(),
            &PollPolicy::default(),
            &CancellationToken::new(),
            &mut NoopObserver,
        )
        .await
        .unwrap_err();

    assert!(
        err.to_string().starts_with("failed to create function"),
        "got {err}"
    );
    match err {
        DeployError::Create { source, .. } => assert_eq!(
            source.to_string(),
            "create operation result did not include function"
        ),
        other => panic!("expected create error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn create_polls_until_done() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut mock = MockHttp::new();
    mock.expect_execute()
        .withf(|r| r.method == Method::Post && r.url.ends_with("/functions"))
        .returning(|_| ok(r#"{"name":"operations/op-1"}"#));
    mock.expect_execute()
        .withf(|r| r.method == Method::Get && r.url == format!("{BASE_URL}/operations/op-1"))
        .times(3)
        .returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                ok(r#"{"name":"operations/op-1","done":false}"#)
            } else {
                ok(&format!(
                    r#"{{"name":"operations/op-1","done":true,"response":{FUNCTION_JSON}}}"#
                ))
            }
        });

    let mut recorder = Recorder::default();
    let start = tokio::time::Instant::now();
    let function = client(mock)
        .create(
            &definition(),
            &PollPolicy::unbounded(Duration::from_secs(5)),
            &CancellationToken::new(),
            &mut recorder,
        )
        .await
        .unwrap();

    assert_eq!(function.name, FUNCTION);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(recorder.polls, vec![1, 2, 3]);
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

// ── Delete ──

#[tokio::test]
async fn delete_waits_for_operation() {
    let mut mock = MockHttp::new();
    mock.expect_execute()
        .withf(|r| r.method == Method::Delete && r.url == format!("{BASE_URL}/{FUNCTION}"))
        .times(1)
        .returning(|_| ok(r#"{"name":"operations/op-del"}"#));
    mock.expect_execute()
        .withf(|r| r.method == Method::Get && r.url.ends_with("/operations/op-del"))
        .times(1)
        .returning(|_| {
            ok(r#"{"name":"operations/op-del","done":true,"response":{"@type":"type.googleapis.com/google.protobuf.Empty"}}"#)
        });

    client(mock)
        .delete("f", &PollPolicy::default(), &CancellationToken::new(), &mut NoopObserver)
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_rejects_malformed_name() {
    let mut mock = MockHttp::new();
    mock.expect_execute().times(0);

    let err = client(mock)
        .delete(
            "projects/p/functions/f",
            &PollPolicy::default(),
            &CancellationToken::new(),
            &mut NoopObserver,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::ResourceName { .. }), "got {err:?}");
}

// ── Transport ──

#[tokio::test]
async fn api_requests_carry_auth_and_user_agent() {
    let mut mock = MockHttp::new();
    mock.expect_execute()
        .times(1)
        .withf(|r| {
            r.header_value("authorization") == Some("Bearer test-token")
                && r.header_value("accept") == Some("application/json")
                && r.header_value("user-agent")
                    .is_some_and(|ua| ua.starts_with("fndeploy/"))
        })
        .returning(|_| ok(FUNCTION_JSON));

    let function = client(mock).get(FUNCTION).await.unwrap();
    assert!(function.is_some());
}

#[tokio::test]
async fn upload_streams_zip_from_disk_without_bearer() {
    let out = TempDir::new().unwrap();
    let archive = out.path().join("source.zip");
    std::fs::write(&archive, b"PK-bytes").unwrap();
    let expected = archive.clone();

    let mut mock = MockHttp::new();
    mock.expect_execute()
        .times(1)
        .withf(move |r| {
            r.method == Method::Put
                && r.url == UPLOAD_URL
                && r.header_value("content-type") == Some("application/zip")
                && r.header_value("x-goog-content-length-range") == Some("0,104857600")
                && r.header_value("authorization").is_none()
                && r.body_bytes().is_none()
                && r.body_path() == Some(expected.as_path())
        })
        .returning(|_| ok(""));

    client(mock).upload_source(UPLOAD_URL, &archive).await.unwrap();
}

#[tokio::test]
async fn missing_token_blocks_request() {
    let mut mock = MockHttp::new();
    mock.expect_execute().times(0);

    let client = CloudFunctionsClient::with_parts(mock, StaticTokenProvider::default(), config());
    let err = client.get(FUNCTION).await.unwrap_err();

    assert!(matches!(err, ApiError::MissingToken));
    assert!(err.to_string().contains("failed to get auth token"));
}

#[tokio::test(start_paused = true)]
async fn reads_retry_transient_failures() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut mock = MockHttp::new();
    mock.expect_execute()
        .times(3)
        .returning(move |r| match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Err(HttpError::Network {
                method: r.method,
                url: r.url,
                detail: "connection reset".to_owned(),
            }),
            1 => Ok(HttpResponse::new(503, "unavailable")),
            _ => Ok(HttpResponse::new(404, "")),
        });

    let function = client(mock).get(FUNCTION).await.unwrap();

    assert!(function.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn reads_give_up_after_max_retries() {
    let mut mock = MockHttp::new();
    mock.expect_execute()
        .times(4)
        .returning(|_| Ok(HttpResponse::new(503, "unavailable")));

    let err = client(mock).get(FUNCTION).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn writes_are_never_retried() {
    let mut mock = MockHttp::new();
    mock.expect_execute()
        .times(1)
        .returning(|_| Ok(HttpResponse::new(503, "unavailable")));

    let err = client(mock)
        .generate_upload_url("projects/p/locations/l")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn invalid_json_response_is_an_error() {
    let mut mock = MockHttp::new();
    mock.expect_execute()
        .returning(|_| ok("<html>not json</html>"));

    let err = client(mock).get(FUNCTION).await.unwrap_err();
    assert!(matches!(err, ApiError::Decode { .. }), "got {err:?}");
}

#[tokio::test]
async fn operation_name_gets_prefix() {
    let mut mock = MockHttp::new();
    mock.expect_execute()
        .withf(|r| r.url == format!("{BASE_URL}/operations/abc"))
        .times(1)
        .returning(|_| ok(r#"{"name":"operations/abc","done":false}"#));

    let op = client(mock).get_operation("abc").await.unwrap();
    assert!(!op.done);
}

// ── Config ──

#[test]
fn config_from_settings() {
    let settings = fndeploy_core::ClientSettings {
        base_url: "https://example.test/v1/".to_owned(),
        poll_interval_secs: 2,
        deploy_timeout_secs: 10,
        max_retries: 1,
        retry_backoff_ms: 100,
    };
    let config = ClientConfig::from_settings(&settings, Some("p".to_owned()), None);

    assert_eq!(config.base_url, "https://example.test/v1");
    assert_eq!(config.poll_interval, Duration::from_secs(2));
    assert_eq!(config.poll_policy().max_attempts, Some(5));
    assert_eq!(config.max_retries, 1);
    assert_eq!(config.retry_backoff, Duration::from_millis(100));
}

#[test]
fn zero_deploy_timeout_polls_forever() {
    let config = ClientConfig {
        deploy_timeout: Duration::ZERO,
        ..ClientConfig::default()
    };
    assert_eq!(config.poll_policy().max_attempts, None);
}
