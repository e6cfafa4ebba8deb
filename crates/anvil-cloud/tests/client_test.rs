use std::collections::BTreeMap;
use std::path::PathBuf;

use anvil_cloud::http::split_lines;
use anvil_cloud::{
    AnvilClient, Body, Endpoints, HttpError, HttpExecutor, HttpRequest, HttpResponse, Method,
    StreamingResponse,
};
use anvil_core::{
    ArtifactRef, BuildRequest, BuildStream, CacheEntry, CacheStore, ContentHash, FileEntry,
    Manifest, Platform, PlatformError,
};
use futures::StreamExt;
use mockall::mock;
use secrecy::{ExposeSecret, SecretString};

mock! {
    Executor {}

    impl HttpExecutor for Executor {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
        async fn send_streaming(
            &self,
            request: HttpRequest,
        ) -> Result<StreamingResponse, HttpError>;
    }
}

const API: &str = "https://api.test";
const BUILD: &str = "https://build.test";

fn client(mock: MockExecutor) -> AnvilClient<MockExecutor> {
    AnvilClient::with_executor(
        mock,
        Endpoints::new("https://api.test/", "https://build.test"),
        SecretString::from("s3cret"),
        "my-app",
    )
    .with_user_agent("anvil-test/1.0")
}

fn response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: BTreeMap::new(),
        body: body.as_bytes().to_vec(),
    }
}

fn build_request() -> BuildRequest {
    BuildRequest {
        app_name: "my-app".to_owned(),
        app_user: "dev@example.com".to_owned(),
        consumer_user_agent: "anvil-test/1.0".to_owned(),
        buildpack_url: None,
        env: BTreeMap::new(),
        read_cache: true,
        write_cache: true,
        write_slug: true,
        files: Vec::new(),
    }
}

fn streaming(lines: &[&str], headers: &[(&str, &str)]) -> StreamingResponse {
    let lines: Vec<Result<String, HttpError>> =
        lines.iter().map(|l| Ok((*l).to_owned())).collect();
    StreamingResponse {
        status: 200,
        headers: headers
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect(),
        lines: futures::stream::iter(lines).boxed(),
    }
}

// ── Account ──

#[tokio::test]
async fn user_info_authenticates_and_parses_email() {
    let mut mock = MockExecutor::new();
    mock.expect_send()
        .withf(|r| {
            r.method == Method::Get
                && r.url == format!("{API}/account")
                && r.user_agent == "anvil-test/1.0"
                && r.api_key.as_ref().map(|k| k.expose_secret() == "s3cret") == Some(true)
        })
        .times(1)
        .returning(|_| Ok(response(200, r#"{"email":"dev@example.com","id":"u1"}"#)));

    let info = client(mock).user_info().await.unwrap();
    assert_eq!(info.email, "dev@example.com");
}

#[tokio::test]
async fn rejected_request_carries_status_and_detail() {
    let mut mock = MockExecutor::new();
    mock.expect_send()
        .returning(|_| Ok(response(401, "Invalid credentials\n")));

    let err = client(mock).user_info().await.unwrap_err();
    assert!(matches!(
        err,
        PlatformError::Rejected { status: 401, ref detail, .. } if detail == "Invalid credentials"
    ));
}

#[tokio::test]
async fn transport_failure_maps_to_request_error() {
    let mut mock = MockExecutor::new();
    mock.expect_send().returning(|_| {
        Err(HttpError::BodyFile {
            path: PathBuf::from("/missing"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        })
    });

    let err = client(mock)
        .upload(&ContentHash::from_hex("aa"), &PathBuf::from("/missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Request { operation: "file upload", .. }));
}

// ── Files ──

#[tokio::test]
async fn upload_streams_file_and_prefers_location_header() {
    let mut mock = MockExecutor::new();
    mock.expect_send()
        .withf(|r| {
            r.method == Method::Post
                && r.url == format!("{BUILD}/file/abc123")
                && r.body == Body::File(PathBuf::from("/work/Procfile"))
        })
        .returning(|_| {
            let mut resp = response(201, "");
            resp.headers
                .insert("location".to_owned(), "https://blobs.test/abc123".to_owned());
            Ok(resp)
        });

    let remote = client(mock)
        .upload(&ContentHash::from_hex("abc123"), &PathBuf::from("/work/Procfile"))
        .await
        .unwrap();
    assert_eq!(remote, "https://blobs.test/abc123");
}

#[tokio::test]
async fn upload_falls_back_to_file_url() {
    let mut mock = MockExecutor::new();
    mock.expect_send().returning(|_| Ok(response(200, "")));

    let remote = client(mock)
        .upload(&ContentHash::from_hex("ff"), &PathBuf::from("/work/a"))
        .await
        .unwrap();
    assert_eq!(remote, format!("{BUILD}/file/ff"));
}

// ── Cache ──

#[tokio::test]
async fn missing_cache_is_an_empty_snapshot() {
    let mut mock = MockExecutor::new();
    mock.expect_send()
        .withf(|r| r.url == format!("{BUILD}/cache/my-app"))
        .returning(|_| Ok(response(404, "not found")));

    let snapshot = client(mock).snapshot().await.unwrap();
    assert!(snapshot.is_empty());
    assert!(snapshot.previous().is_none());
}

#[tokio::test]
async fn snapshot_decodes_entries_and_previous_index() {
    let mut mock = MockExecutor::new();
    mock.expect_send().returning(|_| {
        Ok(response(
            200,
            r#"{"entries":{"aa":"blob://aa"},"previous":{"Procfile":"aa"}}"#,
        ))
    });

    let snapshot = client(mock).snapshot().await.unwrap();
    assert_eq!(snapshot.lookup(&ContentHash::from_hex("aa")), Some("blob://aa"));
    assert_eq!(
        snapshot.previous().and_then(|p| p.get("Procfile")),
        Some(&ContentHash::from_hex("aa"))
    );
}

#[tokio::test]
async fn snapshot_server_error_is_rejected() {
    let mut mock = MockExecutor::new();
    mock.expect_send().returning(|_| Ok(response(503, "down")));

    let err = client(mock).snapshot().await.unwrap_err();
    assert!(matches!(err, PlatformError::Rejected { status: 503, .. }));
}

#[tokio::test]
async fn record_puts_entry_under_app_cache() {
    let mut mock = MockExecutor::new();
    mock.expect_send()
        .withf(|r| {
            r.method == Method::Put
                && r.url == format!("{BUILD}/cache/my-app/files/aa")
                && r.body == Body::Json(serde_json::json!({ "remote_ref": "blob://aa" }))
        })
        .times(1)
        .returning(|_| Ok(response(204, "")));

    client(mock)
        .record(CacheEntry {
            hash: ContentHash::from_hex("aa"),
            remote_ref: "blob://aa".to_owned(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn record_manifest_sends_path_index() {
    let mut mock = MockExecutor::new();
    mock.expect_send()
        .withf(|r| {
            r.url == format!("{BUILD}/cache/my-app/manifest")
                && r.body == Body::Json(serde_json::json!({ "a.txt": "01", "b.txt": "02" }))
        })
        .times(1)
        .returning(|_| Ok(response(200, "")));

    let manifest = Manifest::new(
        "/work",
        vec![
            FileEntry {
                path: "b.txt".to_owned(),
                hash: ContentHash::from_hex("02"),
                size: 1,
            },
            FileEntry {
                path: "a.txt".to_owned(),
                hash: ContentHash::from_hex("01"),
                size: 1,
            },
        ],
    )
    .unwrap();

    client(mock).record_manifest(&manifest).await.unwrap();
}

// ── Builds ──

#[tokio::test]
async fn build_streams_lines_then_reads_exit_status() {
    let mut mock = MockExecutor::new();
    mock.expect_send_streaming()
        .withf(|r| r.url == format!("{BUILD}/manifest/build") && matches!(r.body, Body::Json(_)))
        .times(1)
        .returning(|_| {
            Ok(streaming(
                &["-----> Fetching app code", "-----> Compiled slug size: 4.2MB"],
                &[
                    ("x-slug-url", "https://slugs.test/s1.tgz"),
                    ("x-exit-url", "https://build.test/exit/42"),
                ],
            ))
        });
    mock.expect_send()
        .withf(|r| r.url == "https://build.test/exit/42" && r.api_key.is_some())
        .times(1)
        .returning(|_| Ok(response(200, "0\n")));

    let client = client(mock);
    let mut build = client.start_build(&build_request()).await.unwrap();

    assert_eq!(
        build.next_line().await.unwrap().as_deref(),
        Some("-----> Fetching app code")
    );
    let exit = build.finish().await.unwrap();

    assert_eq!(exit.status, 0);
    assert_eq!(
        exit.artifact.as_ref().map(ArtifactRef::as_str),
        Some("https://slugs.test/s1.tgz")
    );
}

#[tokio::test]
async fn build_without_exit_url_is_a_protocol_error() {
    let mut mock = MockExecutor::new();
    mock.expect_send_streaming()
        .returning(|_| Ok(streaming(&["output"], &[])));

    let client = client(mock);
    let build = client.start_build(&build_request()).await.unwrap();

    assert!(matches!(
        build.finish().await,
        Err(PlatformError::Protocol { operation: "build status", .. })
    ));
}

#[tokio::test]
async fn build_submission_refused() {
    let mut mock = MockExecutor::new();
    mock.expect_send_streaming().returning(|_| {
        let mut resp = streaming(&[], &[]);
        resp.status = 422;
        Ok(resp)
    });

    let err = client(mock).start_build(&build_request()).await.unwrap_err();
    assert!(matches!(err, PlatformError::Rejected { status: 422, .. }));
}

#[tokio::test]
async fn non_numeric_exit_status_is_rejected() {
    let mut mock = MockExecutor::new();
    mock.expect_send_streaming()
        .returning(|_| Ok(streaming(&[], &[("x-exit-url", "https://build.test/exit/1")])));
    mock.expect_send().returning(|_| Ok(response(200, "running")));

    let client = client(mock);
    let build = client.start_build(&build_request()).await.unwrap();

    assert!(matches!(build.finish().await, Err(PlatformError::Protocol { .. })));
}

// ── Releases ──

#[tokio::test]
async fn release_returns_version_and_web_url() {
    let mut mock = MockExecutor::new();
    mock.expect_send()
        .withf(|r| {
            r.method == Method::Post
                && r.url == format!("{API}/apps/my-app/releases")
                && r.body
                    == Body::Json(serde_json::json!({
                        "slug_url": "https://slugs.test/s1.tgz",
                        "description": "Deployed by CI",
                    }))
        })
        .times(1)
        .returning(|_| Ok(response(201, r#"{"version":"v12"}"#)));
    mock.expect_send()
        .withf(|r| r.method == Method::Get && r.url == format!("{API}/apps/my-app"))
        .times(1)
        .returning(|_| Ok(response(200, r#"{"web_url":"https://my-app.example.com/"}"#)));

    let info = client(mock)
        .release(
            "my-app",
            ArtifactRef::new("https://slugs.test/s1.tgz"),
            Some("Deployed by CI"),
        )
        .await
        .unwrap();

    assert_eq!(info.version, "v12");
    assert_eq!(info.web_url, "https://my-app.example.com/");
}

#[tokio::test]
async fn malformed_release_response_is_a_protocol_error() {
    let mut mock = MockExecutor::new();
    mock.expect_send().returning(|_| Ok(response(200, "<html>")));

    let err = client(mock)
        .release("my-app", ArtifactRef::new("slug"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Protocol { operation: "release", .. }));
}

#[tokio::test]
async fn archive_upload_returns_slug_reference() {
    let mut mock = MockExecutor::new();
    mock.expect_send()
        .withf(|r| {
            r.url == format!("{BUILD}/archive/my-app")
                && r.body == Body::File(PathBuf::from("/tmp/workspace.tar.gz"))
        })
        .returning(|_| Ok(response(200, r#"{"slug_url":"https://slugs.test/a.tgz"}"#)));

    let artifact = client(mock)
        .upload_archive("my-app", &PathBuf::from("/tmp/workspace.tar.gz"))
        .await
        .unwrap();
    assert_eq!(artifact.as_str(), "https://slugs.test/a.tgz");
}

// ── Line splitting ──

#[tokio::test]
async fn split_lines_rechunks_and_strips_carriage_returns() {
    let chunks = futures::stream::iter(vec![
        Ok::<_, HttpError>(b"ab".to_vec()),
        Ok(b"c\nde\r\n".to_vec()),
        Ok(b"\nf".to_vec()),
    ]);

    let lines: Vec<String> = split_lines(chunks)
        .map(|l| l.unwrap())
        .collect()
        .await;

    assert_eq!(lines, vec!["abc", "de", "", "f"]);
}

#[test]
fn endpoints_trim_trailing_slashes() {
    let endpoints = Endpoints::new("https://api.test///", "https://build.test/");
    assert_eq!(endpoints.api_url, "https://api.test");
    assert_eq!(endpoints.build_url, "https://build.test");
}

#[test]
fn request_builders_set_method_and_body() {
    let request = HttpRequest::put("https://x.test").json(serde_json::json!({ "k": 1 }));
    assert_eq!(request.method, Method::Put);
    assert!(matches!(request.body, Body::Json(_)));
    assert!(request.api_key.is_none());
}
