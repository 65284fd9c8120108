//! HTTP endpoint tests driven through the router with `oneshot`.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{
    FakeEngine, dir_entries, multipart_body, multipart_content_type, settled_entries, test_config,
};
use http_body_util::BodyExt;
use pandoc_web::{
    command::build_args,
    config::Config,
    engine::{ConversionJob, Engine, EngineInfo, pandoc::PandocEngine},
    error::ConvertError,
    server::{AppContext, create_router},
};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;
use tower::ServiceExt;

async fn body_bytes(body: Body) -> Vec<u8> {
    body.collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(body: Body) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(body).await).unwrap()
}

fn post_multipart(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(Body::from(body))
        .unwrap()
}

fn app_with(cfg: &Config, engine: Arc<FakeEngine>) -> axum::Router {
    create_router(AppContext::new(cfg.clone(), engine))
}

#[tokio::test]
async fn health_endpoint() {
    let (_tmp, cfg) = test_config();
    let response = app_with(&cfg, Arc::new(FakeEngine::new()))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn check_engine_when_missing_returns_unavailable() {
    let (_tmp, mut cfg) = test_config();
    cfg.engine.executable = "pandoc-web-test-no-such-binary".into();
    let app = create_router(AppContext::new(cfg.clone(), Arc::new(PandocEngine::new(&cfg))));

    let response = app
        .oneshot(Request::get("/api/check-pandoc").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["available"], false);
    assert!(json["error"].is_string());
    assert!(json.get("version").is_none());
}

#[tokio::test]
async fn check_engine_reports_version() {
    let (_tmp, cfg) = test_config();
    let engine = FakeEngine {
        info: Some(EngineInfo::available("3.2")),
        ..Default::default()
    };
    let response = app_with(&cfg, Arc::new(engine))
        .oneshot(Request::get("/api/check-pandoc").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response.into_body()).await;
    assert_eq!(json["available"], true);
    assert_eq!(json["version"], "3.2");
}

#[tokio::test]
async fn formats_endpoint_lists_catalog() {
    let (_tmp, cfg) = test_config();
    let response = app_with(&cfg, Arc::new(FakeEngine::new()))
        .oneshot(Request::get("/api/formats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert!(json["input"].as_array().unwrap().iter().any(|e| e["value"] == "docx"));
    assert!(json["output"].as_array().unwrap().iter().any(|e| e["value"] == "plain"));
}

#[tokio::test]
async fn single_markdown_to_html() {
    let (_tmp, cfg) = test_config();
    let engine = Arc::new(FakeEngine::new());
    let body = multipart_body(
        &[
            ("fromFormat", "markdown"),
            ("toFormat", "html"),
            ("options", r#"{"toc":false}"#),
        ],
        &[("file", "notes.md", "# Title\n\nBody")],
    );

    let response = app_with(&cfg, engine.clone())
        .oneshot(post_multipart("/api/convert", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    assert_eq!(
        headers[header::CONTENT_DISPOSITION].to_str().unwrap(),
        "attachment; filename=\"notes.html\""
    );

    let bytes = body_bytes(response.into_body()).await;
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with("converted[markdown->html]"));
    assert!(text.contains("# Title"));

    let jobs = engine.jobs();
    assert_eq!(jobs.len(), 1);
    let args: Vec<String> = build_args(&jobs[0], &cfg.engine)
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    assert!(args.iter().any(|a| a == "--standalone"));
    assert!(args.iter().any(|a| a == "--self-contained"));
    assert!(!args.iter().any(|a| a.starts_with("--toc")));

    assert!(settled_entries(&cfg.paths.upload_dir).await.is_empty());
    assert!(settled_entries(&cfg.paths.output_dir).await.is_empty());
}

#[tokio::test]
async fn single_conversion_failure_is_json_and_cleaned_up() {
    let (_tmp, cfg) = test_config();
    let body = multipart_body(
        &[("fromFormat", "markdown"), ("toFormat", "html")],
        &[("file", "broken.md", "CORRUPT")],
    );
    let response = app_with(&cfg, Arc::new(FakeEngine::new()))
        .oneshot(post_multipart("/api/convert", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("could not parse"));

    assert!(settled_entries(&cfg.paths.upload_dir).await.is_empty());
    assert!(settled_entries(&cfg.paths.output_dir).await.is_empty());
}

#[tokio::test]
async fn missing_file_is_a_client_error() {
    let (_tmp, cfg) = test_config();
    let body = multipart_body(&[("fromFormat", "markdown"), ("toFormat", "html")], &[]);
    let response = app_with(&cfg, Arc::new(FakeEngine::new()))
        .oneshot(post_multipart("/api/convert", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["error"], "No file provided");
}

#[tokio::test]
async fn empty_file_part_counts_as_no_file() {
    let (_tmp, cfg) = test_config();
    let body = multipart_body(
        &[("fromFormat", "markdown"), ("toFormat", "html")],
        &[("files", "", "")],
    );
    let response = app_with(&cfg, Arc::new(FakeEngine::new()))
        .oneshot(post_multipart("/api/convert-batch", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_format_rejected_before_conversion() {
    let (_tmp, cfg) = test_config();
    let engine = Arc::new(FakeEngine::new());
    let body = multipart_body(
        &[("fromFormat", "markdown"), ("toFormat", "html --lua-filter=x.lua")],
        &[("file", "a.md", "hi")],
    );
    let response = app_with(&cfg, engine.clone())
        .oneshot(post_multipart("/api/convert", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("unsupported target format"));
    assert!(engine.jobs().is_empty());
    assert!(settled_entries(&cfg.paths.upload_dir).await.is_empty());
}

#[tokio::test]
async fn malformed_options_rejected() {
    let (_tmp, cfg) = test_config();
    let body = multipart_body(
        &[("fromFormat", "markdown"), ("toFormat", "html"), ("options", "{nope")],
        &[("file", "a.md", "hi")],
    );
    let response = app_with(&cfg, Arc::new(FakeEngine::new()))
        .oneshot(post_multipart("/api/convert", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_upload_rejected() {
    let (_tmp, mut cfg) = test_config();
    cfg.limits.max_file_bytes = 16;
    let big = "x".repeat(64);
    let body = multipart_body(
        &[("fromFormat", "markdown"), ("toFormat", "html")],
        &[("file", "big.md", big.as_str())],
    );
    let response = app_with(&cfg, Arc::new(FakeEngine::new()))
        .oneshot(post_multipart("/api/convert", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(settled_entries(&cfg.paths.upload_dir).await.is_empty());
}

#[tokio::test]
async fn batch_with_corrupt_middle_file() {
    let (_tmp, cfg) = test_config();
    let engine = Arc::new(FakeEngine::new());
    let body = multipart_body(
        &[("fromFormat", "markdown"), ("toFormat", "html"), ("options", "{}")],
        &[
            ("files", "first.md", "# first"),
            ("files", "second.md", "CORRUPT"),
            ("files", "third.md", "# third"),
        ],
    );

    let response = app_with(&cfg, engine.clone())
        .oneshot(post_multipart("/api/convert-batch", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION].to_str().unwrap(),
        "attachment; filename=\"converted-documents.zip\""
    );
    assert_eq!(headers["x-converted-count"], "2");
    assert_eq!(headers["x-failed-count"], "1");

    let bytes = body_bytes(response.into_body()).await;
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let names: Vec<String> = (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect();
    assert_eq!(names, ["first.html", "third.html"]);
    assert_eq!(engine.jobs().len(), 3);

    assert!(settled_entries(&cfg.paths.upload_dir).await.is_empty());
    assert!(settled_entries(&cfg.paths.output_dir).await.is_empty());
}

#[tokio::test]
async fn batch_where_everything_fails_is_still_delivered() {
    let (_tmp, cfg) = test_config();
    let body = multipart_body(
        &[("fromFormat", "markdown"), ("toFormat", "docx")],
        &[("files", "a.md", "CORRUPT"), ("files", "b.md", "CORRUPT")],
    );
    let response = app_with(&cfg, Arc::new(FakeEngine::new()))
        .oneshot(post_multipart("/api/convert-batch", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-converted-count"], "0");
    let bytes = body_bytes(response.into_body()).await;
    let zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(zip.len(), 0);
}

#[tokio::test]
async fn batch_file_count_is_capped() {
    let (_tmp, mut cfg) = test_config();
    cfg.limits.max_batch_files = 2;
    let body = multipart_body(
        &[("fromFormat", "markdown"), ("toFormat", "html")],
        &[
            ("files", "a.md", "a"),
            ("files", "b.md", ""),
            ("files", "c.md", "c"),
        ],
    );
    let engine = Arc::new(FakeEngine::new());
    let response = app_with(&cfg, engine.clone())
        .oneshot(post_multipart("/api/convert-batch", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(engine.jobs().is_empty());
    assert!(settled_entries(&cfg.paths.upload_dir).await.is_empty());
}

#[tokio::test]
async fn dropped_download_still_cleans_up() {
    let (_tmp, cfg) = test_config();
    let body = multipart_body(
        &[("fromFormat", "markdown"), ("toFormat", "html")],
        &[("file", "notes.md", "# Title")],
    );
    let response = app_with(&cfg, Arc::new(FakeEngine::new()))
        .oneshot(post_multipart("/api/convert", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    // The unread body still holds the output.
    assert!(!dir_entries(&cfg.paths.output_dir).is_empty());

    drop(response);

    assert!(settled_entries(&cfg.paths.upload_dir).await.is_empty());
    assert!(settled_entries(&cfg.paths.output_dir).await.is_empty());
}

#[tokio::test]
async fn dropped_batch_download_still_cleans_up() {
    let (_tmp, cfg) = test_config();
    let body = multipart_body(
        &[("fromFormat", "markdown"), ("toFormat", "html")],
        &[("files", "a.md", "alpha"), ("files", "b.md", "beta")],
    );
    let response = app_with(&cfg, Arc::new(FakeEngine::new()))
        .oneshot(post_multipart("/api/convert-batch", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-converted-count"], "2");
    assert!(!dir_entries(&cfg.paths.output_dir).is_empty());

    drop(response.into_body());

    assert!(settled_entries(&cfg.paths.upload_dir).await.is_empty());
    assert!(settled_entries(&cfg.paths.output_dir).await.is_empty());
}

/// Writes its output, then holds the conversion open until released.
struct GatedEngine {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl Engine for GatedEngine {
    fn probe(&self) -> EngineInfo {
        EngineInfo::available("3.1.9")
    }

    fn convert(&self, job: &ConversionJob) -> Result<PathBuf, ConvertError> {
        std::fs::write(&job.output, "partial")?;
        let _ = self.entered.lock().unwrap().send(());
        let _ = self
            .release
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(10));
        Ok(job.output.clone())
    }
}

#[tokio::test]
async fn request_cancelled_mid_conversion_still_cleans_up() {
    let (_tmp, cfg) = test_config();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let engine = GatedEngine {
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    };
    let app = create_router(AppContext::new(cfg.clone(), Arc::new(engine)));
    let body = multipart_body(
        &[("fromFormat", "markdown"), ("toFormat", "html")],
        &[("file", "slow.md", "# slow")],
    );

    let request = tokio::spawn(app.oneshot(post_multipart("/api/convert", body)));
    let entered =
        tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
    assert!(entered.is_ok(), "engine never started");
    assert!(!dir_entries(&cfg.paths.upload_dir).is_empty());
    assert!(!dir_entries(&cfg.paths.output_dir).is_empty());

    // Client goes away while the engine is still running.
    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());
    release_tx.send(()).unwrap();

    assert!(settled_entries(&cfg.paths.upload_dir).await.is_empty());
    assert!(settled_entries(&cfg.paths.output_dir).await.is_empty());
}
