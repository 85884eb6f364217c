#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use http_body_util::BodyExt;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

use meshforge_api::app::build_app;
use meshforge_api::config::ServerConfig;
use meshforge_api::state::AppState;
use meshforge_pipeline::Pipeline;
use meshforge_store::MetadataStore;
use meshforge_upstream::api::GenerationApi;

pub const FORM_BOUNDARY: &str = "XTESTFORM";

/// Build a test `ServerConfig` rooted at `root`.
pub fn test_config(root: &Path, upstream_url: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        upstream_url: upstream_url.to_string(),
        upstream_fallback_boundary: "frame".to_string(),
        storage_root: root.to_path_buf(),
        metadata_file: root.join("metadata.json"),
        thumbnail_command: None,
        thumbnail_size: 256,
        thumbnail_background: "#1e1e1e".to_string(),
        thumbnail_timeout_secs: 60,
        icon_format: "png".to_string(),
    }
}

/// The application under test plus handles to inspect its side effects.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MetadataStore>,
    pub jobs: TaskTracker,
    pub root: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestApp {
    /// Wait for every spawned generation job to finish.
    pub async fn drain(&self) {
        self.jobs.close();
        self.jobs.wait().await;
    }
}

/// Build the full application router, with storage in a fresh temp dir.
///
/// Uses the same `build_app` as `main.rs`, so tests exercise the real
/// middleware stack (CORS, request ID, timeout, tracing, panic recovery).
pub async fn build_test_app(upstream_url: &str) -> TestApp {
    build_test_app_with(upstream_url, |_| {}).await
}

/// Like [`build_test_app`], with a hook to adjust the config first.
pub async fn build_test_app_with(
    upstream_url: &str,
    configure: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let mut config = test_config(&root, upstream_url);
    configure(&mut config);

    let pipeline_config = config.pipeline_config();
    pipeline_config.layout.ensure_dirs().await.unwrap();
    let store = Arc::new(MetadataStore::open(&config.metadata_file).await.unwrap());
    let pipeline = Pipeline::new(Arc::clone(&store), pipeline_config);
    let jobs = TaskTracker::new();

    let state = AppState {
        upstream: Arc::new(GenerationApi::new(config.upstream_url.clone())),
        config: Arc::new(config),
        store: Arc::clone(&store),
        pipeline: Arc::new(pipeline),
        jobs: jobs.clone(),
    };

    TestApp {
        router: build_app(state).unwrap(),
        store,
        jobs,
        root,
        _dir: dir,
    }
}

// ---- requests ----

pub async fn get(app: &TestApp, uri: &str) -> Response {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: &TestApp, uri: &str) -> Response {
    send(app, Method::DELETE, uri, Body::empty()).await
}

async fn send(app: &TestApp, method: Method, uri: &str, body: Body) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

/// One field of a multipart form: name, optional file name, content type, body.
pub struct FormField<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub body: &'a [u8],
}

pub fn form_body(fields: &[FormField<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    for field in fields {
        out.extend_from_slice(format!("--{FORM_BOUNDARY}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", field.name);
        if let Some(file_name) = field.file_name {
            disposition.push_str(&format!("; filename=\"{file_name}\""));
        }
        out.extend_from_slice(disposition.as_bytes());
        out.extend_from_slice(b"\r\n");
        if let Some(ct) = field.content_type {
            out.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(field.body);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{FORM_BOUNDARY}--\r\n").as_bytes());
    out
}

pub async fn post_form(app: &TestApp, uri: &str, fields: &[FormField<'_>]) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={FORM_BOUNDARY}"),
        )
        .body(Body::from(form_body(fields)))
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub fn image_field(body: &[u8]) -> FormField<'_> {
    FormField {
        name: "file",
        file_name: Some("chair.png"),
        content_type: Some("image/png"),
        body,
    }
}

// ---- responses ----

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// JSON events of a relay body, in order.
pub fn relay_events(body: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(body)
        .split("\r\n")
        .filter(|line| line.starts_with('{'))
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// ---- fake upstream ----

/// What the fake upstream saw of each request: field names in order.
pub type Received = Arc<Mutex<Vec<Vec<String>>>>;

#[derive(Clone)]
struct FakeUpstream {
    status: StatusCode,
    content_type: &'static str,
    body: Vec<u8>,
    delay: Duration,
    received: Received,
}

async fn fake_generate(State(fake): State<FakeUpstream>, mut multipart: Multipart) -> Response {
    let mut names = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        names.push(field.name().unwrap_or("").to_string());
        let _ = field.bytes().await;
    }
    fake.received.lock().unwrap().push(names);
    tokio::time::sleep(fake.delay).await;
    (
        fake.status,
        [(header::CONTENT_TYPE, fake.content_type)],
        fake.body.clone(),
    )
        .into_response()
}

/// Serve `body` from a local HTTP server at `/generate`; returns its URL.
pub async fn spawn_upstream(
    status: StatusCode,
    content_type: &'static str,
    body: Vec<u8>,
) -> (String, Received) {
    spawn_slow_upstream(Duration::ZERO, status, content_type, body).await
}

/// Like [`spawn_upstream`], answering only after `delay`.
pub async fn spawn_slow_upstream(
    delay: Duration,
    status: StatusCode,
    content_type: &'static str,
    body: Vec<u8>,
) -> (String, Received) {
    let received: Received = Arc::default();
    let fake = FakeUpstream {
        status,
        content_type,
        body,
        delay,
        received: Arc::clone(&received),
    };
    let router = Router::new()
        .route("/generate", post(fake_generate))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}/generate"), received)
}

/// A URL on which nothing is listening.
pub async fn refused_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/generate")
}

/// File names directly inside `dir` (empty when it does not exist).
pub fn files_in(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

// ---- upstream stream builders ----

pub fn upstream_json(json: &str) -> Vec<u8> {
    format!("--frame\r\nContent-Type: application/json\r\n\r\n{json}\r\n").into_bytes()
}

pub fn upstream_binary(content_type: &str, file_name: Option<&str>, body: &[u8]) -> Vec<u8> {
    let mut out = format!("--frame\r\nContent-Type: {content_type}\r\n").into_bytes();
    if let Some(name) = file_name {
        out.extend_from_slice(
            format!("Content-Disposition: attachment; filename=\"{name}\"\r\n").as_bytes(),
        );
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n");
    out
}

pub fn upstream_terminal() -> Vec<u8> {
    b"--frame--\r\n".to_vec()
}
