//! Route table: maps every URL path to its handler.

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::api;
use crate::config::ProjectPaths;
use crate::files::{self, StaticFiles};
use crate::http::{add_security_headers, build_cors_layer};
use crate::progress::ProgressStore;

/// Builds the full router over the given project layout.
pub fn build_router(paths: &ProjectPaths, cors_origins: &str, max_upload_size: usize) -> Router {
    let static_files = Arc::new(StaticFiles::new(paths));
    let store = Arc::new(ProgressStore::new(paths.progress_file()));

    Router::new()
        // Static files
        .route("/", get(files::serve_index))
        .route("/assets/{*path}", get(files::serve_asset))
        .route("/data/{*path}", get(files::serve_data))
        .route("/public/{*path}", get(files::serve_public))
        // Progress API
        .route(
            "/progress",
            get(api::get_progress)
                .post(api::set_progress)
                .layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/export", get(api::export_progress))
        .route(
            "/import",
            post(api::import_progress).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .fallback(files::not_found)
        .layer(middleware::from_fn(add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let client_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip().to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(static_files))
        .layer(Extension(store))
        .layer(build_cors_layer(cors_origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{StatusCode, header};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::config::DEFAULT_MAX_UPLOAD_SIZE;

    const BOUNDARY: &str = "progress-test-boundary";

    fn make_app() -> (tempfile::TempDir, ProjectPaths, Router) {
        let temp = tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path().join("project"));
        std::fs::create_dir_all(paths.assets.join("js")).expect("assets");
        std::fs::create_dir_all(&paths.data).expect("data");
        std::fs::create_dir_all(&paths.public).expect("public");
        std::fs::write(paths.index_file(), "<h1>study</h1>").expect("index");
        std::fs::write(paths.assets.join("js/main.js"), "console.log(1);").expect("js");
        std::fs::write(paths.data.join("books.json"), r#"[{"id":1}]"#).expect("books");
        std::fs::write(paths.public.join("notes.txt"), "chapter one").expect("notes");
        std::fs::write(temp.path().join("secret.txt"), "top secret").expect("secret");
        let app = build_router(&paths, "*", DEFAULT_MAX_UPLOAD_SIZE);
        (temp, paths, app)
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.expect("response")
    }

    async fn get(app: &Router, uri: &str) -> Response {
        send(app, Request::get(uri).body(Body::empty()).expect("request")).await
    }

    async fn post_json(app: &Router, uri: &str, body: impl Into<Body>) -> Response {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .expect("request");
        send(app, request).await
    }

    fn multipart_body(field: &str, file_name: Option<&str>, contents: &[u8]) -> Vec<u8> {
        let file_name = file_name
            .map(|name| format!("; filename=\"{name}\""))
            .unwrap_or_default();
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"{file_name}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn send_multipart(app: &Router, body: Vec<u8>) -> Response {
        let request = Request::post("/import")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request");
        send(app, request).await
    }

    async fn post_multipart(app: &Router, field: &str, contents: &[u8]) -> Response {
        send_multipart(app, multipart_body(field, Some("progress.json"), contents)).await
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).expect("json body")
    }

    #[tokio::test]
    async fn serves_index_page() {
        let (_temp, _paths, app) = make_app();
        let response = get(&app, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html"
        );
        assert_eq!(body_bytes(response).await, b"<h1>study</h1>");
    }

    #[tokio::test]
    async fn missing_index_is_not_found() {
        let (_temp, paths, app) = make_app();
        std::fs::remove_file(paths.index_file()).expect("remove index");
        assert_eq!(get(&app, "/").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_each_static_root() {
        let (_temp, _paths, app) = make_app();

        let asset = get(&app, "/assets/js/main.js").await;
        assert_eq!(asset.status(), StatusCode::OK);
        assert_eq!(body_bytes(asset).await, b"console.log(1);");

        let data = get(&app, "/data/books.json").await;
        assert_eq!(data.status(), StatusCode::OK);
        assert_eq!(
            data.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_bytes(data).await, br#"[{"id":1}]"#);

        let public = get(&app, "/public/notes.txt").await;
        assert_eq!(public.status(), StatusCode::OK);
        assert_eq!(body_bytes(public).await, b"chapter one");
    }

    #[tokio::test]
    async fn missing_static_file_is_not_found() {
        let (_temp, _paths, app) = make_app();
        for uri in ["/assets/js/missing.js", "/public/nothing.pdf", "/assets/js"] {
            assert_eq!(get(&app, uri).await.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn traversal_does_not_escape_root() {
        let (_temp, _paths, app) = make_app();
        for uri in [
            "/assets/../../secret.txt",
            "/assets/%2e%2e/%2e%2e/secret.txt",
            "/public/..%2F..%2Fsecret.txt",
            "/data/../../etc/passwd",
        ] {
            let response = get(&app, uri).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            let body = body_bytes(response).await;
            assert!(!String::from_utf8_lossy(&body).contains("top secret"));
        }
    }

    #[tokio::test]
    async fn impossible_file_names_are_not_found() {
        let (_temp, _paths, app) = make_app();
        let overlong = format!("/public/{}", "x".repeat(300));
        for uri in ["/assets/a%00b", "/data/js%00/main.js", overlong.as_str()] {
            let response = get(&app, uri).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn unchanged_file_returns_not_modified() {
        let (_temp, _paths, app) = make_app();
        let first = get(&app, "/assets/js/main.js").await;
        let etag = first
            .headers()
            .get(header::ETAG)
            .expect("etag")
            .clone();
        assert!(first.headers().contains_key(header::LAST_MODIFIED));

        let request = Request::get("/assets/js/main.js")
            .header(header::IF_NONE_MATCH, etag)
            .body(Body::empty())
            .expect("request");
        let second = send(&app, request).await;
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
        assert!(body_bytes(second).await.is_empty());
    }

    #[tokio::test]
    async fn first_get_creates_empty_progress() {
        let (_temp, paths, app) = make_app();
        assert!(!paths.progress_file().exists());

        let response = get(&app, "/progress").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({}));
        assert!(paths.progress_file().exists());
    }

    #[tokio::test]
    async fn saved_progress_round_trips() {
        let (_temp, paths, app) = make_app();

        let saved = post_json(&app, "/progress", r#"{"ch1": true, "ch2": false}"#).await;
        assert_eq!(saved.status(), StatusCode::OK);
        assert_eq!(body_json(saved).await, json!({"status": "saved"}));

        let loaded = get(&app, "/progress").await;
        assert_eq!(body_json(loaded).await, json!({"ch1": true, "ch2": false}));

        let text = std::fs::read_to_string(paths.progress_file()).expect("read");
        assert!(text.contains("\n    \"ch1\": true"));
    }

    #[tokio::test]
    async fn saving_same_object_twice_is_idempotent() {
        let (_temp, paths, app) = make_app();
        let body = r#"{"topics": {"rust": [1, 2, 3]}, "done": 4}"#;

        post_json(&app, "/progress", body).await;
        let first = std::fs::read(paths.progress_file()).expect("read");
        post_json(&app, "/progress", body).await;
        let second = std::fs::read(paths.progress_file()).expect("read");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn invalid_progress_body_is_server_error() {
        let (_temp, _paths, app) = make_app();
        post_json(&app, "/progress", r#"{"ch1": true}"#).await;

        let response = post_json(&app, "/progress", "{broken").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let loaded = get(&app, "/progress").await;
        assert_eq!(body_json(loaded).await, json!({"ch1": true}));
    }

    #[tokio::test]
    async fn export_before_any_progress_is_not_found() {
        let (_temp, _paths, app) = make_app();
        assert_eq!(get(&app, "/export").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn export_is_attachment_with_file_name() {
        let (_temp, paths, app) = make_app();
        post_json(&app, "/progress", r#"{"ch1": true}"#).await;

        let response = get(&app, "/export").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"progress.json\""
        );
        let on_disk = std::fs::read(paths.progress_file()).expect("read");
        assert_eq!(body_bytes(response).await, on_disk);
    }

    #[tokio::test]
    async fn export_then_import_restores_state() {
        let (_temp, _paths, app) = make_app();
        post_json(&app, "/progress", r#"{"ch1": true, "notes": {"a": "b"}}"#).await;
        let exported = body_bytes(get(&app, "/export").await).await;

        post_json(&app, "/progress", r#"{"reset": true}"#).await;
        let imported = post_multipart(&app, "file", &exported).await;
        assert_eq!(imported.status(), StatusCode::OK);
        assert_eq!(body_json(imported).await, json!({"status": "imported"}));

        let loaded = get(&app, "/progress").await;
        assert_eq!(
            body_json(loaded).await,
            json!({"ch1": true, "notes": {"a": "b"}})
        );
    }

    #[tokio::test]
    async fn import_without_file_field_is_bad_request() {
        let (_temp, _paths, app) = make_app();

        let response = post_multipart(&app, "other", b"{}").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({"error": "Missing file"}));

        let response = post_json(&app, "/import", "{}").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({"error": "Missing file"}));
    }

    #[tokio::test]
    async fn import_ignores_plain_form_value_named_file() {
        let (_temp, paths, app) = make_app();

        let response = send_multipart(&app, multipart_body("file", None, b"{}")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({"error": "Missing file"}));
        assert!(!paths.progress_file().exists());
    }

    #[tokio::test]
    async fn import_over_body_limit_is_payload_too_large() {
        let temp = tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path().join("project"));
        std::fs::create_dir_all(&paths.data).expect("data");
        let app = build_router(&paths, "*", 1024);
        let contents = format!(r#"{{"notes": "{}"}}"#, "a".repeat(4096));

        let response = post_multipart(&app, "file", contents.as_bytes()).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!paths.progress_file().exists());
    }

    #[tokio::test]
    async fn import_with_invalid_json_is_server_error() {
        let (_temp, _paths, app) = make_app();
        let response = post_multipart(&app, "file", b"not json at all").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unknown_route_is_json_not_found() {
        let (_temp, _paths, app) = make_app();
        let response = get(&app, "/nowhere").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({"error": "not found"}));
    }

    #[tokio::test]
    async fn responses_carry_security_headers() {
        let (_temp, _paths, app) = make_app();
        let response = get(&app, "/progress").await;
        assert_eq!(
            response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
            "nosniff"
        );
        assert_eq!(
            response.headers().get(header::X_FRAME_OPTIONS).unwrap(),
            "SAMEORIGIN"
        );
    }
}
