use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};

use crate::dashboard::Dashboard;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub dashboard: Arc<Dashboard>,
    pub static_dir: PathBuf,
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(index))
        .route("/api/repos", get(list_repos))
        .route("/api/repos/{name}", get(get_repo))
        .route("/api/prs", get(list_prs))
        .route("/api/overview", get(overview))
        .route("/api/scan", post(force_scan))
        .route("/static/{*path}", get(serve_static))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let snapshot = state.dashboard.snapshot().await;
    Json(serde_json::json!({
        "status": "ok",
        "repos": snapshot.repos.len(),
        "last_scan": snapshot.last_scan,
    }))
}

async fn list_repos(State(state): State<SharedState>) -> impl IntoResponse {
    let snapshot = state.dashboard.snapshot().await;
    Json(snapshot.repos.clone())
}

async fn get_repo(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.dashboard.snapshot().await;
    match snapshot.find(&name) {
        Some(status) => Ok(Json(status.clone())),
        None => Err(ApiError::NotFound(format!("Repository '{}' not found", name))),
    }
}

async fn list_prs(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.dashboard.snapshot().await.pr_listings())
}

async fn overview(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.dashboard.snapshot().await.overview())
}

/// The cycle runs on its own task so a disconnecting client cannot cancel it.
async fn force_scan(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let dashboard = state.dashboard.clone();
    let report = tokio::spawn(async move { dashboard.run_cycle().await })
        .await
        .map_err(|e| ApiError::Internal(format!("Scan task failed: {}", e)))?;
    Ok(Json(report))
}

async fn index(State(state): State<SharedState>) -> Response {
    let index_path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&index_path).await {
        Ok(content) => Html(content).into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html("<h1>Static files not found</h1>"),
        )
            .into_response(),
    }
}

async fn serve_static(
    State(state): State<SharedState>,
    Path(file_path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Reject path traversal
    if file_path.contains("..") {
        return Err(ApiError::BadRequest("Invalid path".into()));
    }

    let full_path = state.static_dir.join(&file_path);
    if !full_path.is_file() {
        return Err(ApiError::NotFound(format!("Static file not found: {}", file_path)));
    }

    let bytes = tokio::fs::read(&full_path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to read static file: {}", e)))?;
    let mime = mime_guess::from_path(&full_path).first_or_octet_stream();

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime.as_ref().to_string())],
        bytes,
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeGit;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        root: TempDir,
        static_dir: TempDir,
        dashboard: Arc<Dashboard>,
    }

    async fn test_app() -> TestApp {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("tools/widgets/.git")).unwrap();
        std::fs::create_dir_all(root.path().join("docs/handbook/.git")).unwrap();

        let widgets = root.path().join("tools/widgets");
        let git = FakeGit::new();
        git.respond(&widgets, "status --porcelain", "?? scratch.txt")
            .respond(&widgets, "rev-list --left-right --count HEAD...@{upstream}", "1\t0")
            .respond(&widgets, "branch --merged main --no-contains main", "  done-feature");

        let dashboard = Arc::new(Dashboard::new(root.path(), Arc::new(git), None));
        dashboard.run_cycle().await;

        let static_dir = TempDir::new().unwrap();
        let state = Arc::new(AppState {
            dashboard: dashboard.clone(),
            static_dir: static_dir.path().to_path_buf(),
        });
        TestApp {
            router: api_router().with_state(state),
            root,
            static_dir,
            dashboard,
        }
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app().await;
        let response = app.router.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["repos"], 2);
        assert!(body["last_scan"].is_string());
    }

    #[tokio::test]
    async fn test_list_repos() {
        let app = test_app().await;
        let response = app.router.oneshot(get("/api/repos")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let repos: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0]["name"], "handbook");
        assert_eq!(repos[1]["name"], "widgets");
        assert_eq!(repos[1]["category"], "tools");
        assert_eq!(repos[1]["is_dirty"], true);
    }

    #[tokio::test]
    async fn test_get_repo_by_name() {
        let app = test_app().await;
        let response = app.router.oneshot(get("/api/repos/widgets")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let repo: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(repo["name"], "widgets");
        assert_eq!(repo["ahead"], 1);
        assert_eq!(repo["stale_branches"][0], "done-feature");
    }

    #[tokio::test]
    async fn test_get_repo_not_found() {
        let app = test_app().await;
        let response = app.router.oneshot(get("/api/repos/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = body_json(response.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_overview_counts_are_consistent() {
        let app = test_app().await;
        let response = app.router.oneshot(get("/api/overview")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stats: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(stats["total_repos"], 2);
        assert_eq!(stats["dirty_repos"], 1);
        assert_eq!(stats["clean_repos"], 1);
        assert_eq!(stats["repos_ahead"], 1);
        assert_eq!(stats["repos_behind"], 0);
        assert_eq!(stats["total_stale_branches"], 1);
        assert_eq!(stats["total_open_prs"], 0);
    }

    #[tokio::test]
    async fn test_list_prs_empty() {
        let app = test_app().await;
        let response = app.router.oneshot(get("/api/prs")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let prs: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert!(prs.is_empty());
    }

    #[tokio::test]
    async fn test_force_scan_reports_cycle() {
        let app = test_app().await;
        std::fs::remove_dir_all(app.root.path().join("docs/handbook")).unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/api/scan")
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let report: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(report["repos_scanned"], 1);
        assert!(report["scan_duration_ms"].is_u64());
        assert_eq!(report["errors"].as_array().unwrap().len(), 1);
        assert_eq!(app.dashboard.snapshot().await.repos.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_scan_finishes_after_client_disconnects() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("tools/widgets/.git")).unwrap();
        let git = Arc::new(FakeGit::new());
        git.delay("status --porcelain", std::time::Duration::from_secs(2));
        let dashboard = Arc::new(Dashboard::new(root.path(), git.clone(), None));
        let state = Arc::new(AppState {
            dashboard: dashboard.clone(),
            static_dir: root.path().join("static"),
        });
        let router = api_router().with_state(state);

        let request = Request::builder()
            .method("POST")
            .uri("/api/scan")
            .body(Body::empty())
            .unwrap();
        let client = tokio::spawn(router.oneshot(request));
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        client.abort();

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert_eq!(git.finished_for("status --porcelain"), 1);
        assert!(dashboard.snapshot().await.last_scan.is_some());
    }

    #[tokio::test]
    async fn test_index_fallback_without_static_files() {
        let app = test_app().await;
        let response = app.router.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_index_serves_dashboard_page() {
        let app = test_app().await;
        std::fs::write(app.static_dir.path().join("index.html"), "<h1>Repos</h1>").unwrap();
        let response = app.router.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"<h1>Repos</h1>");
    }

    #[tokio::test]
    async fn test_static_file_with_content_type() {
        let app = test_app().await;
        std::fs::write(app.static_dir.path().join("app.js"), "console.log(1);").unwrap();
        let response = app.router.oneshot(get("/static/app.js")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.contains("javascript"));
    }

    #[tokio::test]
    async fn test_static_missing_file_is_404() {
        let app = test_app().await;
        let response = app.router.oneshot(get("/static/missing.css")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_static_route_rejects_path_traversal() {
        let app = test_app().await;
        let response = app
            .router
            .oneshot(get("/static/..%2F..%2Fetc%2Fpasswd"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
