//! HTTP routes and JSON mapping for the administration API.

use axum::body::Body;
use axum::error_handling::HandleErrorLayer;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{BoxError, Json, Router};
use ivory_core::config::ServerSettings;
use ivory_core::services::backup::sanitize_filename;
use ivory_core::{AdminService, BackupDeleted, BackupRestored, IvoryError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::timeout::error::Elapsed;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

type AppState = Arc<AdminService>;

/// Build the router over a shared service.
pub fn router(service: AppState, settings: &ServerSettings) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/tables", get(tables))
        .route("/execute", post(execute))
        .route("/backup/list", get(list_backups))
        .route("/backup/create", post(create_backup))
        .route("/backup/download/{filename}", get(download_backup))
        .route("/backup/delete/{filename}", delete(delete_backup))
        .route("/backup/restore/{filename}", post(restore_backup))
        .route("/tables/delete/all", delete(delete_all_tables))
        .with_state(service);

    let router = match settings.read_timeout {
        Some(timeout) => router.layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(timeout_error))
                .layer(TimeoutLayer::new(timeout)),
        ),
        None => router,
    };

    router.layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        tracing::info_span!(
            "request",
            req_id = %Uuid::new_v4(),
            method = %request.method(),
            uri = %request.uri(),
        )
    }))
}

/// Error response: `{"error": "..."}` with 400 for caller mistakes, 500 otherwise.
pub struct ApiError(IvoryError);

impl From<IvoryError> for ApiError {
    fn from(err: IvoryError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(IvoryError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        tracing::error!(error = %self.0, category = self.0.category(), "Request failed");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Map a failure of the timeout middleware into the JSON error shape.
async fn timeout_error(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        ApiError(IvoryError::internal("request timed out"))
    } else {
        ApiError(IvoryError::internal(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    #[serde(default)]
    query: String,
}

async fn health(State(service): State<AppState>) -> Json<Value> {
    let pool = service.health();
    let status = if pool.is_healthy() { "ok" } else { "degraded" };
    Json(json!({ "status": status, "pool": pool }))
}

async fn tables(State(service): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tables = service.tables().await?;
    Ok(Json(json!({ "tables": tables })))
}

async fn execute(
    State(service): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    tracing::info!(query = %request.query, "Executing query");

    let result = service.execute_query(&request.query).await?;
    Ok(Json(json!({ "result": result })))
}

async fn list_backups(State(service): State<AppState>) -> Result<Json<Value>, ApiError> {
    let backups = service.list_backups().await?;
    Ok(Json(json!({ "backups": backups })))
}

async fn create_backup(State(service): State<AppState>) -> Result<Json<Value>, ApiError> {
    let backup = service.create_backup().await?;
    Ok(Json(json!({ "backup": backup })))
}

async fn download_backup(
    State(service): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = service.download_backup(&filename).await?;
    let name = sanitize_filename(&filename)?.replace(['"', '\\'], "_");

    tracing::info!(filename = %name, size = bytes.len(), "Backup downloaded");
    Ok((
        [
            (header::CONTENT_TYPE, "application/sql".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{name}\"")),
        ],
        bytes,
    )
        .into_response())
}

async fn delete_backup(
    State(service): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<BackupDeleted>, ApiError> {
    service.delete_backup(&filename).await?;
    Ok(Json(BackupDeleted::default()))
}

async fn restore_backup(
    State(service): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<BackupRestored>, ApiError> {
    service.restore_backup(&filename).await?;
    Ok(Json(BackupRestored::default()))
}

async fn delete_all_tables(State(service): State<AppState>) -> Result<Json<Value>, ApiError> {
    service.delete_all_tables().await?;
    Ok(Json(json!({ "message": "All tables deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use ivory_core::{BackupService, ConnectionConfig, ConnectionOptions, ConnectionPool};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;
    use tower::ServiceExt;

    /// Service over a pool that cannot reach any server.
    fn service(backups: impl FnOnce(BackupService) -> BackupService) -> AppState {
        let options = ConnectionOptions { connect_timeout_secs: 1, ..ConnectionOptions::default() };
        let config =
            ConnectionConfig::new("127.0.0.1", "shop", "admin").with_port(1).with_options(options);
        let pool = Arc::new(ConnectionPool::build(config.clone(), None).unwrap());
        Arc::new(AdminService::new(pool, backups(BackupService::new(config, None))))
    }

    fn app(backup_dir: Option<PathBuf>) -> Router {
        router(service(|b| b.with_default_dir(backup_dir)), &ServerSettings::default())
    }

    async fn send(app: Router, method: &str, uri: &str, body: Body) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();
        app.oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_pool() {
        let response = send(app(None), "GET", "/health", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["pool"]["max_size"], 8);
    }

    #[tokio::test]
    async fn test_malformed_execute_body_is_bad_request() {
        let response = send(app(None), "POST", "/execute", Body::from("{not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_database_failure_is_internal_error() {
        let response = send(app(None), "GET", "/tables", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().starts_with("list tables: "));
    }

    #[tokio::test]
    async fn test_backup_list_without_directory_is_bad_request() {
        let response = send(app(None), "GET", "/backup/list", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_backup_list_download_delete() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("shop_backup_b.sql"), b"-- b").unwrap();
        std::fs::write(dir.path().join("shop_backup_a.sql"), b"-- a").unwrap();
        let app = app(Some(dir.path().to_path_buf()));

        let response = send(app.clone(), "GET", "/backup/list", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["backups"][0]["filename"], "shop_backup_a.sql");
        assert_eq!(body["backups"][1]["size"], 4);

        let response =
            send(app.clone(), "GET", "/backup/download/shop_backup_a.sql", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/sql");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"shop_backup_a.sql\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"-- a");

        let response =
            send(app.clone(), "DELETE", "/backup/delete/shop_backup_a.sql", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body, json!({ "message": "Backup deleted successfully", "success": true }));

        let response =
            send(app, "DELETE", "/backup/delete/shop_backup_a.sql", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_download_traversal_stays_in_backup_dir() {
        let dir = tempdir().unwrap();
        let response = send(
            app(Some(dir.path().to_path_buf())),
            "GET",
            "/backup/download/..%2F..%2Fetc%2Fpasswd",
            Body::empty(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("failed to read backup file"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = send(app(None), "GET", "/nope", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_request_times_out_with_json_error() {
        use ivory_core::BackupTools;
        use std::os::unix::fs::PermissionsExt;

        let tools = tempdir().unwrap();
        let backups = tempdir().unwrap();
        let pg_dump = tools.path().join("pg_dump");
        std::fs::write(&pg_dump, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&pg_dump, std::fs::Permissions::from_mode(0o755)).unwrap();

        let state = service(|b| {
            b.with_default_dir(Some(backups.path().to_path_buf()))
                .with_tools(BackupTools { pg_dump, ..BackupTools::default() })
        });
        let settings =
            ServerSettings { read_timeout: Some(Duration::from_millis(200)), ..Default::default() };

        let start = std::time::Instant::now();
        let response = send(router(state, &settings), "POST", "/backup/create", Body::empty()).await;
        assert!(start.elapsed() < Duration::from_secs(4));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = json_body(response).await;
        assert_eq!(body, json!({ "error": "internal error: request timed out" }));
    }

    #[tokio::test]
    async fn test_fast_request_passes_through_timeout() {
        let settings =
            ServerSettings { read_timeout: Some(Duration::from_secs(5)), ..Default::default() };
        let response =
            send(router(service(|b| b), &settings), "GET", "/health", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
