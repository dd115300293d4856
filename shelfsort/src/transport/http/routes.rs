//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::service::{Health, HealthSnapshot, ShelfService};
use crate::storage::StorageError;
use crate::version::VersionInfo;

use super::ws::handle_socket;

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: Health,
    pub version: VersionInfo,
    /// Open WebSocket connections.
    pub sessions: usize,
}

impl From<HealthSnapshot> for HealthCheckResponse {
    fn from(snapshot: HealthSnapshot) -> Self {
        Self {
            status: snapshot.state,
            version: snapshot.version,
            sessions: snapshot.sessions,
        }
    }
}

async fn health_check(State(service): State<Arc<ShelfService>>) -> Json<HealthCheckResponse> {
    Json(service.health().into())
}

async fn shutdown(State(service): State<Arc<ShelfService>>) -> impl IntoResponse {
    tracing::info!("Shutdown requested via HTTP");
    service.trigger_shutdown();
    (StatusCode::OK, Json(serde_json::json!({})))
}

async fn websocket(
    State(service): State<Arc<ShelfService>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_failed_upgrade(|e| tracing::warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, service))
}

/// Serve a previously uploaded file back by its identifier.
async fn upload(
    State(service): State<Arc<ShelfService>>,
    Path(file_id): Path<String>,
) -> Response {
    match service.storage().read(&file_id).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&file_id).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response()
        }
        Err(e @ StorageError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
        Err(e @ StorageError::InvalidPath(_)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(file = %file_id, error = %e, "Failed to read upload");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "failed to read upload"})),
            )
                .into_response()
        }
    }
}

pub fn routes(service: Arc<ShelfService>) -> Router {
    Router::new()
        .route("/ws", get(websocket))
        .route("/uploads/{*file_id}", get(upload))
        .route("/health-check", get(health_check))
        .route("/shutdown", post(shutdown))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::service::tests::test_service;

    async fn response_json(response: Response) -> serde_json::Value {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_check_returns_status_and_version() {
        let dir = tempfile::tempdir().unwrap();
        let app = routes(test_service(dir.path()));

        let response = app
            .oneshot(Request::get("/health-check").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "READY");
        assert_eq!(json["version"]["shelfsort"], crate::version::SHELFSORT_VERSION);
        assert_eq!(json["sessions"], 0);
    }

    #[tokio::test]
    async fn health_check_counts_open_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let (_session, _guard) = service.open_session(tx);

        let response = routes(Arc::clone(&service))
            .oneshot(Request::get("/health-check").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response_json(response).await["sessions"], 1);
    }

    #[tokio::test]
    async fn shutdown_triggers_signal() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());
        let rx = service.shutdown_rx();

        let response = routes(Arc::clone(&service))
            .oneshot(Request::post("/shutdown").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(*rx.borrow());

        let response = routes(service)
            .oneshot(Request::get("/health-check").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response_json(response).await["status"], "SHUTTING_DOWN");
    }

    #[tokio::test]
    async fn uploads_serves_stored_file_with_guessed_type() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());
        service
            .storage()
            .save("shop/boots/1.jpg", b"jpeg bytes")
            .await
            .unwrap();

        let response = routes(service)
            .oneshot(
                Request::get("/uploads/shop/boots/1.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"jpeg bytes");
    }

    #[tokio::test]
    async fn uploads_missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = routes(test_service(dir.path()));

        let response = app
            .oneshot(Request::get("/uploads/nope.png").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn uploads_invalid_identifier_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = routes(test_service(dir.path()));

        let response = app
            .oneshot(
                Request::get("/uploads/bad:name.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ws_requires_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let app = routes(test_service(dir.path()));

        let response = app
            .oneshot(Request::get("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
