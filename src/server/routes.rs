/// REST routes for the anchor intake.
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use super::AppState;
use crate::anchor::DirectoryBlockAnchorInfo;

/// Error body returned by every route.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ─── Health ──────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    chain: String,
    /// False once the dispatch loop has stopped.
    accepting: bool,
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let accepting = !state.requests.is_closed();
    Json(HealthResponse {
        status: if accepting { "ok" } else { "stopped" },
        version: env!("CARGO_PKG_VERSION"),
        chain: state.chain.clone(),
        accepting,
    })
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

// ─── Anchors ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct QueuedResponse {
    db_height: u32,
    status: &'static str,
}

/// POST /api/anchors: queue a directory block for anchoring.
async fn queue_anchor(
    State(state): State<Arc<AppState>>,
    Json(info): Json<DirectoryBlockAnchorInfo>,
) -> Result<(StatusCode, Json<QueuedResponse>), (StatusCode, Json<ErrorResponse>)> {
    match state.requests.try_send(info) {
        Ok(()) => Ok((
            StatusCode::ACCEPTED,
            Json(QueuedResponse {
                db_height: info.db_height,
                status: "queued",
            }),
        )),
        Err(TrySendError::Full(_)) => {
            warn!(db_height = info.db_height, "Anchor queue full, rejecting request");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "anchor queue is full".into(),
                }),
            ))
        }
        Err(TrySendError::Closed(_)) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "anchor service has stopped".into(),
            }),
        )),
    }
}

pub fn anchor_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/anchors", post(queue_anchor))
}

#[cfg(test)]
mod tests {
    use super::super::build_app;
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn anchor_request(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/anchors")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    fn body_for(db_height: u32) -> String {
        serde_json::json!({
            "db_height": db_height,
            "key_mr": hex::encode([0x3C; 32]),
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_queue_anchor_forwards_request() {
        let (tx, mut rx) = mpsc::channel(4);
        let app = build_app(AppState {
            requests: tx,
            chain: "Bitcoin".into(),
        });

        let resp = app.oneshot(anchor_request(body_for(77))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.db_height, 77);
        assert_eq!(queued.key_mr, [0x3C; 32]);
    }

    #[tokio::test]
    async fn test_queue_anchor_after_stop() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let app = build_app(AppState {
            requests: tx,
            chain: "Bitcoin".into(),
        });

        let resp = app.oneshot(anchor_request(body_for(1))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_queue_anchor_full() {
        let (tx, _rx) = mpsc::channel(1);
        let app = build_app(AppState {
            requests: tx,
            chain: "Bitcoin".into(),
        });

        let first = app.clone().oneshot(anchor_request(body_for(1))).await.unwrap();
        assert_eq!(first.status(), StatusCode::ACCEPTED);
        let second = app.oneshot(anchor_request(body_for(2))).await.unwrap();
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_bad_body_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let app = build_app(AppState {
            requests: tx,
            chain: "Bitcoin".into(),
        });

        let resp = app
            .oneshot(anchor_request(r#"{"db_height": 1, "key_mr": "zz"}"#.into()))
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn test_health() {
        let (tx, _rx) = mpsc::channel(1);
        let app = build_app(AppState {
            requests: tx,
            chain: "Ethereum".into(),
        });

        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
