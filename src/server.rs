use std::net::SocketAddr;
use std::path::Path;
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;
use crate::driver::Inbound;
use crate::types::Snapshot;

/// Read side is a snapshot the driver keeps current; writes are requests
/// queued to the driver.
#[derive(Clone)]
pub struct AppState {
    snapshot: watch::Receiver<Snapshot>,
    requests: mpsc::Sender<Inbound>,
}

#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    #[serde(default)]
    pub serial: String,
}

pub fn router(state: AppState, ui_dir: &Path) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/target", post(post_target))
        .route("/rescan", post(post_rescan))
        .with_state(state);

    let static_svc = ServeDir::new(ui_dir).append_index_html_on_directories(true);

    Router::new()
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(
    bind: SocketAddr,
    ui_dir: &Path,
    snapshot: watch::Receiver<Snapshot>,
    requests: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) -> Result<()> {
    let app = router(AppState { snapshot, requests }, ui_dir);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Serving UI on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let snapshot = app.snapshot.borrow().clone();
    (StatusCode::OK, Json(snapshot))
}

async fn post_target(
    State(app): State<AppState>,
    Json(req): Json<TargetRequest>,
) -> impl IntoResponse {
    let serial = req.serial.trim().to_string();
    if serial.chars().any(char::is_control) {
        return (StatusCode::BAD_REQUEST, "serial contains control characters").into_response();
    }
    queue(&app, Inbound::SetTargetSerial(serial)).await
}

async fn post_rescan(State(app): State<AppState>) -> impl IntoResponse {
    queue(&app, Inbound::Rescan).await
}

async fn queue(app: &AppState, request: Inbound) -> axum::response::Response {
    match app.requests.send(request).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "bridge is shutting down").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LockState, Mode};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn snapshot() -> Snapshot {
        Snapshot {
            device_id: "DEV1".into(),
            mode: Mode::Searching,
            status: "Scanning for ANY Printer...".into(),
            target_serial: String::new(),
            target_address: None,
            serial: None,
            total_pages: 0,
            color_copies: 0,
            mono_copies: 0,
            color_prints: 0,
            mono_prints: 0,
            color_total: 0,
            mono_total: 0,
            total_copies: 0,
            lock: LockState::Unlocked,
        }
    }

    fn app() -> (Router, watch::Sender<Snapshot>, mpsc::Receiver<Inbound>, tempfile::TempDir) {
        let (snap_tx, snap_rx) = watch::channel(snapshot());
        let (req_tx, req_rx) = mpsc::channel(4);
        let dir = tempfile::tempdir().unwrap();
        let router = router(
            AppState {
                snapshot: snap_rx,
                requests: req_tx,
            },
            dir.path(),
        );
        (router, snap_tx, req_rx, dir)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn status_serves_latest_snapshot() {
        let (app, snap_tx, _rx, _dir) = app();
        let mut next = snapshot();
        next.total_pages = 42;
        snap_tx.send_replace(next);

        let resp = app
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let got: Snapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(got.device_id, "DEV1");
        assert_eq!(got.total_pages, 42);
    }

    #[tokio::test]
    async fn target_is_trimmed_and_queued() {
        let (app, _snap, mut rx, _dir) = app();
        let resp = app
            .oneshot(post_json("/api/target", r#"{"serial":" X123 "}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(rx.recv().await, Some(Inbound::SetTargetSerial("X123".into())));
    }

    #[tokio::test]
    async fn control_characters_are_rejected() {
        let (app, _snap, mut rx, _dir) = app();
        let resp = app
            .oneshot(post_json("/api/target", r#"{"serial":"X1\u0007"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rescan_reports_unavailable_once_driver_is_gone() {
        let (app, _snap, rx, _dir) = app();
        drop(rx);
        let resp = app
            .oneshot(Request::post("/api/rescan").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
