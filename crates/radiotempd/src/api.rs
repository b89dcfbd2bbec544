use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    version: &'static str,
    devices: Arc<ArcSwap<engine::State>>,
}

impl AppState {
    pub fn new(devices: Arc<ArcSwap<engine::State>>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            devices,
        }
    }
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/devices
#[tracing::instrument(skip(state))]
async fn devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.devices.load_full();
    (StatusCode::OK, Json(snapshot.devices.clone()))
}

/// Handler for GET /v1/devices/:key
#[tracing::instrument(skip(state))]
async fn device(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> impl IntoResponse {
    let snapshot = state.devices.load_full();
    match snapshot.device(&key) {
        Some(device) => (StatusCode::OK, Json(device.clone())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no device with key '{}'", key),
            }),
        )
            .into_response(),
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/devices", get(devices))
        .route("/v1/devices/:key", get(device))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves until `shutdown_rx` fires.
pub async fn serve(
    listen: String,
    port: u16,
    devices: Arc<ArcSwap<engine::State>>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = Arc::new(AppState::new(devices));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::body::to_bytes;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::engine::DeviceSnapshot;
    use crate::engine::DeviceType;
    use crate::engine::state::SourceKind;

    fn router() -> Router {
        let snapshot = DeviceSnapshot {
            key: "Nexus-TH_1".to_string(),
            name: "Fridge".to_string(),
            model: "Nexus-TH".to_string(),
            channel: "1".to_string(),
            device_type: DeviceType::Fridge,
            kind: SourceKind::Radio,
            topic: Some("rtl_433/events".to_string()),
            service_name: "com.victronenergy.temperature.Fridge".to_string(),
            instance: 40,
            temperature: Some(4.5),
            humidity: Some(61.0),
            pressure: None,
            last_update: None,
            update_index: 7,
        };
        let state = engine::State {
            devices: vec![snapshot],
        };
        create_router(Arc::new(AppState::new(Arc::new(ArcSwap::from_pointee(state)))))
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_ping() {
        let (status, body) = get_json("/v1/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_info() {
        let (status, body) = get_json("/v1/info").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["hostname"].is_string());
    }

    #[tokio::test]
    async fn test_devices() {
        let (status, body) = get_json("/v1/devices").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["key"], "Nexus-TH_1");
        assert_eq!(body[0]["device_type"], "fridge");
        assert_eq!(body[0]["kind"], "radio");
        assert_eq!(body[0]["temperature"], 4.5);
        assert!(body[0]["pressure"].is_null());
    }

    #[tokio::test]
    async fn test_device_by_key() {
        let (status, body) = get_json("/v1/devices/Nexus-TH_1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["update_index"], 7);

        let (status, body) = get_json("/v1/devices/nope_1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nope_1"));
    }
}
