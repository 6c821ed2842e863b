use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header::HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::domain::{DomainError, MonitorParams, BATCH_STATUS_HEADER};
use event_monitor::domain::SessionManager;
use eventscope_runner::AppProcess;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const MONITOR_PATH: &str = "/api/EventHub/monitor";
pub const STOP_PATH: &str = "/api/EventHub/stop";
pub const HEALTH_PATH: &str = "/healthz";

#[derive(Debug, Clone)]
pub struct EventHubApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl EventHubApiConfig {
    /// Empty entries are dropped; no entries at all means any origin.
    pub fn parse_origins(origins: &str) -> Vec<String> {
        let parsed: Vec<String> = origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if parsed.is_empty() {
            vec!["*".to_string()]
        } else {
            parsed
        }
    }
}

/// HTTP front of the monitor session.
pub struct EventHubApi {
    config: EventHubApiConfig,
    session_manager: Arc<SessionManager>,
}

impl EventHubApi {
    pub fn new(config: EventHubApiConfig, session_manager: Arc<SessionManager>) -> Self {
        Self {
            config,
            session_manager,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.session_manager.clone(), &self.config.allowed_origins)
    }

    pub fn into_runner_process(self) -> AppProcess {
        Box::new(move |ctx| Box::pin(async move { self.serve(ctx).await }))
    }

    async fn serve(self, ctx: CancellationToken) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(address = %addr, "eventscope api listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(ctx.cancelled_owned())
            .await?;

        info!("eventscope api stopped");
        Ok(())
    }
}

fn build_router(session_manager: Arc<SessionManager>, allowed_origins: &[String]) -> Router {
    Router::new()
        .route(MONITOR_PATH, post(monitor))
        .route(STOP_PATH, post(stop))
        .route(HEALTH_PATH, get(health))
        .with_state(session_manager)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(allowed_origins))
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([HeaderName::from_static("content-type")])
        .expose_headers([HeaderName::from_static(BATCH_STATUS_HEADER)])
        .max_age(Duration::from_secs(3600))
}

async fn monitor(
    State(session_manager): State<Arc<SessionManager>>,
    payload: Result<Json<MonitorParams>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(params) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let batch = session_manager.monitor(&params).await?;

    Ok((
        [(BATCH_STATUS_HEADER, batch.status.as_str())],
        Json(batch.messages),
    )
        .into_response())
}

async fn stop(State(session_manager): State<Arc<SessionManager>>) -> Json<serde_json::Value> {
    session_manager.stop().await;
    Json(json!({}))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Domain(DomainError),
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        ApiError::Domain(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Domain(error) => {
                let status = if error.is_invalid_input() {
                    StatusCode::BAD_REQUEST
                } else {
                    match error {
                        DomainError::Transport(_) => StatusCode::BAD_GATEWAY,
                        _ => StatusCode::INTERNAL_SERVER_ERROR,
                    }
                };
                (status, error.to_string())
            }
        };

        warn!(status = status.as_u16(), error = %message, "monitor request failed");
        (status, Json(json!({ "error": message }))).into_response()
    }
}
