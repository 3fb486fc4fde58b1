use crate::config::Config;
use crate::dashboard::hub::BroadcastHub;
use crate::dashboard::notifications::{NotificationCenter, NotificationDraft};
use crate::error::BuildcastError;
use crate::release::ReleaseService;
use crate::supervisor::{BuildSupervisor, ShellRunner, StopOutcome};
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod ws;

pub struct AppState {
    pub supervisor: Arc<BuildSupervisor>,
    pub release: Arc<ReleaseService>,
}

impl AppState {
    /// Wire the supervisor, hub, notifications and history from configuration
    pub fn from_config(config: &Config) -> Result<Arc<Self>> {
        let hub = Arc::new(BroadcastHub::new());
        let notifications = NotificationCenter::new(hub.clone());
        let runner = Arc::new(ShellRunner::new());
        let history = config.open_history()?;

        let supervisor = BuildSupervisor::new(
            config.supervisor_config(),
            config.command_resolver(),
            runner.clone(),
            history,
            hub,
            notifications,
        );
        let release = ReleaseService::new(
            supervisor.clone(),
            runner,
            config.release_script.clone(),
            config.project_dir.clone(),
        );
        Ok(Arc::new(Self {
            supervisor,
            release,
        }))
    }
}

pub fn router(state: Arc<AppState>, public_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/status", get(get_status))
        .route("/api/build/start", post(start_build))
        .route("/api/build/stop", post(stop_build))
        .route(
            "/api/notifications",
            get(list_notifications)
                .post(add_notification)
                .delete(clear_notifications),
        )
        .route("/api/notifications/:id", delete(dismiss_notification))
        .route("/api/versions", get(get_versions))
        .route("/api/metrics", get(get_metrics))
        .route("/api/release", post(create_release))
        .route("/health", get(health_check))
        .with_state(state);

    let router = match public_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };
    router.layer(TraceLayer::new_for_http())
}

pub async fn start_server(addr: SocketAddr, state: Arc<AppState>, public_dir: Option<PathBuf>) -> Result<()> {
    let app = router(state, public_dir);
    tracing::info!(%addr, "Build dashboard listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

/// Maps domain errors onto HTTP status codes
pub struct ApiError(BuildcastError);

impl From<BuildcastError> for ApiError {
    fn from(err: BuildcastError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BuildcastError::AlreadyRunning { .. } | BuildcastError::ReleaseInProgress => {
                StatusCode::CONFLICT
            }
            BuildcastError::InvalidCommand { .. } => StatusCode::BAD_REQUEST,
            BuildcastError::ReleaseNotReady => StatusCode::PRECONDITION_FAILED,
            BuildcastError::ReleaseNotConfigured => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if !self.0.is_client_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    #[serde(default, alias = "gradleCommand")]
    command: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    build_id: String,
}

async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.supervisor.snapshot())
}

async fn start_build(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let build_id = state.supervisor.start(request.command.as_deref())?;
    Ok((StatusCode::ACCEPTED, Json(StartResponse { build_id })))
}

async fn stop_build(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.supervisor.stop() {
        StopOutcome::Signalled => (StatusCode::OK, Json(json!({ "outcome": "signalled" }))),
        StopOutcome::SignalFailed(reason) => (
            StatusCode::OK,
            Json(json!({ "outcome": "signalFailed", "reason": reason })),
        ),
        StopOutcome::NotRunning => (
            StatusCode::CONFLICT,
            Json(json!({ "outcome": "notRunning" })),
        ),
    }
}

async fn list_notifications(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.supervisor.notifications().list())
}

async fn add_notification(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<NotificationDraft>,
) -> impl IntoResponse {
    let id = state.supervisor.notifications().push(draft);
    (StatusCode::CREATED, Json(json!({ "id": id })))
}

async fn dismiss_notification(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    if state.supervisor.notifications().dismiss(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn clear_notifications(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.supervisor.notifications().clear();
    StatusCode::NO_CONTENT
}

async fn get_versions(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.supervisor.history()?))
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.supervisor.metrics()?))
}

async fn create_release(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let version = state.release.create_release()?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "version": version }))))
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "buildcast",
        "building": state.supervisor.is_running(),
        "observers": state.supervisor.hub().live_count(),
    }))
}
