use std::fmt;
use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use log::warn;
use serde::Serialize;

use crate::storage::UploadStore;
use crate::telemetry::{ResourceSampler, Snapshot};

const DASHBOARD_HTML: &str = include_str!("../assets/dashboard.html");

#[derive(Clone)]
pub struct AppState {
    pub sampler: Arc<ResourceSampler>,
    pub store: Arc<UploadStore>,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/server-info", get(server_info))
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    #[serde(flatten)]
    snapshot: Snapshot,
    server_version: &'static str,
    uploaded_files_count: u64,
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        snapshot: state.sampler.sample(),
        server_version: env!("CARGO_PKG_VERSION"),
        uploaded_files_count: state.store.uploaded_file_count().await,
    })
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<String, IntakeError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(IntakeError::Malformed)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().map(str::to_string);
        let payload = field.bytes().await.map_err(IntakeError::Malformed)?;
        let stored_name = state
            .store
            .store(original_name.as_deref(), &payload)
            .await
            .map_err(IntakeError::Storage)?;
        return Ok(format!("File uploaded successfully: {}", stored_name));
    }
    Err(IntakeError::MissingFile)
}

#[derive(Debug)]
pub enum IntakeError {
    MissingFile,
    Malformed(MultipartError),
    Storage(std::io::Error),
}

impl fmt::Display for IntakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntakeError::MissingFile => write!(f, "No file uploaded."),
            IntakeError::Malformed(err) => write!(f, "Malformed upload: {}", err),
            IntakeError::Storage(err) => write!(f, "Failed to store upload: {}", err),
        }
    }
}

impl std::error::Error for IntakeError {}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let status = match &self {
            IntakeError::MissingFile | IntakeError::Malformed(_) => StatusCode::BAD_REQUEST,
            IntakeError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("upload failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}
