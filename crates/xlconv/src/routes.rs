use anyhow::{Context, Result};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, info};
use xlconv_core::{
    FileSource, ItemId, ItemSummary, MemoryFile, Orchestrator, OrchestratorHandle,
    TransformEngine, UploadError, UploadItem,
};

use crate::config::Settings;

#[derive(Clone)]
pub struct AppState {
    orchestrator: OrchestratorHandle,
}

pub fn router(orchestrator: OrchestratorHandle, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/uploads", post(upload_files).get(list_uploads))
        .route("/api/uploads/{id}", delete(remove_upload))
        .route("/api/uploads/{id}/download", get(download_upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(AppState { orchestrator })
}

pub async fn serve(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::spawn(TransformEngine::default());
    let app = router(orchestrator, settings.max_upload_bytes);

    let listener = TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!(
        max_upload_bytes = settings.max_upload_bytes,
        "listening on {}",
        listener.local_addr()?
    );
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub accepted: Vec<ItemId>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub enum ApiError {
    Multipart(MultipartError),
    Upload(UploadError),
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart(err)
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        ApiError::Upload(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Multipart(err) => (err.status(), err.body_text()),
            ApiError::Upload(err) => {
                let status = match &err {
                    UploadError::NotFound(_) => StatusCode::NOT_FOUND,
                    UploadError::NotReady { .. } => StatusCode::CONFLICT,
                    UploadError::UnsupportedType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    UploadError::Closed => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, err.to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let mut files: Vec<Box<dyn FileSource>> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.file_name().map(str::to_owned) else {
            debug!(field = field.name(), "ignoring multipart field without a file name");
            continue;
        };
        let media_type = field.content_type().unwrap_or_default().to_owned();
        let bytes = field.bytes().await?;
        files.push(Box::new(MemoryFile::new(name, media_type, bytes)));
    }

    let accepted = state.orchestrator.submit(files).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { accepted })))
}

async fn list_uploads(State(state): State<AppState>) -> Json<Vec<ItemSummary>> {
    let snapshot = state.orchestrator.snapshot();
    Json(snapshot.iter().map(UploadItem::summary).collect())
}

async fn remove_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = ItemId::from(id);
    if state.orchestrator.remove(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(UploadError::NotFound(id).into())
    }
}

async fn download_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let download = state.orchestrator.download(&ItemId::from(id)).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file_name.replace(['"', '\\'], "_")
    );
    let headers = [
        (header::CONTENT_TYPE, download.media_type.to_string()),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, download.bytes).into_response())
}
