use crate::config::{ApiConfig, ImageConfig};
use crate::error::UploadError;
use crate::image_processor::{ImageProcessor, ProcessedImage};
use crate::storage_client::{storage_filename, ObjectStorage};
use anyhow::{Context, Result};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn ObjectStorage>,
    pub processor: Arc<ImageProcessor>,
}

/// Successful upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Public URL of the stored image
    pub url: String,
    /// Filename as sent by the client
    pub original_name: String,
    pub processed: bool,
}

/// Create the API router
pub fn create_router(state: AppState, api: &ApiConfig, image: &ImageConfig) -> Router {
    let cors = if api.cors_enabled {
        if api.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = api
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/media/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(image.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "media-service"
    }))
}

/// Accept one image, normalize it and store it
#[instrument(skip_all)]
async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, UploadError> {
    let started = Instant::now();
    metrics::counter!("media.uploads.total").increment(1);

    let result = handle_upload(&state, multipart).await;

    match &result {
        Ok(_) => {
            metrics::histogram!("media.uploads.duration_seconds")
                .record(started.elapsed().as_secs_f64());
        }
        Err(_) => metrics::counter!("media.uploads.failed").increment(1),
    }

    result.map(Json)
}

async fn handle_upload(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadResponse, UploadError> {
    let multipart = multipart.map_err(|_| UploadError::MissingFile)?;
    let (original_name, data) = read_file_field(multipart).await?;

    if !has_allowed_extension(&original_name) {
        return Err(UploadError::UnsupportedType);
    }

    let processor = state.processor.clone();
    let processed: ProcessedImage = tokio::task::spawn_blocking(move || processor.process(&data))
        .await
        .map_err(|e| UploadError::Compress(e.to_string()))??;

    let filename = storage_filename(&original_name, Utc::now().timestamp());
    let url = state
        .storage
        .put_object(&filename, processed.data, "image/jpeg")
        .await?;

    info!(
        original_name = %original_name,
        filename = %filename,
        width = processed.width,
        height = processed.height,
        resized = processed.resized,
        "Image uploaded"
    );

    Ok(UploadResponse {
        url,
        original_name,
        processed: true,
    })
}

/// Pull the `file` part out of the form; other parts are skipped
async fn read_file_field(mut multipart: Multipart) -> Result<(String, Vec<u8>), UploadError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Multipart(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let Some(filename) = field.file_name().map(|s| s.to_string()) else {
            return Err(UploadError::MissingFile);
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| UploadError::Multipart(e.body_text()))?;
        return Ok((filename, data.to_vec()));
    }

    Err(UploadError::MissingFile)
}

fn has_allowed_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Start the upload API server, returning once `shutdown` resolves and
/// in-flight requests have drained
pub async fn start_api_server<F>(
    state: AppState,
    api: &ApiConfig,
    image: &ImageConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, api, image);
    let addr = format!("{}:{}", api.host, api.port);

    info!(address = %addr, "Starting upload API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
