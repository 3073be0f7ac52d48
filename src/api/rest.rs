//! Axum REST API handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    routing::{get, post},
    extract::{State, Multipart, DefaultBodyLimit},
    http::StatusCode,
    response::Json,
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::service::{FaceService, ServiceError};
use crate::utils::image::decode_base64_image;

use super::dto::*;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<FaceService>,
    pub start_time: Instant,
}

/// Create the REST API router
pub fn create_rest_router(state: Arc<AppState>, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/extract-embedding", post(extract_handler))
        .route("/verify", post(extract_handler))
        .route("/enroll", post(enroll_handler))
        .route("/match", post(match_handler))
        .route("/metrics", get(metrics_handler))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn service_error(e: ServiceError) -> ApiError {
    let status = match &e {
        ServiceError::StoreDisabled => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    }
    let mut body = ErrorResponse::new(&e.to_string(), e.code());
    if let ServiceError::NoValidEmbeddings { total } = e {
        body = body.with_total_images(total);
    }
    (status, Json(body))
}

/// Fields of an image upload form
struct ImageForm {
    image: Vec<u8>,
    threshold: Option<f32>,
}

async fn read_image_form(mut multipart: Multipart) -> Result<ImageForm, ApiError> {
    let mut image_data: Option<Vec<u8>> = None;
    let mut threshold: Option<f32> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "MULTIPART_ERROR")))
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "image" => {
                image_data = Some(field.bytes().await.map_err(|e| {
                    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "READ_ERROR")))
                })?.to_vec());
            }
            "threshold" => {
                let text = field.text().await.map_err(|e| {
                    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "READ_ERROR")))
                })?;
                threshold = Some(parse_threshold(&text)?);
            }
            _ => {}
        }
    }

    let image = image_data.ok_or_else(|| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new("Missing image field", "MISSING_IMAGE")))
    })?;

    Ok(ImageForm { image, threshold })
}

fn parse_threshold(text: &str) -> Result<f32, ApiError> {
    match text.trim().parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                &format!("Invalid threshold: {:?}", text),
                "INVALID_THRESHOLD",
            )),
        )),
    }
}

/// Health check
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// Extract a face embedding; also serves `/verify`
async fn extract_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ExtractResponse>, ApiError> {
    let form = read_image_form(multipart).await?;

    let embedding = state.service.extract(form.image).await.map_err(service_error)?;

    Ok(Json(ExtractResponse {
        success: true,
        embedding: embedding.into_vec(),
    }))
}

/// Enroll an identity from several base64 photos
async fn enroll_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnrollRequest>,
) -> Result<Json<EnrollResponse>, ApiError> {
    let images = request
        .images
        .iter()
        .map(|encoded| decode_base64_image(encoded))
        .collect();

    let result = state
        .service
        .enroll(&request.student_id, images)
        .await
        .map_err(service_error)?;

    Ok(Json(result.into()))
}

/// Match a probe image against the enrolled identities
async fn match_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<MatchResponse>, ApiError> {
    let form = read_image_form(multipart).await?;

    let result = state
        .service
        .verify_match(form.image, form.threshold)
        .await
        .map_err(service_error)?;

    Ok(Json(result.into()))
}

/// Metrics
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    let stats = state.service.stats().await;
    let uptime = state.start_time.elapsed().as_secs();

    Json(MetricsResponse::new(stats, uptime))
}
