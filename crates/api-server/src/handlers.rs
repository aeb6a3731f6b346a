//! HTTP request handlers for API endpoints

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{debug, error, info, warn};

use crate::{
    types::{ErrorResponse, HealthResponse, PredictResponse, RootResponse, ROOT_MESSAGE, UPLOAD_FIELD},
    ApiState,
};

/// Error status plus `{"detail": ...}` body
pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
}

/// Service greeting
pub async fn root() -> impl IntoResponse {
    Json(RootResponse {
        message: ROOT_MESSAGE.to_string(),
    })
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Predict the emotion of the first face in an uploaded image
///
/// The image is read from the `file` field; when no part has that name, the
/// first part carrying a filename is used instead.
pub async fn predict(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let data = read_upload(&mut multipart).await?;
    info!("Prediction request: {} bytes", data.len());

    let pipeline = state.pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || pipeline.predict_bytes(&data))
        .await
        .map_err(|e| {
            error!("Prediction task panicked: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Prediction task failed")
        })?;

    match outcome {
        Ok(result) => {
            debug!("Prediction: {:?}", result);
            Ok(Json(result.into()))
        }
        Err(e) if e.is_client_error() => {
            warn!("Rejected upload: {}", e);
            Err(api_error(StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => {
            error!("Prediction failed: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn read_upload(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    let mut fallback = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Invalid multipart body: {}", e);
        api_error(e.status(), format!("Invalid multipart body: {}", e.body_text()))
    })? {
        let named_file = field.name() == Some(UPLOAD_FIELD);
        if !named_file && (fallback.is_some() || field.file_name().is_none()) {
            continue;
        }

        let data = field.bytes().await.map_err(|e| {
            warn!("Failed to read upload: {}", e);
            api_error(e.status(), format!("Failed to read upload: {}", e.body_text()))
        })?;
        if named_file {
            return Ok(data);
        }
        fallback = Some(data);
    }

    fallback.ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Missing image upload (multipart field '{UPLOAD_FIELD}')"),
        )
    })
}
