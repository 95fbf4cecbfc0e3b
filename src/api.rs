//! Progress read, replace, export and import handlers.

use axum::body::{Body as AxumBody, Bytes};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Extension, Multipart};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::progress::ProgressStore;

pub const IMPORT_FIELD: &str = "file";

#[derive(Serialize)]
pub struct StatusResponse {
    status: &'static str,
}

/// Returns the stored progress object, creating `{}` on first access.
pub async fn get_progress(
    Extension(store): Extension<Arc<ProgressStore>>,
) -> Result<JsonResponse<Value>, ApiError> {
    Ok(JsonResponse(store.load().await?))
}

/// Replaces the whole progress object with the request body.
pub async fn set_progress(
    Extension(store): Extension<Arc<ProgressStore>>,
    body: Bytes,
) -> Result<JsonResponse<StatusResponse>, ApiError> {
    let written = store.replace_from_slice(&body).await?;
    info!(bytes = written, "progress saved");
    Ok(JsonResponse(StatusResponse { status: "saved" }))
}

/// Sends the stored file as an attachment.
pub async fn export_progress(
    Extension(store): Extension<Arc<ProgressStore>>,
) -> Result<Response, ApiError> {
    let contents = store.read_raw().await?;
    let disposition = format!("attachment; filename=\"{}\"", store.file_name());

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .map_err(|_| ApiError::Internal("invalid header".into()))?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(contents.len()));
    info!(bytes = contents.len(), "progress exported");
    Ok((StatusCode::OK, headers, AxumBody::from(contents)).into_response())
}

/// Replaces the progress object with the JSON uploaded in the `file` field.
pub async fn import_progress(
    Extension(store): Extension<Arc<ProgressStore>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<JsonResponse<StatusResponse>, ApiError> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            warn!(error = %rejection, "import without multipart body");
            return Err(missing_file());
        }
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        // Only a file part counts; a plain form value with the same name does not.
        if field.name() != Some(IMPORT_FIELD) || field.file_name().is_none() {
            continue;
        }
        let contents = field.bytes().await.map_err(multipart_error)?;
        let written = store.replace_from_slice(&contents).await?;
        info!(bytes = written, "progress imported");
        return Ok(JsonResponse(StatusResponse { status: "imported" }));
    }

    Err(missing_file())
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

fn missing_file() -> ApiError {
    ApiError::BadRequest("Missing file".into())
}
