//! API error type and conversions into JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use serde::Serialize;
use std::io::ErrorKind;

use crate::progress::ProgressError;
use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    PayloadTooLarge(String),
    InvalidJson(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::InvalidJson(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::Internal(msg) => msg,
            ApiError::InvalidJson(msg) => format!("invalid JSON: {msg}"),
        };
        (status, JsonResponse(ErrorBody { error })).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath => ApiError::NotFound("not found".into()),
            StorageError::Io(err) => match err.kind() {
                // Names the OS refuses outright cannot exist either.
                ErrorKind::NotFound | ErrorKind::NotADirectory | ErrorKind::InvalidInput => {
                    ApiError::NotFound("not found".into())
                }
                _ => ApiError::Internal(err.to_string()),
            },
        }
    }
}

impl From<ProgressError> for ApiError {
    fn from(error: ProgressError) -> Self {
        match error {
            ProgressError::InvalidJson(err) => ApiError::InvalidJson(err.to_string()),
            ProgressError::Io(err) => match err.kind() {
                ErrorKind::NotFound => ApiError::NotFound("not found".into()),
                _ => ApiError::Internal(err.to_string()),
            },
        }
    }
}
