//! Static file handlers for the index page and the three served roots.

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path as UrlPath};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use httpdate::fmt_http_date;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

use crate::config::ProjectPaths;
use crate::error::ApiError;
use crate::etag::{etag_from_metadata, is_not_modified};
use crate::storage::{StaticRoot, StorageError};

/// The index file plus the roots served under `/assets`, `/data` and `/public`.
#[derive(Clone, Debug)]
pub struct StaticFiles {
    pub index: PathBuf,
    pub assets: StaticRoot,
    pub data: StaticRoot,
    pub public: StaticRoot,
}

impl StaticFiles {
    /// Builds one [`StaticRoot`] per served directory.
    pub fn new(paths: &ProjectPaths) -> Self {
        Self {
            index: paths.index_file(),
            assets: StaticRoot::new(paths.assets.clone()),
            data: StaticRoot::new(paths.data.clone()),
            public: StaticRoot::new(paths.public.clone()),
        }
    }
}

/// `GET /`
pub async fn serve_index(
    headers: HeaderMap,
    Extension(files): Extension<Arc<StaticFiles>>,
) -> Result<Response, ApiError> {
    file_response(&files.index, &headers).await
}

/// `GET /assets/{*path}`
pub async fn serve_asset(
    UrlPath(path): UrlPath<String>,
    headers: HeaderMap,
    Extension(files): Extension<Arc<StaticFiles>>,
) -> Result<Response, ApiError> {
    serve_from(&files.assets, &path, &headers).await
}

/// `GET /data/{*path}`
pub async fn serve_data(
    UrlPath(path): UrlPath<String>,
    headers: HeaderMap,
    Extension(files): Extension<Arc<StaticFiles>>,
) -> Result<Response, ApiError> {
    serve_from(&files.data, &path, &headers).await
}

/// `GET /public/{*path}`
pub async fn serve_public(
    UrlPath(path): UrlPath<String>,
    headers: HeaderMap,
    Extension(files): Extension<Arc<StaticFiles>>,
) -> Result<Response, ApiError> {
    serve_from(&files.public, &path, &headers).await
}

/// Fallback for unrouted paths.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("not found".into())
}

async fn serve_from(
    root: &StaticRoot,
    relative: &str,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let target = match root.resolve_path_checked(relative).await {
        Ok(target) => target,
        Err(StorageError::InvalidPath) => {
            debug!(
                root = %root.root_path().display(),
                path = relative,
                "blocked path outside static root"
            );
            return Err(StorageError::InvalidPath.into());
        }
        Err(err) => return Err(err.into()),
    };
    file_response(&target, headers).await
}

/// Reads a whole file into a response with type, length and cache headers.
async fn file_response(target: &Path, request_headers: &HeaderMap) -> Result<Response, ApiError> {
    let metadata = fs::metadata(target).await.map_err(StorageError::from)?;
    if metadata.is_dir() {
        return Err(ApiError::NotFound("not found".into()));
    }

    let mut response_headers = HeaderMap::new();
    let etag = etag_from_metadata(&metadata);
    response_headers.insert(
        header::ETAG,
        HeaderValue::from_str(&etag).map_err(|_| ApiError::Internal("invalid header".into()))?,
    );
    if let Ok(modified) = metadata.modified() {
        response_headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&fmt_http_date(modified))
                .map_err(|_| ApiError::Internal("invalid header".into()))?,
        );
    }
    if is_not_modified(request_headers, &etag) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    let mime = mime_guess::from_path(target).first_or_octet_stream();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| ApiError::Internal("invalid MIME type".into()))?,
    );
    let contents = fs::read(target).await.map_err(StorageError::from)?;
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(contents.len()));
    debug!(path = %target.display(), size = contents.len(), "serve static file");

    Ok((StatusCode::OK, response_headers, AxumBody::from(contents)).into_response())
}
