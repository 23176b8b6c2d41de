use actix_web::{HttpResponse, ResponseError};
use actix_web::http::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::repo::RepoError;
use crate::storage::StoreError;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorBody {
    pub success: bool,
    pub message: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("{0}")] Unauthorized(String),
    #[error("{0}")] Forbidden(String),
    #[error("{0}")] NotFound(String),
    #[error("{0}")] Conflict(String),
    #[error("File exceeds the upload size limit")] PayloadTooLarge,
    #[error("Only images and documents are allowed")] UnsupportedMediaType,
    #[error("Too many requests, slow down")] TooManyRequests,
    #[error("Server error")] Internal,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self { ApiError::BadRequest(msg.into()) }
    pub fn forbidden() -> Self { ApiError::Forbidden("Access denied".into()) }
    pub fn not_found(what: &str) -> Self { ApiError::NotFound(format!("{what} not found")) }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound("Resource not found".into()),
            RepoError::Conflict => ApiError::Conflict("The resource was modified concurrently, retry the request".into()),
            RepoError::Internal(msg) => {
                tracing::error!("repository failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::not_found("File"),
            StoreError::Other(msg) => {
                tracing::error!("attachment store failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiErrorBody { success: false, message: self.to_string() })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Attempts made by read-modify-write operations that may lose a version race.
pub const CONFLICT_RETRIES: usize = 3;

/// Re-runs `op` (which must re-read its document) while it loses optimistic
/// version checks, up to [`CONFLICT_RETRIES`] attempts.
pub async fn retry_on_conflict<T, F, Fut>(mut op: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ApiResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(ApiError::Conflict(msg)) if attempt < CONFLICT_RETRIES => {
                tracing::debug!(attempt, "version conflict, retrying: {msg}");
                attempt += 1;
            }
            other => return other,
        }
    }
}

pub trait RepoResultExt<T> {
    /// Maps `RepoError::NotFound` to a 404 naming the missing entity.
    fn or_not_found(self, what: &str) -> ApiResult<T>;
}

impl<T> RepoResultExt<T> for Result<T, RepoError> {
    fn or_not_found(self, what: &str) -> ApiResult<T> {
        self.map_err(|e| match e {
            RepoError::NotFound => ApiError::not_found(what),
            other => other.into(),
        })
    }
}

/// Maps actix extractor failures (bad JSON, path, query) onto the envelope.
pub fn extractor_error(err: impl std::fmt::Display) -> actix_web::Error {
    ApiError::BadRequest(format!("Invalid request: {err}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[actix_rt::test]
    async fn conflicts_are_retried_a_bounded_number_of_times() {
        let calls = AtomicUsize::new(0);
        let out: ApiResult<()> = retry_on_conflict(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::Conflict("lost".into())) }
        })
        .await;
        assert!(matches!(out, Err(ApiError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), CONFLICT_RETRIES);
    }

    #[actix_rt::test]
    async fn success_after_a_conflict_is_returned() {
        let calls = AtomicUsize::new(0);
        let out = retry_on_conflict(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n == 0 { Err(ApiError::Conflict("lost".into())) } else { Ok(n) } }
        })
        .await;
        assert_eq!(out, Ok(1));
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let e: ApiError = RepoError::Internal("connection refused on 10.0.0.3".into()).into();
        assert_eq!(e.to_string(), "Server error");
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_entity_is_named() {
        let r: Result<(), RepoError> = Err(RepoError::NotFound);
        assert_eq!(r.or_not_found("Booking"), Err(ApiError::NotFound("Booking not found".into())));
    }
}
