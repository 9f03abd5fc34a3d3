use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::pool::PoolError;
use crate::request::Rejection;
use crate::usage::StoreError;

/// Everything a request can fail with.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Refused by the validator before any work began.
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("worker pool failure: {0}")]
    Pool(#[from] PoolError),
    #[error("usage store failure: {0}")]
    Store(#[from] StoreError),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Rejected(Rejection::Auth) => StatusCode::UNAUTHORIZED,
            ServiceError::Rejected(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Reason string sent to the client.  Internal failures are not described.
    pub fn reason(&self) -> String {
        match self {
            ServiceError::Rejected(rejection) => rejection.to_string(),
            _ => "internal error".to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("request failed: {self}");
        }
        (status, Json(json!({ "error": self.reason() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Field;

    #[test]
    fn auth_maps_to_401() {
        let err = ServiceError::from(Rejection::Auth);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.reason(), "user info error");
    }

    #[test]
    fn field_rejections_map_to_400() {
        let err = ServiceError::from(Rejection::InvalidField(Field::Concurrency));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.reason(), "invalid field concurrency");
    }

    #[test]
    fn internal_failures_map_to_500() {
        let err = ServiceError::from(PoolError::WorkerPanicked(3));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.reason(), "internal error");

        let err = ServiceError::from(StoreError::Poisoned);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
