use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

use super::types::ErrorResponse;
use crate::error::InferenceError;

/// Failures surfaced to HTTP clients.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Model service temporarily unavailable: {0}")]
    ModelUnavailable(#[source] InferenceError),

    #[error("Error generating response: {0}")]
    Generation(#[source] InferenceError),

    #[error(transparent)]
    Validation(#[from] JsonRejection),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(rejection) => rejection.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Validation(rejection) => {
                warn!("Rejected request body: {}", rejection.body_text());
                rejection.body_text()
            }
            other => {
                error!("{:?}", other);
                other.to_string()
            }
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}
