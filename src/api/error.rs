//! HTTP error and success envelopes.
//!
//! Every response body is `{"success": bool, "data": ...}`. Failures carry a
//! user-facing message in `data`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::StockError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self { Self::new(StatusCode::FORBIDDEN, message) }

    pub fn validation(message: impl Into<String>) -> Self { Self::new(StatusCode::UNPROCESSABLE_ENTITY, message) }

    pub fn status(&self) -> StatusCode { self.status }

    pub fn message(&self) -> &str { &self.message }
}

impl From<StockError> for ApiError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::Validation(message) => Self::validation(message),
            StockError::Unauthorized(message) => Self::forbidden(message),
            StockError::ProductNotFound | StockError::OrderNotFound | StockError::LocationNotFound => {
                Self::new(StatusCode::NOT_FOUND, err.to_string())
            }
            StockError::UnsupportedProduct => Self::validation(err.to_string()),
            StockError::Persistence(detail) => {
                tracing::error!(error = %detail, "Storage failure while handling request");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "A storage error occurred. Please try again.")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "success": false, "data": self.message }))).into_response()
    }
}

/// `{"success": true, "data": T}`.
#[derive(Debug)]
pub struct Success<T>(pub T);

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        Json(json!({ "success": true, "data": self.0 })).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Success<T>, ApiError>;
