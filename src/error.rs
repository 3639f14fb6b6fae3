use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("occupancy {requested} exceeds bus capacity {capacity}")]
    CapacityExceeded { requested: u32, capacity: u32 },

    #[error("position out of bounds: {0}")]
    OutOfBounds(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(String),
}

impl AppError {
    pub fn trip_not_found(id: &str) -> Self {
        AppError::NotFound { kind: "Trip", id: id.to_string() }
    }

    pub fn bus_not_found(id: &str) -> Self {
        AppError::NotFound { kind: "Bus", id: id.to_string() }
    }

    pub fn route_not_found(id: &str) -> Self {
        AppError::NotFound { kind: "Route", id: id.to_string() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) | AppError::CapacityExceeded { .. } => StatusCode::CONFLICT,
            AppError::OutOfBounds(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{}", self);
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}
