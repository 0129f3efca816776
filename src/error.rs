use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no route between origin and destination")]
    NoRoute,

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("rider {0} already has an active ride")]
    DuplicateActiveRide(String),

    #[error("already taken: {0}")]
    AlreadyTaken(String),

    #[error("location permission denied")]
    PermissionDenied,

    #[error("message content cannot be empty")]
    EmptyContent,

    #[error("unknown vehicle class: {0}")]
    UnknownVehicleClass(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Only transient provider failures may be resubmitted with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ProviderUnavailable(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::NoRoute => "NoRoute",
            AppError::ProviderUnavailable(_) => "ProviderUnavailable",
            AppError::DuplicateActiveRide(_) => "DuplicateActiveRide",
            AppError::AlreadyTaken(_) => "AlreadyTaken",
            AppError::PermissionDenied => "PermissionDenied",
            AppError::EmptyContent => "EmptyContent",
            AppError::UnknownVehicleClass(_) => "UnknownVehicleClass",
            AppError::InvalidTransition(_) => "InvalidTransition",
            AppError::Forbidden(_) => "Forbidden",
            AppError::Internal(_) => "Internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_)
            | AppError::EmptyContent
            | AppError::UnknownVehicleClass(_) => StatusCode::BAD_REQUEST,
            AppError::PermissionDenied | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateActiveRide(_)
            | AppError::AlreadyTaken(_)
            | AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::NoRoute => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}
