//! API Error Types

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::{EngineError, ValidationError};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Engine(EngineError::Store(err))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn validation_status(err: &ValidationError) -> (StatusCode, &'static str) {
    match err {
        ValidationError::UnknownPermission(_)
        | ValidationError::UnknownRole(_)
        | ValidationError::UnknownRule(_)
        | ValidationError::UnknownMembership(_)
        | ValidationError::UnknownLedgerEntry { .. } => (StatusCode::NOT_FOUND, "not_found"),
        ValidationError::DuplicateIdentifier(_)
        | ValidationError::BitPositionTaken(_)
        | ValidationError::RuleAlreadyAttached(_)
        | ValidationError::SlugExhausted(_) => (StatusCode::CONFLICT, "conflict"),
        ValidationError::PositionSpaceExhausted => {
            (StatusCode::UNPROCESSABLE_ENTITY, "position_space_exhausted")
        }
        ValidationError::BitPositionOutOfRange(_)
        | ValidationError::InvalidRule(_)
        | ValidationError::Field(_) => (StatusCode::BAD_REQUEST, "validation_error"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            Self::Engine(EngineError::Validation(v)) => validation_status(v),
            Self::Engine(EngineError::NotEditable { .. }) => (StatusCode::FORBIDDEN, "not_editable"),
            Self::Engine(EngineError::AttestationDenied { .. }) => {
                (StatusCode::FORBIDDEN, "attestation_denied")
            }
            Self::Engine(EngineError::Store(StoreError::Conflict(_))) => {
                (StatusCode::CONFLICT, "conflict")
            }
            Self::Engine(EngineError::Store(StoreError::MissingReference(_))) => {
                (StatusCode::BAD_REQUEST, "invalid_reference")
            }
            Self::Engine(EngineError::Store(StoreError::Database(err))) => {
                tracing::error!("Database error in API: {}", err);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "database_error", "message": "Database error" })),
                )
                    .into_response();
            }
            Self::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        };

        (
            status,
            Json(serde_json::json!({ "error": code, "message": self.to_string() })),
        )
            .into_response()
    }
}
