use axum::{http::StatusCode, response::{IntoResponse, Response}};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("processor error: {0}")]
    Processor(#[from] reqwest::Error),
    #[error("not found")]
    NotFound,
    #[error("no submission quota available")]
    QuotaExhausted,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("some files were rejected: {0}")]
    PartialUpload(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    Message(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::QuotaExhausted => StatusCode::PAYMENT_REQUIRED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PartialUpload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Processor(_) => StatusCode::BAD_GATEWAY,
            AppError::Db(_) | AppError::Message(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(?self);
        (status, self.to_string()).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
