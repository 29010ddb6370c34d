use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json
};
use thiserror::Error;
use tracing::error;

use crate::ocr::OcrError;
use crate::repo::RepoError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),
}

impl ApiError {
    /// Maps a repository error to the status it deserves
    ///
    /// `RepoError`s carried inside the `anyhow::Error` become 404, 400 or
    /// 409; anything else stays an internal error.
    pub fn from_repo(err: anyhow::Error) -> Self {
        match err.downcast_ref::<RepoError>() {
            Some(RepoError::NotFound(what)) => ApiError::NotFound(what.clone()),
            Some(RepoError::Invalid(msg)) => ApiError::BadRequest(msg.clone()),
            Some(RepoError::Conflict(msg)) => ApiError::Conflict(msg.clone()),
            None => ApiError::Database(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Database(err) => {
                error!("Internal error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Ocr(err) => {
                let status = match &err {
                    OcrError::MissingImage | OcrError::InvalidImage(_) => StatusCode::BAD_REQUEST,
                    OcrError::Http(_) | OcrError::Api { .. } | OcrError::EmptyReply => StatusCode::BAD_GATEWAY,
                };
                (status, err.to_string())
            }
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
