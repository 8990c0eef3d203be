use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Generation failed with {backend}: {detail}")]
    Upstream { backend: String, detail: String },
    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("Fatal error: {0}")]
    Fatal(#[from] anyhow::Error),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Upstream { .. } | Error::Persistence(_) | Error::Fatal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            // backend and database detail stays in the log
            tracing::error!("request failed: {self}");
            "Internal Error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
