use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Everything a request can fail with, mapped to a status code at the
/// boundary. Store and framework errors all funnel into `Internal` and are
/// logged server-side; clients only ever see the generic message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("not allowed")]
    Forbidden,

    #[error("{0}")]
    Invalid(String),

    #[error("conversation not found: {0}")]
    ConversationNotFound(i64),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ConversationNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Internal(err) => {
                tracing::error!("internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "something went wrong, try again later".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": error }))).into_response()
    }
}

macro_rules! internal_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

internal_impl!(sqlx::Error);
internal_impl!(tower_sessions::session::Error);
internal_impl!(axum::Error);
internal_impl!(serde_json::Error);
