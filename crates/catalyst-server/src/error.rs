use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use catalyst_core::error::CatalystError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit statuses
// ---------------------------------------------------------------------------

/// Private sentinel error type used to carry an explicit HTTP status through
/// the `anyhow::Error` chain without touching the `CatalystError` enum.
#[derive(Debug)]
struct StatusError {
    status: StatusCode,
    message: String,
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StatusError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
///
/// Bodies are the plain error text; webhook callers get no structured error
/// format.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn with_status(status: StatusCode, msg: impl Into<String>) -> Self {
        Self(
            StatusError {
                status,
                message: msg.into(),
            }
            .into(),
        )
    }

    /// Construct a 404 Not Found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, msg)
    }

    /// Construct a 401 Unauthorized error.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, msg)
    }

    /// Construct a 413 Payload Too Large error.
    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::PAYLOAD_TOO_LARGE, msg)
    }

    /// Construct a 500 Internal Server Error with the given text.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn status(&self) -> StatusCode {
        if let Some(s) = self.0.downcast_ref::<StatusError>() {
            return s.status;
        }
        match self.0.downcast_ref::<CatalystError>() {
            Some(CatalystError::ReactionNotFound(_)) => StatusCode::NOT_FOUND,
            Some(CatalystError::ReactionExists(_)) => StatusCode::CONFLICT,
            Some(CatalystError::UnknownAction(_))
            | Some(CatalystError::UnknownTrigger(_))
            | Some(CatalystError::Decode { .. })
            | Some(CatalystError::InvalidSchedule { .. }) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.0.to_string(),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
