use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDateTime;

/// Failures of the availability store. None of these are fatal to a
/// conversation; the orchestrator turns them into a reply.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid time range: {start} is not before {end}")]
    InvalidRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("slot {0} is not available")]
    SlotUnavailable(String),

    #[error("slot {0} is not held by this conversation")]
    NotHeld(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("stale slot reference: {0}")]
    StaleReference(String),

    #[error("slot overlaps an existing slot: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage lock poisoned")]
    LockPoisoned,
}

impl BookingError {
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::InvalidRange { .. } => "invalid_range",
            BookingError::SlotUnavailable(_) => "slot_unavailable",
            BookingError::NotHeld(_) => "not_held",
            BookingError::NotFound(_) => "not_found",
            BookingError::StaleReference(_) => "stale_reference",
            BookingError::Conflict(_) => "conflict",
            BookingError::Database(_) | BookingError::LockPoisoned => "storage",
        }
    }

    /// Whether the user can fix this by trying again with other input.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            BookingError::Database(_) | BookingError::LockPoisoned
        )
    }
}

/// An utterance the classifier could not turn into an intent.
#[derive(Debug, thiserror::Error)]
#[error("classification failed: {0}")]
pub struct ClassificationFailure(pub String);

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Booking(e) => match e {
                BookingError::NotFound(_) => StatusCode::NOT_FOUND,
                BookingError::InvalidRange { .. } | BookingError::StaleReference(_) => {
                    StatusCode::BAD_REQUEST
                }
                BookingError::SlotUnavailable(_)
                | BookingError::NotHeld(_)
                | BookingError::Conflict(_) => StatusCode::CONFLICT,
                BookingError::Database(_) | BookingError::LockPoisoned => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
