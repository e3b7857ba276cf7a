use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::errors::AppError;
use crate::models::{Appointment, AppointmentDetails};
use crate::state::AppState;

// GET /appointments
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AppointmentDetails>>, AppError> {
    Ok(Json(state.availability.list_appointments()?))
}

// DELETE /appointments/:id
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(state.availability.cancel(&id)?))
}
