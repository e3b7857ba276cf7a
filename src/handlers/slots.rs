use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{Slot, TimeRange};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RangeQuery {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

// GET /slots?start=..&end=..
pub async fn list_available(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<Slot>>, AppError> {
    let range = TimeRange::new(query.start, query.end);
    Ok(Json(state.availability.query_available(&range)?))
}

#[derive(Deserialize)]
pub struct NewSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

// POST /slots
pub async fn create_slot(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewSlot>,
) -> Result<(StatusCode, Json<Slot>), AppError> {
    let slot = state.availability.add_slot(payload.start, payload.end)?;
    tracing::info!(slot_id = %slot.id, start = %slot.start, "slot added");
    Ok((StatusCode::CREATED, Json(slot)))
}
