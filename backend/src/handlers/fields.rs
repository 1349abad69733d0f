//! HTTP handlers for the observed field set

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use shared::{FieldId, ObservedField};

use crate::error::{AppError, AppResult};
use crate::services::field_refresh::{FieldSetSummary, FieldStatus};
use crate::AppState;

/// Input for replacing the observed field set
#[derive(Debug, Deserialize)]
pub struct SetFieldsInput {
    pub fields: Vec<ObservedField>,
}

/// Replace the set of fields kept fresh in the background
pub async fn set_observed_fields(
    State(state): State<AppState>,
    Json(input): Json<SetFieldsInput>,
) -> Json<FieldSetSummary> {
    Json(state.refresher.set_fields(input.fields))
}

/// List the status of every observed field
pub async fn list_field_statuses(State(state): State<AppState>) -> Json<Vec<FieldStatus>> {
    Json(state.refresher.statuses())
}

/// Get the status of one observed field
pub async fn get_field_status(
    State(state): State<AppState>,
    Path(field_id): Path<String>,
) -> AppResult<Json<FieldStatus>> {
    let id = FieldId::new(field_id);
    state
        .refresher
        .status(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("field {} is not observed", id)))
}
