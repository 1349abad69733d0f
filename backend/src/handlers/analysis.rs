//! HTTP handlers for on-demand field analysis

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::Value;
use shared::{AnalysisResult, FieldId};

use crate::error::AppResult;
use crate::AppState;

/// Body of an analysis request.
///
/// The polygon is taken as raw JSON so that malformed boundaries are reported
/// as validation errors with a field name instead of a generic body rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeFieldInput {
    pub field_id: Option<FieldId>,
    #[serde(default)]
    pub polygon: Value,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Analyze one field
pub async fn analyze_field(
    State(state): State<AppState>,
    Json(input): Json<AnalyzeFieldInput>,
) -> AppResult<Json<AnalysisResult>> {
    let result = state
        .analysis
        .analyze_field(
            input.field_id,
            &input.polygon,
            input.start_date.as_deref(),
            input.end_date.as_deref(),
        )
        .await?;
    Ok(Json(result))
}
