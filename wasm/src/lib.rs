//! WebAssembly module for the Field Health Analysis Platform
//!
//! Provides client-side computation for:
//! - Field boundary validation before submission
//! - Analysis window resolution
//! - Humidity and soil moisture unit conversion
//! - Vegetation health classification

use chrono::NaiveDate;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::debug_1(&JsValue::from_str("field-health-wasm ready"));
}

/// Validate a drawn boundary and return its vertex count
#[wasm_bindgen]
pub fn validate_field_polygon(polygon_json: &str) -> Result<u32, JsValue> {
    let polygon = parse_boundary(polygon_json).map_err(|e| JsValue::from_str(&e))?;
    Ok(polygon.len() as u32)
}

/// Centroid of a boundary as `[longitude, latitude]`
#[wasm_bindgen]
pub fn polygon_centroid(polygon_json: &str) -> Result<js_sys::Float64Array, JsValue> {
    let polygon = parse_boundary(polygon_json).map_err(|e| JsValue::from_str(&e))?;
    let centroid = polygon.centroid();
    Ok(js_sys::Float64Array::from(&[centroid.longitude, centroid.latitude][..]))
}

/// Resolve the analysis window the server would use, as
/// `{"startDate": .., "endDate": ..}`
#[wasm_bindgen]
pub fn resolve_analysis_window(
    start_date: Option<String>,
    end_date: Option<String>,
    today: &str,
) -> Result<String, JsValue> {
    analysis_window(start_date.as_deref(), end_date.as_deref(), today).map_err(|e| JsValue::from_str(&e))
}

/// Relative humidity (%) from air temperature and dew point in °C
#[wasm_bindgen]
pub fn calculate_relative_humidity(temperature_c: f64, dew_point_c: f64) -> f64 {
    relative_humidity(temperature_c, dew_point_c)
}

/// Volumetric soil water fraction (m³/m³) as a percentage
#[wasm_bindgen]
pub fn volumetric_moisture_percent(fraction: f64) -> f64 {
    volumetric_to_percent(fraction)
}

/// Classify a field's mean NDVI
#[wasm_bindgen]
pub fn classify_vegetation_health(mean_ndvi: f64) -> String {
    VegetationHealth::from_mean_ndvi(mean_ndvi).to_string()
}

fn parse_boundary(polygon_json: &str) -> Result<FieldPolygon, String> {
    let value: serde_json::Value =
        serde_json::from_str(polygon_json).map_err(|e| format!("Invalid polygon JSON: {}", e))?;
    parse_polygon(&value).map_err(|e| e.to_string())
}

fn analysis_window(start: Option<&str>, end: Option<&str>, today: &str) -> Result<String, String> {
    let today = NaiveDate::parse_from_str(today, "%Y-%m-%d").map_err(|e| format!("Invalid today: {}", e))?;
    let range = resolve_date_range(start, end, today, DEFAULT_WINDOW_DAYS).map_err(|e| e.to_string())?;
    serde_json::to_string(&range).map_err(|e| e.to_string())
}
