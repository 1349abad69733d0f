//! Field health analysis request/result models

use serde::{Deserialize, Serialize};

use super::{FieldId, FieldPolygon, MoistureReading};
use crate::types::DateRange;

/// A request to analyze one field over a date window
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub field_id: Option<FieldId>,
    pub polygon: FieldPolygon,
    pub date_range: DateRange,
}

/// Summary of the vegetation index over a field
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct VegetationStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Output of the field health analysis pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Tile URL template (`{z}/{x}/{y}`) of the NDVI raster clipped to the field
    pub tile_reference: String,
    pub vegetation_stats: VegetationStats,
    pub surface_moisture_percent: f64,
    pub root_zone_moisture_percent: f64,
    pub humidity_percent: f64,
    /// Date of the freshest optical scene in the composite (`YYYY-MM-DD`)
    pub image_timestamp: String,
    pub source_label: String,
    pub date_range: DateRange,
    pub scene_count: u32,
}

impl AnalysisResult {
    pub fn moisture(&self) -> MoistureReading {
        MoistureReading {
            surface_moisture_percent: self.surface_moisture_percent,
            root_zone_moisture_percent: self.root_zone_moisture_percent,
            humidity_percent: self.humidity_percent,
        }
    }
}
