//! Typed operations against the remote sensing backend
//!
//! The pipeline never builds backend expressions itself. It describes what it
//! needs with the request types below and a [`RemoteSensing`] implementation
//! turns them into whatever the backend speaks.

use std::collections::BTreeMap;

use async_trait::async_trait;
use shared::{Coordinate, DateRange, FieldPolygon, NDVI_DISPLAY_MAX, NDVI_DISPLAY_MIN, NDVI_PALETTE};

use crate::error::AppResult;

/// Sentinel-2 surface reflectance, harmonized processing baseline
pub const SENTINEL2_COLLECTION: &str = "COPERNICUS/S2_SR_HARMONIZED";

/// Scene-level cloud cover metadata property
pub const CLOUD_COVER_PROPERTY: &str = "CLOUDY_PIXEL_PERCENTAGE";

/// Band name of the vegetation index in composites
pub const NDVI_BAND: &str = "NDVI";

/// Scene classification classes treated as unusable: cloud shadow, cloud
/// medium probability, cloud high probability, thin cirrus
pub const MASKED_SCENE_CLASSES: [u8; 4] = [3, 8, 9, 10];

/// A cloud-masked median NDVI composite over a field
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeRequest {
    pub collection: String,
    pub polygon: FieldPolygon,
    pub date_range: DateRange,
    pub cloud_cover_ceiling: f64,
    pub classification_band: String,
    pub masked_classes: Vec<u8>,
    pub nir_band: String,
    pub red_band: String,
}

impl CompositeRequest {
    /// Sentinel-2 L2A composite: NDVI from B8/B4, masked with the SCL band
    pub fn sentinel2(polygon: FieldPolygon, date_range: DateRange, cloud_cover_ceiling: f64) -> Self {
        Self {
            collection: SENTINEL2_COLLECTION.to_string(),
            polygon,
            date_range,
            cloud_cover_ceiling,
            classification_band: "SCL".to_string(),
            masked_classes: MASKED_SCENE_CLASSES.to_vec(),
            nir_band: "B8".to_string(),
            red_band: "B4".to_string(),
        }
    }
}

/// What the backend found for a composite request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeSummary {
    pub scene_count: u32,
    /// Acquisition time of the newest scene, epoch milliseconds
    pub latest_scene_millis: Option<i64>,
}

/// Rendering parameters for composite tiles
#[derive(Debug, Clone, PartialEq)]
pub struct TileVisualization {
    pub band: String,
    pub min: f64,
    pub max: f64,
    pub palette: Vec<String>,
}

impl TileVisualization {
    pub fn ndvi() -> Self {
        Self {
            band: NDVI_BAND.to_string(),
            min: NDVI_DISPLAY_MIN,
            max: NDVI_DISPLAY_MAX,
            palette: NDVI_PALETTE.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Result of a mean/min/max reduction; `None` where every pixel was masked
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegionStats {
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Where a coarse dataset is sampled
#[derive(Debug, Clone, PartialEq)]
pub enum SampleGeometry {
    Point(Coordinate),
    Region(FieldPolygon),
}

/// Temporal mean of some bands of a dataset, reduced over a geometry
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRequest {
    pub dataset: String,
    pub bands: Vec<String>,
    pub date_range: DateRange,
    pub geometry: SampleGeometry,
    pub scale_meters: f64,
}

/// Band name → mean value (missing when no data)
pub type BandValues = BTreeMap<String, Option<f64>>;

/// Narrow, typed surface of the remote sensing backend
#[async_trait]
pub trait RemoteSensing: Send + Sync {
    /// Whether credentials are present at all
    fn is_configured(&self) -> bool;

    /// Make sure an authenticated session exists
    async fn connect(&self) -> AppResult<()>;

    /// Count the scenes that survive filtering and find the newest one
    async fn summarize_composite(&self, request: &CompositeRequest) -> AppResult<CompositeSummary>;

    /// Register the clipped composite for rendering and return a tile URL template
    async fn composite_tiles(
        &self,
        request: &CompositeRequest,
        visualization: &TileVisualization,
    ) -> AppResult<String>;

    /// Mean/min/max of the composite over exactly the field polygon
    async fn reduce_composite(
        &self,
        request: &CompositeRequest,
        scale_meters: f64,
        max_pixels: f64,
    ) -> AppResult<RegionStats>;

    /// Temporal-mean band values of a dataset over a point or region
    async fn reduce_dataset(&self, request: &DatasetRequest) -> AppResult<BandValues>;
}
