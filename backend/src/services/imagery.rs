//! Imagery compositor: one cloud-free NDVI raster per field and window

use std::sync::Arc;

use chrono::DateTime;
use shared::{DateRange, FieldPolygon};

use crate::config::ImageryConfig;
use crate::error::{AppError, AppResult};
use crate::external::remote_sensing::{CompositeRequest, RemoteSensing, TileVisualization};

/// Imagery compositor for building per-field NDVI composites
#[derive(Clone)]
pub struct ImageryCompositor {
    backend: Arc<dyn RemoteSensing>,
    cloud_cover_ceiling: f64,
}

/// A median NDVI composite that has at least one scene behind it
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub request: CompositeRequest,
    pub scene_count: u32,
    /// Acquisition date of the newest scene (`YYYY-MM-DD`)
    pub image_date: String,
    pub tile_reference: String,
}

impl ImageryCompositor {
    /// Create a new ImageryCompositor instance
    pub fn new(backend: Arc<dyn RemoteSensing>, config: &ImageryConfig) -> Self {
        Self {
            backend,
            cloud_cover_ceiling: config.cloud_cover_ceiling,
        }
    }

    /// Build the composite for a field.
    ///
    /// Fails with [`AppError::NoImagery`] when the window has no scene under
    /// the cloud ceiling, so that an empty composite is never reported as
    /// NDVI 0.
    pub async fn compose(&self, polygon: &FieldPolygon, date_range: DateRange) -> AppResult<Composite> {
        let request = CompositeRequest::sentinel2(polygon.clone(), date_range, self.cloud_cover_ceiling);

        let summary = self.backend.summarize_composite(&request).await?;
        if summary.scene_count == 0 {
            tracing::info!(
                start = %date_range.start_date,
                end = %date_range.end_date,
                "No scenes under {}% cloud cover",
                self.cloud_cover_ceiling
            );
            return Err(AppError::NoImagery {
                start: date_range.start_date,
                end: date_range.end_date,
            });
        }

        let image_date = summary
            .latest_scene_millis
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| {
                tracing::debug!("Composite summary had no scene timestamp, using window end");
                date_range.end_iso()
            });

        let tile_reference = self
            .backend
            .composite_tiles(&request, &TileVisualization::ndvi())
            .await?;

        tracing::debug!(scenes = summary.scene_count, image_date = %image_date, "Built NDVI composite");

        Ok(Composite {
            request,
            scene_count: summary.scene_count,
            image_date,
            tile_reference,
        })
    }
}
