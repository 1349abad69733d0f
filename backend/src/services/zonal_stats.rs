//! Zonal statistics of the NDVI composite over a field

use std::sync::Arc;

use shared::VegetationStats;

use crate::config::ImageryConfig;
use crate::error::AppResult;
use crate::external::remote_sensing::{RegionStats, RemoteSensing};
use crate::services::imagery::Composite;

/// Reduces a composite to mean/min/max over exactly the field polygon
#[derive(Clone)]
pub struct ZonalStatistics {
    backend: Arc<dyn RemoteSensing>,
    scale_meters: f64,
    max_pixels: f64,
}

impl ZonalStatistics {
    pub fn new(backend: Arc<dyn RemoteSensing>, config: &ImageryConfig) -> Self {
        Self {
            backend,
            scale_meters: config.scale_meters,
            max_pixels: config.max_pixels,
        }
    }

    /// Mean, min and max NDVI in a single pass at native optical resolution
    pub async fn summarize(&self, composite: &Composite) -> AppResult<VegetationStats> {
        let stats = self
            .backend
            .reduce_composite(&composite.request, self.scale_meters, self.max_pixels)
            .await?;

        if stats.mean.is_none() {
            tracing::warn!("Zonal reduction returned no NDVI mean; field may be fully masked");
        }

        Ok(stats_or_zero(stats))
    }
}

/// Missing statistics (fully masked field) become 0
pub fn stats_or_zero(stats: RegionStats) -> VegetationStats {
    VegetationStats {
        mean: stats.mean.unwrap_or(0.0),
        min: stats.min.unwrap_or(0.0),
        max: stats.max.unwrap_or(0.0),
    }
}
