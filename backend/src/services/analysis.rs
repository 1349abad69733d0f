//! Field health analysis pipeline
//!
//! validate → resolve window → authenticate → composite → zonal stats →
//! moisture fusion → result. Validation happens before anything touches the
//! network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use shared::{
    parse_polygon, resolve_date_range, AnalysisRequest, AnalysisResult, FieldId, FieldPolygon,
};

use crate::config::{ImageryConfig, RefreshConfig};
use crate::error::{AppError, AppResult};
use crate::external::remote_sensing::RemoteSensing;
use crate::services::imagery::{Composite, ImageryCompositor};
use crate::services::moisture::{MoistureFusion, MoistureOutcome};
use crate::services::zonal_stats::ZonalStatistics;

/// Anything that can turn a validated request into a field health report
#[async_trait]
pub trait FieldAnalyzer: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> AppResult<AnalysisResult>;
}

/// Analysis service wiring the compositor, zonal statistics and moisture fusion
#[derive(Clone)]
pub struct AnalysisService {
    backend: Arc<dyn RemoteSensing>,
    compositor: ImageryCompositor,
    zonal: ZonalStatistics,
    moisture: MoistureFusion,
    timeout: Duration,
    default_window_days: i64,
}

impl AnalysisService {
    /// Create a new AnalysisService instance
    pub fn new(backend: Arc<dyn RemoteSensing>, imagery: &ImageryConfig, refresh: &RefreshConfig) -> Self {
        Self {
            compositor: ImageryCompositor::new(backend.clone(), imagery),
            zonal: ZonalStatistics::new(backend.clone(), imagery),
            moisture: MoistureFusion::new(backend.clone()),
            backend,
            timeout: refresh.analysis_timeout(),
            default_window_days: imagery.default_window_days,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    pub fn default_window_days(&self) -> i64 {
        self.default_window_days
    }

    /// Validate raw inputs into a request. Performs no I/O.
    pub fn prepare(
        &self,
        field_id: Option<FieldId>,
        polygon: &Value,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> AppResult<AnalysisRequest> {
        let polygon = parse_polygon(polygon)?;
        let date_range = resolve_date_range(
            start_date,
            end_date,
            Utc::now().date_naive(),
            self.default_window_days,
        )?;

        Ok(AnalysisRequest {
            field_id,
            polygon,
            date_range,
        })
    }

    /// Analyze a field from loosely-typed inputs
    pub async fn analyze_field(
        &self,
        field_id: Option<FieldId>,
        polygon: &Value,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> AppResult<AnalysisResult> {
        let request = self.prepare(field_id, polygon, start_date, end_date)?;
        self.analyze(request).await
    }

    async fn run(&self, request: &AnalysisRequest) -> AppResult<AnalysisResult> {
        self.backend.connect().await?;

        let composite = self.compositor.compose(&request.polygon, request.date_range).await?;
        let vegetation_stats = self.zonal.summarize(&composite).await?;
        let moisture = self.moisture.fuse(&request.polygon, request.date_range).await;

        Ok(assemble(&request.polygon, composite, vegetation_stats, moisture))
    }
}

#[async_trait]
impl FieldAnalyzer for AnalysisService {
    async fn analyze(&self, request: AnalysisRequest) -> AppResult<AnalysisResult> {
        let field = request
            .field_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<adhoc>".to_string());

        tracing::debug!(
            field = %field,
            start = %request.date_range.start_date,
            end = %request.date_range.end_date,
            "Analyzing field"
        );

        match tokio::time::timeout(self.timeout, self.run(&request)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "analysis of field {} exceeded {}s",
                field,
                self.timeout.as_secs()
            ))),
        }
    }
}

fn assemble(
    polygon: &FieldPolygon,
    composite: Composite,
    vegetation_stats: shared::VegetationStats,
    moisture: MoistureOutcome,
) -> AnalysisResult {
    tracing::debug!(
        vertices = polygon.len(),
        mean_ndvi = vegetation_stats.mean,
        surface_source = ?moisture.surface_source,
        "Field analysis complete"
    );

    AnalysisResult {
        source_label: source_label(composite.scene_count, &moisture),
        tile_reference: composite.tile_reference,
        vegetation_stats,
        surface_moisture_percent: moisture.reading.surface_moisture_percent,
        root_zone_moisture_percent: moisture.reading.root_zone_moisture_percent,
        humidity_percent: moisture.reading.humidity_percent,
        image_timestamp: composite.image_date,
        date_range: composite.request.date_range,
        scene_count: composite.scene_count,
    }
}

/// Provenance string naming the datasets that actually contributed
pub fn source_label(scene_count: u32, moisture: &MoistureOutcome) -> String {
    let scenes = if scene_count == 1 { "scene" } else { "scenes" };
    let mut parts = vec![format!("Sentinel-2 SR ({} {})", scene_count, scenes)];

    if moisture.smap_available {
        parts.push("SMAP L4".to_string());
    }
    if moisture.era5_available {
        parts.push("ERA5-Land".to_string());
    }

    parts.join(" · ")
}
