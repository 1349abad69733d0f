//! Moisture fusion: soil moisture and humidity from two independent datasets
//!
//! - Primary: SMAP L4 soil moisture, sampled at the field centroid because its
//!   ~9 km pixels are far larger than a field
//! - Secondary: ERA5-Land reanalysis over the whole polygon, used for
//!   humidity and as the surface moisture fallback
//!
//! Neither source is required for a valid result. A failing source only
//! zeroes the figures it contributes.

use std::sync::Arc;

use serde::Serialize;
use shared::{
    clamp_percent, kelvin_to_celsius, relative_humidity, volumetric_to_percent, DateRange,
    FieldPolygon, MoistureReading,
};

use crate::error::AppResult;
use crate::external::remote_sensing::{BandValues, DatasetRequest, RemoteSensing, SampleGeometry};

pub const SMAP_DATASET: &str = "NASA/SMAP/SPL4SMGP/007";
pub const SMAP_SURFACE_BAND: &str = "sm_surface";
pub const SMAP_ROOT_ZONE_BAND: &str = "sm_rootzone";
const SMAP_SCALE_METERS: f64 = 9000.0;

pub const ERA5_DATASET: &str = "ECMWF/ERA5_LAND/DAILY_AGGR";
pub const ERA5_SOIL_WATER_BAND: &str = "volumetric_soil_water_layer_1";
pub const ERA5_TEMPERATURE_BAND: &str = "temperature_2m";
pub const ERA5_DEW_POINT_BAND: &str = "dewpoint_temperature_2m";
const ERA5_SCALE_METERS: f64 = 11132.0;

/// Soil moisture product readings, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PrimaryMoisture {
    pub surface_percent: f64,
    pub root_zone_percent: f64,
}

/// Reanalysis readings, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SecondaryMoisture {
    pub surface_percent: f64,
    pub humidity_percent: f64,
}

/// Which dataset the surface moisture figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceSource {
    Smap,
    Era5Land,
    Unavailable,
}

/// Fused moisture figures plus provenance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoistureOutcome {
    pub reading: MoistureReading,
    pub surface_source: SurfaceSource,
    pub smap_available: bool,
    pub era5_available: bool,
}

/// Moisture fusion service
#[derive(Clone)]
pub struct MoistureFusion {
    backend: Arc<dyn RemoteSensing>,
}

impl MoistureFusion {
    pub fn new(backend: Arc<dyn RemoteSensing>) -> Self {
        Self { backend }
    }

    /// Query both sources and reconcile them. Never fails.
    pub async fn fuse(&self, polygon: &FieldPolygon, date_range: DateRange) -> MoistureOutcome {
        let primary = match self.primary(polygon, date_range).await {
            Ok(reading) => Some(reading),
            Err(e) => {
                tracing::warn!("SMAP soil moisture unavailable: {}", e);
                None
            }
        };

        let secondary = match self.secondary(polygon, date_range).await {
            Ok(reading) => Some(reading),
            Err(e) => {
                tracing::warn!("ERA5-Land reanalysis unavailable: {}", e);
                None
            }
        };

        fuse_readings(primary, secondary)
    }

    async fn primary(&self, polygon: &FieldPolygon, date_range: DateRange) -> AppResult<PrimaryMoisture> {
        let request = DatasetRequest {
            dataset: SMAP_DATASET.to_string(),
            bands: vec![SMAP_SURFACE_BAND.to_string(), SMAP_ROOT_ZONE_BAND.to_string()],
            date_range,
            geometry: SampleGeometry::Point(polygon.centroid()),
            scale_meters: SMAP_SCALE_METERS,
        };
        let values = self.backend.reduce_dataset(&request).await?;
        Ok(primary_from_bands(&values))
    }

    async fn secondary(&self, polygon: &FieldPolygon, date_range: DateRange) -> AppResult<SecondaryMoisture> {
        let request = DatasetRequest {
            dataset: ERA5_DATASET.to_string(),
            bands: vec![
                ERA5_SOIL_WATER_BAND.to_string(),
                ERA5_TEMPERATURE_BAND.to_string(),
                ERA5_DEW_POINT_BAND.to_string(),
            ],
            date_range,
            geometry: SampleGeometry::Region(polygon.clone()),
            scale_meters: ERA5_SCALE_METERS,
        };
        let values = self.backend.reduce_dataset(&request).await?;
        Ok(secondary_from_bands(&values))
    }
}

fn band(values: &BandValues, name: &str) -> Option<f64> {
    values.get(name).copied().flatten()
}

/// Volumetric fractions to percent; missing bands read as 0
pub fn primary_from_bands(values: &BandValues) -> PrimaryMoisture {
    PrimaryMoisture {
        surface_percent: band(values, SMAP_SURFACE_BAND).map(volumetric_to_percent).unwrap_or(0.0),
        root_zone_percent: band(values, SMAP_ROOT_ZONE_BAND).map(volumetric_to_percent).unwrap_or(0.0),
    }
}

/// Soil water to percent and humidity from the Kelvin temperature pair
pub fn secondary_from_bands(values: &BandValues) -> SecondaryMoisture {
    let humidity = match (band(values, ERA5_TEMPERATURE_BAND), band(values, ERA5_DEW_POINT_BAND)) {
        (Some(t), Some(td)) => relative_humidity(kelvin_to_celsius(t), kelvin_to_celsius(td)),
        _ => 0.0,
    };

    SecondaryMoisture {
        surface_percent: band(values, ERA5_SOIL_WATER_BAND).map(volumetric_to_percent).unwrap_or(0.0),
        humidity_percent: humidity,
    }
}

/// Reconcile the two sources.
///
/// Surface moisture comes from the primary source only when it is strictly
/// positive, otherwise from the secondary. Root zone comes from the primary
/// only; humidity from the secondary only.
pub fn fuse_readings(primary: Option<PrimaryMoisture>, secondary: Option<SecondaryMoisture>) -> MoistureOutcome {
    let primary_surface = primary.map(|p| p.surface_percent).filter(|v| *v > 0.0);

    let (surface, surface_source) = match (primary_surface, secondary) {
        (Some(value), _) => (value, SurfaceSource::Smap),
        (None, Some(s)) => (s.surface_percent, SurfaceSource::Era5Land),
        (None, None) => (0.0, SurfaceSource::Unavailable),
    };

    MoistureOutcome {
        reading: MoistureReading {
            surface_moisture_percent: clamp_percent(surface),
            root_zone_moisture_percent: clamp_percent(primary.map(|p| p.root_zone_percent).unwrap_or(0.0)),
            humidity_percent: clamp_percent(secondary.map(|s| s.humidity_percent).unwrap_or(0.0)),
        },
        surface_source,
        smap_available: primary.is_some(),
        era5_available: secondary.is_some(),
    }
}
