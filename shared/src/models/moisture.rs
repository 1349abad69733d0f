//! Soil moisture and humidity models

use serde::{Deserialize, Serialize};

// Magnus coefficients (Alduchov & Eskridge), valid roughly -40..50 °C
const MAGNUS_B: f64 = 17.625;
const MAGNUS_C: f64 = 243.04;

/// Moisture figures contributed to an analysis result, all in percent
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoistureReading {
    pub surface_moisture_percent: f64,
    pub root_zone_moisture_percent: f64,
    pub humidity_percent: f64,
}

/// Relative humidity from air temperature and dew point (both °C) using the
/// Magnus approximation. Always within [0, 100].
pub fn relative_humidity(temperature_c: f64, dew_point_c: f64) -> f64 {
    let saturation = |t: f64| (MAGNUS_B * t / (MAGNUS_C + t)).exp();
    clamp_percent(100.0 * saturation(dew_point_c) / saturation(temperature_c))
}

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - 273.15
}

/// Volumetric water content (m³/m³) to percent
pub fn volumetric_to_percent(fraction: f64) -> f64 {
    clamp_percent(fraction * 100.0)
}

/// Clamp to [0, 100]; anything non-finite becomes 0
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
