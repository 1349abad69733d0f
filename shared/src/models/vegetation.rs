//! Vegetation index display constants and health classes

use serde::{Deserialize, Serialize};

/// Lower end of the NDVI display range
pub const NDVI_DISPLAY_MIN: f64 = -0.1;

/// Upper end of the NDVI display range
pub const NDVI_DISPLAY_MAX: f64 = 0.8;

/// Diverging ramp used for NDVI tiles: red, yellow, green
pub const NDVI_PALETTE: [&str; 3] = ["d73027", "fee08b", "1a9850"];

/// Coarse reading of a field's mean NDVI for display
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VegetationHealth {
    /// Mean of exactly zero: fully masked or no data, not a health score
    NoSignal,
    BareOrStressed,
    Sparse,
    Moderate,
    Dense,
}

impl VegetationHealth {
    pub fn from_mean_ndvi(mean: f64) -> Self {
        if !mean.is_finite() || mean == 0.0 {
            VegetationHealth::NoSignal
        } else if mean < 0.2 {
            VegetationHealth::BareOrStressed
        } else if mean < 0.4 {
            VegetationHealth::Sparse
        } else if mean < 0.6 {
            VegetationHealth::Moderate
        } else {
            VegetationHealth::Dense
        }
    }
}

impl std::fmt::Display for VegetationHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VegetationHealth::NoSignal => write!(f, "no_signal"),
            VegetationHealth::BareOrStressed => write!(f, "bare_or_stressed"),
            VegetationHealth::Sparse => write!(f, "sparse"),
            VegetationHealth::Moderate => write!(f, "moderate"),
            VegetationHealth::Dense => write!(f, "dense"),
        }
    }
}
