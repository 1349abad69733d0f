//! Business logic services for the Field Health Analysis Platform

pub mod analysis;
pub mod field_refresh;
pub mod imagery;
pub mod moisture;
pub mod zonal_stats;

pub use analysis::{AnalysisService, FieldAnalyzer};
pub use field_refresh::{FieldRefreshConfig, FieldRefresher, FieldSetSummary, FieldStatus};
pub use imagery::ImageryCompositor;
pub use moisture::MoistureFusion;
pub use zonal_stats::ZonalStatistics;
