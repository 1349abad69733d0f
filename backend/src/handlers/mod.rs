//! HTTP handlers

pub mod analysis;
pub mod fields;
pub mod health;

pub use analysis::analyze_field;
pub use fields::{get_field_status, list_field_statuses, set_observed_fields};
pub use health::health_check;
