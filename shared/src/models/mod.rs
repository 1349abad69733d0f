//! Domain models for the Field Health Analysis Platform

mod analysis;
mod field;
mod moisture;
mod vegetation;

pub use analysis::*;
pub use field::*;
pub use moisture::*;
pub use vegetation::*;
