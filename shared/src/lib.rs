//! Shared types and models for the Field Health Analysis Platform
//!
//! This crate contains types shared between the backend, the browser client
//! (via WASM), and other components of the system. Nothing in here performs I/O.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
