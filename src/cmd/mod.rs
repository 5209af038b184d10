//! Command-line entry points.

pub mod analyze;
pub mod combine;
pub mod info;
pub mod ocr;
pub mod rasterize;
pub mod schema;
