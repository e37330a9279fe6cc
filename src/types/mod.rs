//! Shared data structures for the tableting line inference pipeline
//!
//! - `reading`: channel schema and the [`Reading`] telemetry vector
//! - `prediction`: typed results (forecast, defect, quality, action) and
//!   buffer status

mod reading;
mod prediction;

pub use reading::*;
pub use prediction::*;
