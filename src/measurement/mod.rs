//! # Measurement Module
//!
//! Raw radio readings and their normalized record form.
//!
//! This module handles:
//! - Raw LTE / NR / other cell readings as reported by the platform
//! - Serving-cell selection and vendor sentinel correction
//! - The canonical `MeasurementRecord` and its wire mapping

pub mod reading;
pub mod record;
pub mod normalizer;

pub use normalizer::Normalizer;
pub use reading::{Capture, CellReading, DeviceInfo, LteCell, NrCell, Position, RadioSnapshot};
pub use record::{MeasurementRecord, Technology, DEFAULT_POSITION};
