//! Errors raised while setting up sensors and handlers.
//!
//! Sensing itself never fails: pin faults are logged and read as an untouched
//! pad.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cap_samples must be at least 1")]
    ZeroCapSamples,

    #[error("calibration_samples must be at least 1")]
    ZeroCalibrationSamples,

    #[error("sigma levels must satisfy min <= lo < hi <= max (got {min}/{lo}/{hi}/{max})")]
    SigmaOrder { min: u8, lo: u8, hi: u8, max: u8 },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    #[error("handler table full ({capacity} entries)")]
    Full { capacity: usize },
}
