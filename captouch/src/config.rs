use embassy_time::Duration;

use crate::error::ConfigError;

/// Configuration for a capacitive touch sensor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TouchConfig {
    /// Threshold used before the first calibration completes. Full scale, so an
    /// uncalibrated pad never reads as touched.
    pub initial_threshold: u16,
    /// Number of raw analog reads averaged into one sample
    pub cap_samples: u16,
    /// Settling time in microseconds between driving the pad and each raw read
    pub settle_us: u32,
    /// Number of samples taken during calibration. The threshold is derived
    /// from the largest of them.
    pub calibration_samples: u16,
    /// Pause in milliseconds before each calibration sample
    pub calibration_pause_ms: u32,
    /// Margin added to the largest calibration sample to form the threshold
    pub calibration_offset: u16,
    /// Floor of the debounce integrator
    pub sigma_min: u8,
    /// Once pressed, the integrator must fall to this level to release
    pub sigma_lo: u8,
    /// The integrator must reach this level to press
    pub sigma_hi: u8,
    /// Ceiling of the debounce integrator
    pub sigma_max: u8,
    /// Interval between debounce cycles
    pub poll_period: Duration,
    /// Press duration after which a single `Hold` is raised
    pub hold_time: Duration,
    /// Press duration at release that adds a `LongClick` after the `Up`
    pub long_click_time: Duration,
}

impl TouchConfig {
    pub const fn new() -> Self {
        Self {
            initial_threshold: 1023,
            cap_samples: 4,
            settle_us: 5,
            calibration_samples: 8,
            calibration_pause_ms: 1,
            calibration_offset: 4,
            sigma_min: 0,
            sigma_lo: 2,
            sigma_hi: 4,
            sigma_max: 5,
            poll_period: Duration::from_millis(20),
            hold_time: Duration::from_millis(1500),
            long_click_time: Duration::from_millis(1000),
        }
    }

    pub const fn with_hold_time(mut self, hold_time: Duration) -> Self {
        self.hold_time = hold_time;
        self
    }

    pub const fn with_long_click_time(mut self, long_click_time: Duration) -> Self {
        self.long_click_time = long_click_time;
        self
    }

    pub const fn with_calibration_offset(mut self, offset: u16) -> Self {
        self.calibration_offset = offset;
        self
    }

    /// Check the invariants the sampling and debounce logic rely on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cap_samples == 0 {
            return Err(ConfigError::ZeroCapSamples);
        }
        if self.calibration_samples == 0 {
            return Err(ConfigError::ZeroCalibrationSamples);
        }
        let ordered = self.sigma_min <= self.sigma_lo
            && self.sigma_lo < self.sigma_hi
            && self.sigma_hi <= self.sigma_max;
        if !ordered {
            return Err(ConfigError::SigmaOrder {
                min: self.sigma_min,
                lo: self.sigma_lo,
                hi: self.sigma_hi,
                max: self.sigma_max,
            });
        }
        Ok(())
    }
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub const DEFAULT_TOUCH_CONFIG: TouchConfig = TouchConfig::new();
