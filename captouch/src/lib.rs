//! Debounced self-capacitance touch buttons on analog-capable pins.
//!
//! Each pad is sampled by charging it and reading the pin back through the
//! ADC. An untouched pad reads close to a stable ceiling; a finger adds
//! capacitance and pushes the reading above it. [`TouchSensor`] calibrates
//! that ceiling, runs a leaky-integrator debounce on the raw comparison, and
//! turns the debounced state into button events ([`TouchEvent`]).
//!
//! The crate does not own a scheduler. Wrap a sensor in a
//! [`SharedTouchSensor`], call [`SharedTouchSensor::start`] once, and drive the
//! returned [`Poller`] either from an async task:
//!
//! ```ignore
//! #[embassy_executor::task]
//! async fn touch_task(poller: Poller<'static, CriticalSectionRawMutex, Pad, Delay>) {
//!     poller.run(BUS.sink()).await
//! }
//! ```
//!
//! or from a superloop by calling [`Poller::poll`] every `poll_period`.
#![cfg_attr(not(test), no_std)]

pub mod bus;
pub mod config;
pub mod debounce;
pub mod error;
pub mod pin;
pub mod sensor;
pub mod shared;
#[cfg(feature = "stm32f0x1")]
pub mod stm32;

pub use bus::{EventBus, EventSink, Handler, SharedEventBus};
pub use config::{TouchConfig, DEFAULT_TOUCH_CONFIG};
pub use error::{BusError, ConfigError};
pub use pin::{SensePin, SplitPin};
pub use sensor::{CalibrationPhase, TouchSensor};
pub use shared::{Poller, SharedTouchSensor};

/// Base of the event source ids handed out by [`SensorId::for_pin`]
pub const TOUCH_ID_BASE: u16 = 6543;

/// Button events raised by a touch sensor.
///
/// The discriminants are the wire codes used by the event bus.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TouchEvent {
    Down = 1,
    Up = 2,
    /// Short tap. Defined for completeness; releases shorter than
    /// `long_click_time` currently raise only [`TouchEvent::Up`].
    Click = 3,
    LongClick = 4,
    Hold = 5,
}

impl TouchEvent {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Down),
            2 => Some(Self::Up),
            3 => Some(Self::Click),
            4 => Some(Self::LongClick),
            5 => Some(Self::Hold),
            _ => None,
        }
    }
}

/// Identifies the sensor an event came from.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorId(pub u16);

impl SensorId {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Id for the pad on pin index `pin`, offset from [`TOUCH_ID_BASE`]
    pub const fn for_pin(pin: u16) -> Self {
        Self(TOUCH_ID_BASE.wrapping_add(pin))
    }

    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl core::fmt::Display for SensorId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "touch#{}", self.0)
    }
}
