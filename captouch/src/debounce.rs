//! Leaky-integrator debounce and the button event state machine.
//!
//! Every cycle the raw comparison (reading at or above threshold) moves
//! `sigma` one step up or down inside `[sigma_min, sigma_max]`. Pressing needs
//! `sigma` to climb to `sigma_hi`, releasing needs it to fall back to
//! `sigma_lo`, so a single noisy sample can never flip the button and mains
//! hum on the pad is averaged out.

use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::{TouchConfig, TouchEvent, DEFAULT_TOUCH_CONFIG};

/// Events produced by one debounce cycle. A release can raise `Up` followed by
/// `LongClick`, so at most two.
pub type Events = Vec<TouchEvent, 2>;

/// Debounced button state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PressState {
    Released,
    Pressed {
        /// Time the `Down` event was raised
        since: Instant,
        /// Whether `Hold` has already been raised for this press
        hold_fired: bool,
    },
}

pub struct Debouncer {
    sigma: u8,
    state: PressState,
    sigma_min: u8,
    sigma_lo: u8,
    sigma_hi: u8,
    sigma_max: u8,
    hold_time: Duration,
    long_click_time: Duration,
}

impl Debouncer {
    pub fn new(config: Option<&TouchConfig>) -> Self {
        let config = config.unwrap_or(&DEFAULT_TOUCH_CONFIG);
        Self {
            sigma: config.sigma_min,
            state: PressState::Released,
            sigma_min: config.sigma_min,
            sigma_lo: config.sigma_lo,
            sigma_hi: config.sigma_hi,
            sigma_max: config.sigma_max,
            hold_time: config.hold_time,
            long_click_time: config.long_click_time,
        }
    }

    pub fn sigma(&self) -> u8 {
        self.sigma
    }

    pub fn state(&self) -> PressState {
        self.state
    }

    pub fn pressed(&self) -> bool {
        matches!(self.state, PressState::Pressed { .. })
    }

    /// Process the raw comparison for one cycle
    ///
    /// Returns the events raised by this cycle, in the order they must be
    /// delivered. At most one transition happens per cycle.
    pub fn push(&mut self, active: bool, now: Instant) -> Events {
        self.integrate(active);

        let mut events = Events::new();
        self.state = match self.state {
            PressState::Released if self.sigma >= self.sigma_hi => {
                push_event(&mut events, TouchEvent::Down);
                PressState::Pressed {
                    since: now,
                    hold_fired: false,
                }
            }
            PressState::Pressed { since, .. } if self.sigma <= self.sigma_lo => {
                push_event(&mut events, TouchEvent::Up);
                if let Some(kind) = self.classify_release(now.saturating_duration_since(since)) {
                    push_event(&mut events, kind);
                }
                PressState::Released
            }
            PressState::Pressed {
                since,
                hold_fired: false,
            } if now.saturating_duration_since(since) >= self.hold_time => {
                push_event(&mut events, TouchEvent::Hold);
                PressState::Pressed {
                    since,
                    hold_fired: true,
                }
            }
            state => state,
        };

        events
    }

    fn integrate(&mut self, active: bool) {
        if active {
            if self.sigma < self.sigma_max {
                self.sigma += 1;
            }
        } else if self.sigma > self.sigma_min {
            self.sigma -= 1;
        }
    }

    // Short presses are not reported as `Click`: the release alone raises `Up`.
    fn classify_release(&self, held: Duration) -> Option<TouchEvent> {
        if held >= self.long_click_time {
            Some(TouchEvent::LongClick)
        } else {
            None
        }
    }
}

fn push_event(events: &mut Events, event: TouchEvent) {
    // Capacity covers the longest sequence a single cycle can produce.
    let _ = events.push(event);
}
