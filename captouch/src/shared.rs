//! Sharing a sensor between the application and its background poller.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant, Timer};
use embedded_hal::delay::DelayNs;
use log::debug;

use crate::bus::{EventSink, Handler, SharedEventBus};
use crate::debounce::Events;
use crate::error::BusError;
use crate::pin::SensePin;
use crate::sensor::TouchSensor;
use crate::{SensorId, TouchEvent};

struct Inner<P, D> {
    sensor: TouchSensor<P, D>,
    started: bool,
}

/// A [`TouchSensor`] guarded by a blocking mutex, with the public button
/// operations.
///
/// Every operation runs a pending calibration before doing anything else.
/// A lazy or blocking calibration takes `calibration_samples` pauses while
/// holding the lock, so `CriticalSectionRawMutex` masks interrupts for the
/// whole of it. From async code, call
/// [`calibrate_async`](Self::calibrate_async) right after construction to
/// have those pauses yield instead.
pub struct SharedTouchSensor<M: RawMutex, P, D> {
    id: SensorId,
    inner: Mutex<M, RefCell<Inner<P, D>>>,
}

impl<M, P, D> SharedTouchSensor<M, P, D>
where
    M: RawMutex,
    P: SensePin,
    D: DelayNs,
{
    pub fn new(id: SensorId, sensor: TouchSensor<P, D>) -> Self {
        Self {
            id,
            inner: Mutex::new(RefCell::new(Inner {
                sensor,
                started: false,
            })),
        }
    }

    pub fn id(&self) -> SensorId {
        self.id
    }

    /// Calibrate and hand out the poller for this sensor
    ///
    /// Only the first call returns a [`Poller`]; there is never more than one
    /// debounce loop per sensor.
    pub fn start(&self) -> Option<Poller<'_, M, P, D>> {
        self.with(|inner| {
            if inner.started {
                return None;
            }
            inner.started = true;
            let period = inner.sensor.config().poll_period;
            Some(Poller {
                shared: self,
                period,
            })
        })
    }

    /// Recalibrate the threshold against the current ambient readings.
    /// Returns the new threshold.
    ///
    /// Runs exactly one calibration, pending or not, with the lock held
    /// throughout.
    pub fn calibrate(&self) -> u16 {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            inner.sensor.request_calibration();
            inner.sensor.calibrate_if_needed();
            inner.sensor.threshold()
        })
    }

    /// Recalibrate like [`calibrate`](Self::calibrate), but yield to the
    /// executor for each pause instead of blocking
    ///
    /// The lock is only taken for each sample, and debounce cycles are
    /// skipped until the new threshold is in place. If another calibration is
    /// already in progress, returns the current threshold without sampling.
    pub async fn calibrate_async(&self) -> u16 {
        let rounds = self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            inner.sensor.request_calibration();
            if !inner.sensor.begin_calibration() {
                return None;
            }
            let config = inner.sensor.config();
            let pause = Duration::from_millis(config.calibration_pause_ms as u64);
            Some((config.calibration_samples, pause))
        });
        let Some((samples, pause)) = rounds else {
            return self.inner.lock(|cell| cell.borrow().sensor.threshold());
        };

        let mut guard = CalibrationGuard {
            inner: &self.inner,
            done: false,
        };
        let mut ceiling = 0;
        for _ in 0..samples {
            Timer::after(pause).await;
            let reading = self.inner.lock(|cell| cell.borrow_mut().sensor.sample());
            ceiling = ceiling.max(reading);
        }
        guard.done = true;
        self.inner
            .lock(|cell| cell.borrow_mut().sensor.finish_calibration(ceiling))
    }

    /// Register `handler` for `event` raised by this sensor
    pub fn on_event<BM: RawMutex, const N: usize>(
        &self,
        bus: &SharedEventBus<BM, N>,
        event: TouchEvent,
        handler: Handler,
    ) -> Result<(), BusError> {
        self.with(|_| ());
        bus.subscribe(self.id, event, handler)
    }

    /// Whether the last sample was at or above the threshold. This is the raw
    /// comparison, not the debounced press.
    pub fn is_touched(&self) -> bool {
        self.with(|inner| inner.sensor.is_active())
    }

    /// Averaged reading from the most recent sample
    pub fn value(&self) -> u16 {
        self.with(|inner| inner.sensor.value())
    }

    pub fn threshold(&self) -> u16 {
        self.with(|inner| inner.sensor.threshold())
    }

    pub fn is_pressed(&self) -> bool {
        self.with(|inner| inner.sensor.is_pressed())
    }

    /// Run `f` on the locked sensor, after any pending calibration
    pub fn lock<R>(&self, f: impl FnOnce(&mut TouchSensor<P, D>) -> R) -> R {
        self.with(|inner| f(&mut inner.sensor))
    }

    /// Take the sensor back out of the mutex
    pub fn into_inner(self) -> TouchSensor<P, D> {
        self.inner.into_inner().into_inner().sensor
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner<P, D>) -> R) -> R {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            inner.sensor.calibrate_if_needed();
            f(&mut inner)
        })
    }

    fn tick(&self, now: Instant) -> Events {
        self.inner.lock(|cell| cell.borrow_mut().sensor.tick(now))
    }
}

/// Sends a dropped `calibrate_async` back to `Required`
struct CalibrationGuard<'a, M: RawMutex, P: SensePin, D: DelayNs> {
    inner: &'a Mutex<M, RefCell<Inner<P, D>>>,
    done: bool,
}

impl<M: RawMutex, P: SensePin, D: DelayNs> Drop for CalibrationGuard<'_, M, P, D> {
    fn drop(&mut self) {
        if !self.done {
            self.inner
                .lock(|cell| cell.borrow_mut().sensor.abort_calibration());
        }
    }
}

/// Drives the debounce cycles of one started [`SharedTouchSensor`]
pub struct Poller<'a, M: RawMutex, P, D> {
    shared: &'a SharedTouchSensor<M, P, D>,
    period: Duration,
}

impl<M, P, D> Poller<'_, M, P, D>
where
    M: RawMutex,
    P: SensePin,
    D: DelayNs,
{
    pub fn id(&self) -> SensorId {
        self.shared.id
    }

    /// Run one debounce cycle and raise its events into `sink`
    ///
    /// For superloops: call every `poll_period`. The sensor lock is released
    /// before any event is raised. Returns the raised events.
    pub fn poll<S: EventSink>(&mut self, now: Instant, sink: &mut S) -> Events {
        let events = self.shared.tick(now);
        for &event in events.iter() {
            debug!("{}: {:?}", self.shared.id, event);
            sink.raise(self.shared.id, event);
        }
        events
    }

    /// Poll every `poll_period`, forever
    pub async fn run<S: EventSink>(mut self, mut sink: S) -> ! {
        loop {
            self.poll(Instant::now(), &mut sink);
            Timer::after(self.period).await;
        }
    }
}
