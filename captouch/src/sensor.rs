use embassy_time::Instant;
use embedded_hal::delay::DelayNs;
use log::{info, trace, warn};

use crate::debounce::{Debouncer, Events, PressState};
use crate::error::ConfigError;
use crate::pin::SensePin;
use crate::{TouchConfig, DEFAULT_TOUCH_CONFIG};

/// Where a sensor is in its calibration cycle
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationPhase {
    /// Threshold is calibrated, debounce cycles run normally
    Idle,
    /// A calibration has been requested but not started
    Required,
    /// Calibration samples are being taken
    InProgress,
}

/// One self-capacitance touch pad.
///
/// The sensor owns its pin and the delay used for the short settling and
/// calibration pauses. It holds no lock of its own; see
/// [`SharedTouchSensor`](crate::SharedTouchSensor) for sharing it with a
/// background poller.
pub struct TouchSensor<P, D> {
    pin: P,
    delay: D,
    config: TouchConfig,
    threshold: u16,
    last_reading: u16,
    phase: CalibrationPhase,
    debouncer: Debouncer,
}

impl<P: SensePin, D: DelayNs> TouchSensor<P, D> {
    /// Create an uncalibrated sensor. The first public operation on it runs
    /// the calibration.
    pub fn new(pin: P, delay: D, config: Option<TouchConfig>) -> Result<Self, ConfigError> {
        let config = config.unwrap_or(DEFAULT_TOUCH_CONFIG);
        config.validate()?;
        Ok(Self {
            pin,
            delay,
            threshold: config.initial_threshold,
            last_reading: 0,
            phase: CalibrationPhase::Required,
            debouncer: Debouncer::new(Some(&config)),
            config,
        })
    }

    pub fn config(&self) -> &TouchConfig {
        &self.config
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    /// Averaged reading from the most recent sample
    pub fn value(&self) -> u16 {
        self.last_reading
    }

    pub fn sigma(&self) -> u8 {
        self.debouncer.sigma()
    }

    pub fn press_state(&self) -> PressState {
        self.debouncer.state()
    }

    /// Debounced state: true between a `Down` and its `Up`
    pub fn is_pressed(&self) -> bool {
        self.debouncer.pressed()
    }

    pub fn calibration_phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Raw comparison of the last sample against the threshold
    pub fn is_active(&self) -> bool {
        self.last_reading >= self.threshold
    }

    /// Charge the pad and average `cap_samples` analog reads
    ///
    /// A failing pin is logged and counted as a zero reading, which leaves the
    /// pad reading as untouched.
    pub fn sample(&mut self) -> u16 {
        let mut total: u32 = 0;
        for _ in 0..self.config.cap_samples {
            if let Err(e) = self.pin.drive(true) {
                warn!("touch pin drive failed: {:?}", e);
            }
            self.delay.delay_us(self.config.settle_us);
            total += match self.pin.read_analog() {
                Ok(raw) => raw as u32,
                Err(e) => {
                    warn!("touch pin read failed: {:?}", e);
                    0
                }
            };
        }
        self.last_reading = (total / self.config.cap_samples as u32) as u16;
        if let Err(e) = self.pin.drive(false) {
            warn!("touch pin release failed: {:?}", e);
        }
        self.last_reading
    }

    /// Flag the threshold for recalibration on the next public operation
    pub fn request_calibration(&mut self) {
        if self.phase == CalibrationPhase::Idle {
            self.phase = CalibrationPhase::Required;
        }
    }

    /// Run a pending calibration
    ///
    /// Samples the untouched pad `calibration_samples` times and places the
    /// threshold `calibration_offset` above the largest reading. Returns the new
    /// threshold, or `None` if no calibration was pending.
    pub fn calibrate_if_needed(&mut self) -> Option<u16> {
        if !self.begin_calibration() {
            return None;
        }

        let mut ceiling = 0;
        for _ in 0..self.config.calibration_samples {
            self.delay.delay_ms(self.config.calibration_pause_ms);
            ceiling = ceiling.max(self.sample());
        }

        Some(self.finish_calibration(ceiling))
    }

    /// Move a pending calibration to `InProgress`
    ///
    /// Returns false if none was pending. The caller then takes
    /// `calibration_samples` samples, pausing before each, and hands the
    /// largest to [`finish_calibration`](Self::finish_calibration). Ticks are
    /// skipped in between.
    pub fn begin_calibration(&mut self) -> bool {
        if self.phase != CalibrationPhase::Required {
            return false;
        }
        self.phase = CalibrationPhase::InProgress;
        true
    }

    /// Put an interrupted calibration back to `Required`, so the next public
    /// operation starts it over
    pub fn abort_calibration(&mut self) {
        if self.phase == CalibrationPhase::InProgress {
            self.phase = CalibrationPhase::Required;
        }
    }

    /// Set the threshold from the largest calibration sample and return to
    /// `Idle`
    pub fn finish_calibration(&mut self, ceiling: u16) -> u16 {
        self.threshold = ceiling.saturating_add(self.config.calibration_offset);
        self.phase = CalibrationPhase::Idle;
        info!("touch calibrated: ceiling {} threshold {}", ceiling, self.threshold);
        self.threshold
    }

    /// One debounce cycle: sample, integrate, and evaluate transitions
    ///
    /// Skipped entirely, without sampling, while a calibration is pending or
    /// running.
    pub fn tick(&mut self, now: Instant) -> Events {
        if self.phase != CalibrationPhase::Idle {
            return Events::new();
        }
        self.sample();
        let active = self.is_active();
        let events = self.debouncer.push(active, now);
        trace!(
            "touch tick: reading {} threshold {} sigma {}",
            self.last_reading,
            self.threshold,
            self.debouncer.sigma()
        );
        events
    }

    /// Give back the pin and delay
    pub fn release(self) -> (P, D) {
        (self.pin, self.delay)
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::TouchEvent;
    use core::cell::Cell;
    use embassy_time::Duration;

    /// Pad whose reading is set from the test. Records drive transitions.
    pub struct FakePad<'a> {
        pub level: &'a Cell<u16>,
        pub driven: bool,
        pub drives: u32,
        pub reads: u32,
    }

    impl<'a> FakePad<'a> {
        pub fn new(level: &'a Cell<u16>) -> Self {
            Self {
                level,
                driven: false,
                drives: 0,
                reads: 0,
            }
        }
    }

    impl SensePin for FakePad<'_> {
        type Error = ();

        fn drive(&mut self, active: bool) -> Result<(), ()> {
            self.driven = active;
            self.drives += 1;
            Ok(())
        }

        fn read_analog(&mut self) -> Result<u16, ()> {
            assert!(self.driven, "pad read without being charged");
            self.reads += 1;
            Ok(self.level.get())
        }
    }

    /// Pad replaying a fixed list of raw reads, then repeating the last one
    pub struct ScriptedPad {
        pub reads: std::vec::Vec<u16>,
        pub next: usize,
    }

    impl SensePin for ScriptedPad {
        type Error = ();

        fn drive(&mut self, _active: bool) -> Result<(), ()> {
            Ok(())
        }

        fn read_analog(&mut self) -> Result<u16, ()> {
            let i = self.next.min(self.reads.len() - 1);
            self.next += 1;
            Ok(self.reads[i])
        }
    }

    /// Pin with a dead ADC
    pub struct BrokenPad;

    impl SensePin for BrokenPad {
        type Error = &'static str;

        fn drive(&mut self, _active: bool) -> Result<(), &'static str> {
            Err("no drive")
        }

        fn read_analog(&mut self) -> Result<u16, &'static str> {
            Err("no conversion")
        }
    }

    #[derive(Default)]
    pub struct FakeDelay {
        pub us: u64,
        pub ms: u64,
    }

    impl DelayNs for FakeDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.us += ns as u64 / 1000;
        }

        fn delay_us(&mut self, us: u32) {
            self.us += us as u64;
        }

        fn delay_ms(&mut self, ms: u32) {
            self.ms += ms as u64;
        }
    }

    fn sensor<P: SensePin>(pin: P) -> TouchSensor<P, FakeDelay> {
        TouchSensor::new(pin, FakeDelay::default(), None).unwrap()
    }

    #[test]
    fn test_sample_averages_and_releases() {
        let mut s = sensor(ScriptedPad {
            reads: vec![100, 101, 102, 104],
            next: 0,
        });
        assert_eq!(s.sample(), 101);
        assert_eq!(s.value(), 101);

        let (pad, delay) = s.release();
        assert_eq!(pad.next, 4);
        assert_eq!(delay.us, 4 * 5);
    }

    #[test]
    fn test_sample_leaves_pad_released() {
        let level = Cell::new(300);
        let mut s = sensor(FakePad::new(&level));
        assert_eq!(s.sample(), 300);

        let (pad, _) = s.release();
        assert!(!pad.driven);
        assert_eq!(pad.reads, 4);
        assert_eq!(pad.drives, 5);
    }

    #[test]
    fn test_calibration_threshold() {
        // Ambient noise peaking at 200 gives a threshold of 204
        let mut reads = vec![190; 32];
        reads[13] = 200;
        reads[14] = 200;
        reads[15] = 200;
        reads[12] = 200;
        let mut s = sensor(ScriptedPad { reads, next: 0 });

        assert_eq!(s.threshold(), 1023);
        assert_eq!(s.calibration_phase(), CalibrationPhase::Required);
        assert_eq!(s.calibrate_if_needed(), Some(204));
        assert_eq!(s.threshold(), 204);
        assert_eq!(s.calibration_phase(), CalibrationPhase::Idle);

        // Nothing pending: no resampling
        assert_eq!(s.calibrate_if_needed(), None);

        let (pad, delay) = s.release();
        assert_eq!(pad.next, 32);
        assert_eq!(delay.ms, 8);
    }

    #[test]
    fn test_recalibration_is_stable() {
        let level = Cell::new(512);
        let mut s = sensor(FakePad::new(&level));
        let first = s.calibrate_if_needed();

        s.request_calibration();
        assert_eq!(s.calibration_phase(), CalibrationPhase::Required);
        let second = s.calibrate_if_needed();

        assert_eq!(first, Some(516));
        assert_eq!(first, second);
    }

    #[test]
    fn test_stepwise_calibration() {
        let level = Cell::new(200);
        let mut s = sensor(FakePad::new(&level));

        assert!(s.begin_calibration());
        assert_eq!(s.calibration_phase(), CalibrationPhase::InProgress);
        assert!(!s.begin_calibration());
        // Old threshold stays in force until the new one is computed
        assert_eq!(s.threshold(), 1023);
        assert!(s.tick(Instant::from_millis(0)).is_empty());

        s.abort_calibration();
        assert_eq!(s.calibration_phase(), CalibrationPhase::Required);

        assert!(s.begin_calibration());
        assert_eq!(s.finish_calibration(300), 304);
        assert_eq!(s.calibration_phase(), CalibrationPhase::Idle);

        // Nothing to abort once idle
        s.abort_calibration();
        assert_eq!(s.calibration_phase(), CalibrationPhase::Idle);
    }

    #[test]
    fn test_tick_skipped_until_calibrated() {
        let level = Cell::new(900);
        let mut s = sensor(FakePad::new(&level));

        for t in 0..10 {
            assert!(s.tick(Instant::from_millis(t * 20)).is_empty());
        }
        assert_eq!(s.sigma(), 0);
        assert_eq!(s.value(), 0);
    }

    #[test]
    fn test_touch_scenario() {
        let level = Cell::new(200);
        let mut s = sensor(FakePad::new(&level));
        assert_eq!(s.calibrate_if_needed(), Some(204));

        // Ambient readings keep sigma at the floor
        let mut t = 0;
        for _ in 0..10 {
            assert!(s.tick(Instant::from_millis(t)).is_empty());
            assert!(!s.is_active());
            t += 20;
        }

        // Four ticks at 210 press on the fourth
        level.set(210);
        for i in 0..4 {
            let events = s.tick(Instant::from_millis(t));
            assert_eq!(s.value(), 210);
            assert!(s.is_active());
            if i < 3 {
                assert!(events.is_empty());
            } else {
                assert_eq!(events.as_slice(), &[TouchEvent::Down]);
            }
            t += 20;
        }
        assert_eq!(s.sigma(), 4);
        assert!(s.is_pressed());

        // Two ticks at 50 bring sigma back to 2 and release
        level.set(50);
        assert!(s.tick(Instant::from_millis(t)).is_empty());
        let events = s.tick(Instant::from_millis(t + 20));
        assert_eq!(events.as_slice(), &[TouchEvent::Up]);
        assert_eq!(s.sigma(), 2);
        assert!(!s.is_pressed());
    }

    #[test]
    fn test_long_press_scenario() {
        let level = Cell::new(200);
        let config = DEFAULT_TOUCH_CONFIG.with_long_click_time(Duration::from_millis(500));
        let mut s =
            TouchSensor::new(FakePad::new(&level), FakeDelay::default(), Some(config)).unwrap();
        s.calibrate_if_needed();

        level.set(400);
        let mut events = std::vec::Vec::new();
        let mut t = 0;
        while t <= 2000 {
            events.extend(s.tick(Instant::from_millis(t)));
            t += 20;
        }
        level.set(100);
        for _ in 0..3 {
            events.extend(s.tick(Instant::from_millis(t)));
            t += 20;
        }

        assert_eq!(
            events,
            [TouchEvent::Down, TouchEvent::Hold, TouchEvent::Up, TouchEvent::LongClick]
        );
    }

    #[test]
    fn test_broken_pin_reads_untouched() {
        let mut s = sensor(BrokenPad);
        assert_eq!(s.calibrate_if_needed(), Some(4));
        for t in 0..20 {
            assert!(s.tick(Instant::from_millis(t * 20)).is_empty());
            assert_eq!(s.value(), 0);
            assert!(!s.is_active());
        }
        assert!(!s.is_pressed());
    }

    #[test]
    fn test_noisy_ambient_desensitizes() {
        // A touch that does not clear the calibrated margin is never seen
        let level = Cell::new(600);
        let mut s = sensor(FakePad::new(&level));
        s.calibrate_if_needed();

        level.set(603);
        for t in 0..50 {
            assert!(s.tick(Instant::from_millis(t * 20)).is_empty());
        }
        assert_eq!(s.sigma(), 0);
    }

    #[test]
    fn test_threshold_saturates() {
        let level = Cell::new(u16::MAX - 1);
        let mut s = sensor(FakePad::new(&level));
        assert_eq!(s.calibrate_if_needed(), Some(u16::MAX));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let level = Cell::new(0);
        let config = TouchConfig {
            sigma_hi: 1,
            ..DEFAULT_TOUCH_CONFIG
        };
        let result = TouchSensor::new(FakePad::new(&level), FakeDelay::default(), Some(config));
        assert!(matches!(result, Err(ConfigError::SigmaOrder { .. })));
    }
}
