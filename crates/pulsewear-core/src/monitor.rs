//! Control loop
//!
//! [`HealthMonitor`] owns every pipeline stage and runs them cooperatively:
//! the optical FIFO is drained and the accelerometer read on short periods,
//! a health sample is taken every half second, and the delivery controller
//! is polled on every pass. Settings written by the app are applied between
//! passes through [`HealthMonitor::apply_settings`].

use heapless::spsc::Consumer;

use crate::anomaly::{alert_from_raw, AnomalyScorer, VitalNormalization};
use crate::buffer::DEFAULT_CAPACITY;
use crate::calories::CalorieAccumulator;
use crate::clock::WallClock;
use crate::config::{Periodic, PipelineConfig, TickConfig};
use crate::delivery::{DeliveryController, DeliveryOutcome, SampleExtras, Transport};
use crate::error::{ProtocolError, SettingsError};
use crate::motion::StepDetector;
use crate::observe::PipelineObserver;
use crate::profile::{DeviceSettings, ProfileWrite, SettingsStore};
use crate::sensor::{AccelSource, OpticalSource};
use crate::types::{HealthSample, StepState, VitalReading};
use crate::vitals::{BeatDetector, PeakBeatDetector, VitalSignEstimator};

/// Monitor with the built-in beat detector and default buffer size.
pub type DefaultMonitor = HealthMonitor<PeakBeatDetector, DEFAULT_CAPACITY>;

/// Everything the loop talks to outside the pipeline.
#[derive(Debug)]
pub struct Devices<O, A, T, S> {
    /// Optical sensor
    pub optical: O,
    /// Accelerometer
    pub accel: A,
    /// Outbound link
    pub transport: T,
    /// Anomaly model
    pub scorer: S,
}

/// What a single pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Optical samples processed
    pub optical_samples: usize,
    /// Whether a step was counted
    pub step: bool,
    /// Whether the health sample task ran
    pub sampled: bool,
}

/// The wearable's processing pipeline.
#[derive(Clone, Debug)]
pub struct HealthMonitor<D: BeatDetector, const N: usize> {
    ticks: TickConfig,
    normalization: VitalNormalization,
    vitals: VitalSignEstimator<D>,
    steps: StepDetector,
    calories: CalorieAccumulator,
    delivery: DeliveryController<N>,
    settings: SettingsStore,
    clock: WallClock,
    optical_tick: Periodic,
    motion_tick: Periodic,
    sample_tick: Periodic,
}

impl<const N: usize> HealthMonitor<PeakBeatDetector, N> {
    /// Build a monitor around the built-in beat detector.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config, PeakBeatDetector::new(config.vitals.detector))
    }
}

impl<D: BeatDetector, const N: usize> HealthMonitor<D, N> {
    /// Build a monitor with a caller-supplied beat detector.
    #[must_use]
    pub fn new(config: &PipelineConfig, detector: D) -> Self {
        let settings = DeviceSettings {
            profile: config.profile,
            delivery_mode: config.delivery.mode,
            ..DeviceSettings::default()
        };
        Self {
            ticks: config.ticks,
            normalization: config.normalization,
            vitals: VitalSignEstimator::new(config.vitals, detector),
            steps: StepDetector::new(config.steps),
            calories: CalorieAccumulator::new(),
            delivery: DeliveryController::new(config.delivery),
            settings: SettingsStore::new(settings),
            clock: WallClock::new(),
            optical_tick: Periodic::new(config.ticks.optical_period_ms),
            motion_tick: Periodic::new(config.ticks.motion_period_ms),
            sample_tick: Periodic::new(config.ticks.sample_period_ms),
        }
    }

    /// Run one pass of the loop at `now_ms`.
    pub fn run_once<O, A, T, S, B>(
        &mut self,
        now_ms: u64,
        devices: &mut Devices<O, A, T, S>,
        observer: &mut B,
    ) -> TickReport
    where
        O: OpticalSource,
        A: AccelSource,
        T: Transport,
        S: AnomalyScorer,
        B: PipelineObserver,
    {
        let mut report = TickReport::default();

        if self.optical_tick.due(now_ms) {
            while report.optical_samples < self.ticks.max_optical_burst {
                let Some(outcome) = self.vitals.read_from(&mut devices.optical, now_ms) else {
                    break;
                };
                observer.on_optical(&outcome);
                report.optical_samples += 1;
            }
        }

        if self.motion_tick.due(now_ms) && self.steps.read_from(&mut devices.accel, now_ms) {
            report.step = true;
            observer.on_step(self.steps.total_steps());
        }

        let reading = self.vitals.reading();
        let heart_rate = if reading.valid { reading.heart_rate_bpm } else { 0.0 };
        let profile = self.settings.current().profile;
        self.calories
            .update(self.steps.total_steps(), heart_rate, &profile, now_ms);

        if self.sample_tick.due(now_ms) {
            report.sampled = true;
            let alert = if reading.valid {
                let inputs = self.normalization.apply(&reading, &profile);
                alert_from_raw(devices.scorer.score(&inputs))
            } else {
                None
            };
            let extras = SampleExtras {
                calories_kcal: Some(self.calories.total_kcal()),
                alert,
            };
            let timestamp_s = self.clock.timestamp_s(now_ms);
            let result = self.delivery.record(
                &reading,
                &self.steps.state(),
                extras,
                timestamp_s,
                now_ms,
                &mut devices.transport,
            );
            Self::report_delivery(result, observer);
        }

        let result = self.delivery.poll(now_ms, &mut devices.transport);
        Self::report_delivery(result, observer);

        report
    }

    fn report_delivery<B: PipelineObserver>(result: Result<DeliveryOutcome, ProtocolError>, observer: &mut B) {
        match result {
            Ok(DeliveryOutcome::Idle) => {}
            Ok(outcome) => observer.on_delivery(&outcome),
            Err(e) => {
                tracing::warn!(error = %e, "payload encode failed");
                observer.on_encode_error(&e);
            }
        }
    }

    /// Drain queued settings writes and apply the resulting snapshot.
    ///
    /// Returns `true` when the settings changed.
    pub fn apply_settings<const Q: usize, B: PipelineObserver>(
        &mut self,
        queue: &mut Consumer<'_, ProfileWrite, Q>,
        now_ms: u64,
        observer: &mut B,
    ) -> bool {
        match self.settings.apply_pending(queue) {
            Some(previous) => {
                self.settings_changed(&previous, now_ms, observer);
                true
            }
            None => false,
        }
    }

    /// Apply one write immediately.
    pub fn apply_write<B: PipelineObserver>(
        &mut self,
        write: ProfileWrite,
        now_ms: u64,
        observer: &mut B,
    ) -> Result<bool, SettingsError> {
        match self.settings.apply(write)? {
            Some(previous) => {
                self.settings_changed(&previous, now_ms, observer);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn settings_changed<B: PipelineObserver>(&mut self, previous: &DeviceSettings, now_ms: u64, observer: &mut B) {
        let current = *self.settings.current();
        self.steps.set_counting_enabled(current.step_counting);
        if current.delivery_mode != previous.delivery_mode {
            self.delivery.set_mode(current.delivery_mode);
        }
        if current.time_sync_epoch_s != previous.time_sync_epoch_s {
            if let Some(epoch_s) = current.time_sync_epoch_s {
                self.clock.sync(epoch_s, now_ms);
            }
        }
        observer.on_settings_applied(self.settings.revision());
    }

    /// Start a new day: zero the step count and the calorie total.
    pub fn daily_reset(&mut self) {
        self.steps.reset_step_count();
        self.calories.reset();
    }

    /// Latest heart-rate and SpO2 estimate.
    #[inline]
    #[must_use]
    pub const fn reading(&self) -> VitalReading {
        self.vitals.reading()
    }

    /// Step counter state.
    #[inline]
    #[must_use]
    pub const fn step_state(&self) -> StepState {
        self.steps.state()
    }

    /// Calories burned since the last reset.
    #[inline]
    #[must_use]
    pub const fn calories_kcal(&self) -> f32 {
        self.calories.total_kcal()
    }

    /// Current settings snapshot.
    #[must_use]
    pub const fn settings(&self) -> &DeviceSettings {
        self.settings.current()
    }

    /// Delivery controller.
    #[must_use]
    pub const fn delivery(&self) -> &DeliveryController<N> {
        &self.delivery
    }

    /// Wall clock.
    #[must_use]
    pub const fn clock(&self) -> &WallClock {
        &self.clock
    }

    /// Most recent buffered sample.
    #[must_use]
    pub fn latest_sample(&self) -> HealthSample {
        self.delivery.latest_sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{NoScorer, NormalizedVitals};
    use crate::delivery::DeliveryMode;
    use crate::observe::PipelineCounters;
    use crate::profile::{submit, SettingsQueue};
    use crate::protocol::{decode_batch, PayloadFormat};
    use crate::types::{RawAccelSample, RawOpticalSample};
    use std::vec::Vec;

    /// 75 BPM pulse sampled once per optical tick (50 Hz).
    struct Pulse {
        n: u32,
        ready: bool,
        on_skin: bool,
    }

    impl OpticalSource for Pulse {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        fn read_optical(&mut self) -> Option<RawOpticalSample> {
            if !self.ready {
                return None;
            }
            self.ready = false;
            if !self.on_skin {
                return Some(RawOpticalSample::new(1_000, 800));
            }
            let t = f64::from(self.n) * 0.02;
            self.n += 1;
            let ir = 100_000.0 + 500.0 * (2.0 * std::f64::consts::PI * 1.25 * t).sin();
            Some(RawOpticalSample::new(ir as u32, 60_000))
        }
    }

    /// One jolt every 25 reads (a step every 500 ms at 20 ms reads).
    struct Gait {
        n: u32,
    }

    impl AccelSource for Gait {
        fn read_accel(&mut self) -> RawAccelSample {
            self.n += 1;
            if self.n % 25 == 0 {
                RawAccelSample::new(0, 0, 24_576)
            } else {
                RawAccelSample::new(0, 0, 16_384)
            }
        }
    }

    #[derive(Default)]
    struct Link {
        connected: bool,
        sent: Vec<Vec<u8>>,
    }

    impl Transport for Link {
        fn notify(&mut self, payload: &[u8]) -> bool {
            if self.connected {
                self.sent.push(payload.to_vec());
            }
            self.connected
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    struct Constant(f32);

    impl AnomalyScorer for Constant {
        fn score(&mut self, _vitals: &NormalizedVitals) -> f32 {
            self.0
        }
    }

    fn devices<S: AnomalyScorer>(scorer: S) -> Devices<Pulse, Gait, Link, S> {
        Devices {
            optical: Pulse {
                n: 0,
                ready: false,
                on_skin: true,
            },
            accel: Gait { n: 0 },
            transport: Link {
                connected: true,
                sent: Vec::new(),
            },
            scorer,
        }
    }

    fn run<S: AnomalyScorer>(
        monitor: &mut DefaultMonitor,
        devices: &mut Devices<Pulse, Gait, Link, S>,
        counters: &mut PipelineCounters,
        from_ms: u64,
        to_ms: u64,
    ) {
        let mut now = from_ms;
        while now < to_ms {
            devices.optical.ready = true;
            monitor.run_once(now, devices, counters);
            now += 20;
        }
    }

    #[test]
    fn test_batch_pipeline_end_to_end() {
        let mut config = PipelineConfig::default();
        config.delivery.format = PayloadFormat::Binary;
        config.delivery.buffer.min_samples_to_send = 10;
        let mut monitor = DefaultMonitor::from_config(&config);
        let mut dev = devices(NoScorer);
        let mut counters = PipelineCounters::default();

        run(&mut monitor, &mut dev, &mut counters, 0, 20_000);

        let reading = monitor.reading();
        assert!(reading.valid);
        assert!((70.0..=80.0).contains(&reading.heart_rate_bpm), "hr {}", reading.heart_rate_bpm);
        assert!((38..=40).contains(&monitor.step_state().total_steps));
        assert!(counters.beats_accepted > 10);
        assert!(!dev.transport.sent.is_empty());

        let batch = decode_batch::<DEFAULT_CAPACITY>(PayloadFormat::Binary, &dev.transport.sent[0]).unwrap();
        assert_eq!(batch.len(), 10);
        assert!(batch.windows(2).all(|w| w[0].steps <= w[1].steps));
    }

    #[test]
    fn test_no_contact_sends_nothing() {
        let mut monitor = DefaultMonitor::from_config(&PipelineConfig::default());
        let mut dev = devices(NoScorer);
        dev.optical.on_skin = false;
        let mut counters = PipelineCounters::default();

        run(&mut monitor, &mut dev, &mut counters, 0, 5_000);

        assert!(!monitor.reading().valid);
        assert!(dev.transport.sent.is_empty());
        assert_eq!(monitor.delivery().pending(), 0);
        assert!(counters.no_contact > 0);
    }

    #[test]
    fn test_realtime_with_alert() {
        let mut config = PipelineConfig::default();
        config.delivery.mode = DeliveryMode::Realtime;
        config.delivery.format = PayloadFormat::JsonRecords;
        let mut monitor = DefaultMonitor::from_config(&config);
        let mut dev = devices(Constant(0.25));
        let mut counters = PipelineCounters::default();

        run(&mut monitor, &mut dev, &mut counters, 0, 10_000);

        assert_eq!(monitor.delivery().pending(), 0);
        let last = dev.transport.sent.last().unwrap();
        let text = std::str::from_utf8(last).unwrap();
        assert!(text.contains("\"alert\":0.25"), "{text}");
        assert!(text.contains("\"cal\":"), "{text}");
    }

    #[test]
    fn test_disconnected_batch_retained() {
        let mut monitor = DefaultMonitor::from_config(&PipelineConfig::default());
        let mut dev = devices(NoScorer);
        dev.transport.connected = false;
        let mut counters = PipelineCounters::default();

        run(&mut monitor, &mut dev, &mut counters, 0, 10_000);
        assert!(monitor.delivery().pending() > 0);
        assert!(counters.sends_deferred > 0);

        dev.transport.connected = true;
        run(&mut monitor, &mut dev, &mut counters, 10_000, 10_040);
        assert_eq!(monitor.delivery().pending(), 0);
        assert!(!dev.transport.sent.is_empty());
    }

    #[test]
    fn test_settings_applied_between_passes() {
        let mut monitor = DefaultMonitor::from_config(&PipelineConfig::default());
        let mut counters = PipelineCounters::default();
        let mut queue = SettingsQueue::new();
        let (mut tx, mut rx) = queue.split();

        submit(&mut tx, ProfileWrite::WeightKg(90.0)).unwrap();
        submit(&mut tx, ProfileWrite::StepCounting(false)).unwrap();
        submit(&mut tx, ProfileWrite::DeliveryMode(DeliveryMode::Realtime)).unwrap();
        submit(&mut tx, ProfileWrite::TimeSync { epoch_s: 1_700_000_000 }).unwrap();

        assert!(monitor.apply_settings(&mut rx, 4_000, &mut counters));
        assert!((monitor.settings().profile.weight_kg - 90.0).abs() < f32::EPSILON);
        assert!(!monitor.settings().step_counting);
        assert_eq!(monitor.delivery().mode(), DeliveryMode::Realtime);
        assert_eq!(monitor.clock().timestamp_s(6_000), 1_700_000_002);
        assert_eq!(counters.settings_applied, 1);

        assert!(!monitor.apply_settings(&mut rx, 5_000, &mut counters));
    }

    #[test]
    fn test_step_counting_paused() {
        let mut monitor = DefaultMonitor::from_config(&PipelineConfig::default());
        let mut dev = devices(NoScorer);
        let mut counters = PipelineCounters::default();
        monitor
            .apply_write(ProfileWrite::StepCounting(false), 0, &mut counters)
            .unwrap();

        run(&mut monitor, &mut dev, &mut counters, 0, 5_000);
        assert_eq!(monitor.step_state().total_steps, 0);
    }

    #[test]
    fn test_invalid_write_rejected() {
        let mut monitor = DefaultMonitor::from_config(&PipelineConfig::default());
        let err = monitor.apply_write(ProfileWrite::WeightKg(-3.0), 0, &mut crate::observe::NoopObserver);
        assert!(matches!(err, Err(SettingsError::OutOfRange { field: "weight_kg", .. })));
    }

    #[test]
    fn test_daily_reset() {
        let mut monitor = DefaultMonitor::from_config(&PipelineConfig::default());
        let mut dev = devices(NoScorer);
        let mut counters = PipelineCounters::default();

        run(&mut monitor, &mut dev, &mut counters, 0, 10_000);
        assert!(monitor.step_state().total_steps > 0);
        assert!(monitor.calories_kcal() > 0.0);

        monitor.daily_reset();
        assert_eq!(monitor.step_state().total_steps, 0);
        assert!(monitor.calories_kcal().abs() < f32::EPSILON);
    }

    #[test]
    fn test_optical_burst_bounded() {
        struct Flood;
        impl OpticalSource for Flood {
            fn read_optical(&mut self) -> Option<RawOpticalSample> {
                Some(RawOpticalSample::new(100_000, 60_000))
            }
        }

        let mut monitor = DefaultMonitor::from_config(&PipelineConfig::default());
        let mut dev = Devices {
            optical: Flood,
            accel: Gait { n: 0 },
            transport: Link::default(),
            scorer: NoScorer,
        };
        let report = monitor.run_once(0, &mut dev, &mut crate::observe::NoopObserver);
        assert_eq!(report.optical_samples, 32);
        assert!(report.sampled);
    }
}
