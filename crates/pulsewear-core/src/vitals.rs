//! Heart-rate and SpO2 estimation from optical samples
//!
//! Each optical sample passes a contact gate, then a beat detector. Beat
//! intervals within the physiological range feed a small rolling average;
//! SpO2 is refreshed on every accepted beat.

use serde::{Deserialize, Serialize};

use crate::math::constants::{BPM_MAX_EXCLUSIVE, BPM_MIN_EXCLUSIVE, BPM_WINDOW, MS_PER_MINUTE};
use crate::math::{BpmAverager, LowPassFilter, WarmupPolicy};
use crate::sensor::OpticalSource;
use crate::types::{RawOpticalSample, VitalReading};

// ============================================================================
// Beat Detection
// ============================================================================

/// Decides whether the latest IR value completes a heartbeat.
pub trait BeatDetector {
    /// Feed one IR count; returns `true` when a beat is detected.
    fn check_for_beat(&mut self, ir: u32) -> bool;

    /// Drop any signal history.
    fn reset(&mut self) {}
}

/// Tuning for [`PeakBeatDetector`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatDetectorConfig {
    /// Coefficient of the slow baseline (DC) tracker
    pub baseline_alpha: f32,
    /// Coefficient of the smoothing filter on the pulsatile component
    pub smoothing_alpha: f32,
    /// Smallest peak-to-peak swing counted as a beat
    pub min_amplitude: f32,
    /// Largest peak-to-peak swing counted as a beat (motion artefacts above)
    pub max_amplitude: f32,
}

impl Default for BeatDetectorConfig {
    fn default() -> Self {
        Self {
            baseline_alpha: 0.05,
            smoothing_alpha: 0.5,
            min_amplitude: 20.0,
            max_amplitude: 4000.0,
        }
    }
}

/// Peak tracker on the pulsatile part of the IR signal.
///
/// The baseline is removed with a slow low-pass; the remainder is smoothed
/// and a beat is reported on each rising zero crossing whose preceding cycle
/// swung between the configured amplitude bounds.
#[derive(Clone, Debug)]
pub struct PeakBeatDetector {
    config: BeatDetectorConfig,
    baseline: LowPassFilter,
    smoothing: LowPassFilter,
    prev_ac: f32,
    cycle_max: f32,
    cycle_min: f32,
}

impl PeakBeatDetector {
    /// Create a detector with the given tuning.
    #[must_use]
    pub const fn new(config: BeatDetectorConfig) -> Self {
        Self {
            config,
            baseline: LowPassFilter::new(config.baseline_alpha),
            smoothing: LowPassFilter::new(config.smoothing_alpha),
            prev_ac: 0.0,
            cycle_max: 0.0,
            cycle_min: 0.0,
        }
    }
}

impl Default for PeakBeatDetector {
    fn default() -> Self {
        Self::new(BeatDetectorConfig::default())
    }
}

impl BeatDetector for PeakBeatDetector {
    #[allow(clippy::cast_precision_loss)]
    fn check_for_beat(&mut self, ir: u32) -> bool {
        let x = ir as f32;
        let dc = self.baseline.filter(x);
        let ac = self.smoothing.filter(x - dc);

        let is_beat = if self.prev_ac < 0.0 && ac >= 0.0 {
            let swing = self.cycle_max - self.cycle_min;
            self.cycle_max = ac;
            self.cycle_min = ac;
            swing > self.config.min_amplitude && swing < self.config.max_amplitude
        } else {
            self.cycle_max = self.cycle_max.max(ac);
            self.cycle_min = self.cycle_min.min(ac);
            false
        };

        self.prev_ac = ac;
        is_beat
    }

    fn reset(&mut self) {
        self.baseline.reset();
        self.smoothing.reset();
        self.prev_ac = 0.0;
        self.cycle_max = 0.0;
        self.cycle_min = 0.0;
    }
}

// ============================================================================
// SpO2 Models
// ============================================================================

/// Lower clamp for reported SpO2.
pub const SPO2_MIN_PERCENT: f32 = 80.0;

/// Upper clamp for reported SpO2.
pub const SPO2_MAX_PERCENT: f32 = 100.0;

/// Formula used to turn a beat into an SpO2 figure.
///
/// Neither formula is clinically calibrated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Spo2Model {
    /// `110 − 25 · red/ir`
    #[default]
    RedIrRatio,
    /// `95 + (100 − hr)/10`
    HeartRateDerived,
}

impl Spo2Model {
    /// Estimate SpO2, clamped to [80, 100].
    ///
    /// Returns `None` when the ratio model has no IR signal to divide by.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate(self, heart_rate_bpm: f32, sample: &RawOpticalSample) -> Option<f32> {
        let spo2 = match self {
            Self::RedIrRatio => {
                if sample.ir == 0 {
                    return None;
                }
                let ratio = sample.red as f32 / sample.ir as f32;
                110.0 - 25.0 * ratio
            }
            Self::HeartRateDerived => 95.0 + (100.0 - heart_rate_bpm) / 10.0,
        };
        Some(spo2.clamp(SPO2_MIN_PERCENT, SPO2_MAX_PERCENT))
    }
}

// ============================================================================
// Estimator
// ============================================================================

/// Estimator configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalConfig {
    /// IR count below which the sensor is considered off-skin
    pub presence_threshold: u32,
    /// SpO2 formula
    pub spo2_model: Spo2Model,
    /// Averaging behaviour before four beats have been accepted
    pub warmup: WarmupPolicy,
    /// Beat detector tuning
    pub detector: BeatDetectorConfig,
}

impl Default for VitalConfig {
    fn default() -> Self {
        Self {
            presence_threshold: 30_000,
            spo2_model: Spo2Model::RedIrRatio,
            warmup: WarmupPolicy::ZeroPrimed,
            detector: BeatDetectorConfig::default(),
        }
    }
}

/// What one optical sample did to the estimate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpticalOutcome {
    /// IR below the presence threshold; reading marked invalid
    NoContact,
    /// On-skin, no beat in this sample
    NoBeat,
    /// First beat after start-up; no interval to measure yet
    FirstBeat,
    /// Beat interval outside (20, 255) BPM; reading untouched
    Rejected {
        /// Milliseconds since the previous beat
        interval_ms: u64,
    },
    /// Beat accepted into the average
    Accepted {
        /// BPM derived from this interval
        bpm: u8,
        /// Rolling average after this beat
        average: u8,
    },
}

#[cfg(feature = "defmt")]
impl defmt::Format for OpticalOutcome {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::NoContact => defmt::write!(f, "no contact"),
            Self::NoBeat => defmt::write!(f, "no beat"),
            Self::FirstBeat => defmt::write!(f, "first beat"),
            Self::Rejected { interval_ms } => defmt::write!(f, "rejected {}ms", interval_ms),
            Self::Accepted { bpm, average } => defmt::write!(f, "beat {} avg {}", bpm, average),
        }
    }
}

/// Turns raw optical samples into a [`VitalReading`].
#[derive(Clone, Debug)]
pub struct VitalSignEstimator<D: BeatDetector> {
    config: VitalConfig,
    detector: D,
    averager: BpmAverager<BPM_WINDOW>,
    last_beat_ms: Option<u64>,
    reading: VitalReading,
}

impl VitalSignEstimator<PeakBeatDetector> {
    /// Create an estimator using the built-in peak detector.
    #[must_use]
    pub const fn with_peak_detector(config: VitalConfig) -> Self {
        Self::new(config, PeakBeatDetector::new(config.detector))
    }
}

impl<D: BeatDetector> VitalSignEstimator<D> {
    /// Create an estimator around a beat detector.
    #[must_use]
    pub const fn new(config: VitalConfig, detector: D) -> Self {
        Self {
            config,
            detector,
            averager: BpmAverager::new(config.warmup),
            last_beat_ms: None,
            reading: VitalReading::INITIAL,
        }
    }

    /// Process one optical sample taken at `now_ms`.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn sample(&mut self, raw: RawOpticalSample, now_ms: u64) -> OpticalOutcome {
        if raw.ir < self.config.presence_threshold {
            self.reading.valid = false;
            tracing::trace!(ir = raw.ir, "optical: no contact");
            return OpticalOutcome::NoContact;
        }

        if !self.detector.check_for_beat(raw.ir) {
            return OpticalOutcome::NoBeat;
        }

        let Some(last) = self.last_beat_ms.replace(now_ms) else {
            tracing::debug!(now_ms, "optical: first beat");
            return OpticalOutcome::FirstBeat;
        };

        let interval_ms = now_ms.saturating_sub(last);
        if interval_ms == 0 {
            tracing::debug!("optical: zero beat interval rejected");
            return OpticalOutcome::Rejected { interval_ms };
        }

        let bpm = MS_PER_MINUTE / interval_ms as f32;
        if bpm <= BPM_MIN_EXCLUSIVE || bpm >= BPM_MAX_EXCLUSIVE {
            tracing::debug!(interval_ms, bpm, "optical: beat outside range");
            return OpticalOutcome::Rejected { interval_ms };
        }

        let bpm = bpm as u8;
        let average = self.averager.push(bpm);
        self.reading.heart_rate_bpm = f32::from(average);
        if let Some(spo2) = self.config.spo2_model.estimate(self.reading.heart_rate_bpm, &raw) {
            self.reading.spo2_percent = spo2;
        }
        self.reading.valid = true;

        tracing::debug!(bpm, average, spo2 = self.reading.spo2_percent, "optical: beat accepted");
        OpticalOutcome::Accepted { bpm, average }
    }

    /// Pull one sample from `source`; `None` when nothing was pending.
    pub fn read_from<S: OpticalSource>(&mut self, source: &mut S, now_ms: u64) -> Option<OpticalOutcome> {
        source.read_optical().map(|raw| self.sample(raw, now_ms))
    }

    /// Latest estimate.
    #[inline]
    #[must_use]
    pub const fn reading(&self) -> VitalReading {
        self.reading
    }

    /// Active configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &VitalConfig {
        &self.config
    }

    /// Clear beat history and return to the initial reading.
    pub fn reset(&mut self) {
        self.detector.reset();
        self.averager.reset();
        self.last_beat_ms = None;
        self.reading = VitalReading::INITIAL;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Detector driven by a script of booleans.
    struct Scripted<'a> {
        beats: &'a [bool],
        pos: usize,
    }

    impl BeatDetector for Scripted<'_> {
        fn check_for_beat(&mut self, _ir: u32) -> bool {
            let b = self.beats.get(self.pos).copied().unwrap_or(false);
            self.pos += 1;
            b
        }
    }

    /// Always reports a beat.
    struct EveryBeat;

    impl BeatDetector for EveryBeat {
        fn check_for_beat(&mut self, _ir: u32) -> bool {
            true
        }
    }

    const ON_SKIN: RawOpticalSample = RawOpticalSample::new(60_000, 48_000);

    fn estimator_filled() -> VitalSignEstimator<EveryBeat> {
        let config = VitalConfig {
            warmup: WarmupPolicy::FilledOnly,
            ..VitalConfig::default()
        };
        VitalSignEstimator::new(config, EveryBeat)
    }

    #[test]
    fn test_below_threshold_marks_invalid_and_keeps_hr() {
        let mut est = estimator_filled();
        est.sample(ON_SKIN, 0);
        est.sample(ON_SKIN, 800);
        assert!(est.reading().valid);
        let hr = est.reading().heart_rate_bpm;

        for t in 0..5 {
            let out = est.sample(RawOpticalSample::new(100, 100), 900 + t * 20);
            assert_eq!(out, OpticalOutcome::NoContact);
        }
        assert!(!est.reading().valid);
        assert_relative_eq!(est.reading().heart_rate_bpm, hr);
    }

    #[test]
    fn test_first_beat_has_no_interval() {
        let mut est = estimator_filled();
        assert_eq!(est.sample(ON_SKIN, 1000), OpticalOutcome::FirstBeat);
        assert!(!est.reading().valid);
    }

    #[test]
    fn test_interval_to_bpm() {
        let mut est = estimator_filled();
        est.sample(ON_SKIN, 1000);
        let out = est.sample(ON_SKIN, 1800);
        assert_eq!(out, OpticalOutcome::Accepted { bpm: 75, average: 75 });
        assert_relative_eq!(est.reading().heart_rate_bpm, 75.0);
    }

    #[test]
    fn test_out_of_range_intervals_rejected() {
        let mut est = estimator_filled();
        est.sample(ON_SKIN, 0);
        // 3.5 s -> ~17 BPM
        assert_eq!(est.sample(ON_SKIN, 3500), OpticalOutcome::Rejected { interval_ms: 3500 });
        // 200 ms -> 300 BPM
        assert_eq!(est.sample(ON_SKIN, 3700), OpticalOutcome::Rejected { interval_ms: 200 });
        assert_eq!(est.reading(), VitalReading::INITIAL);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut est = estimator_filled();
        est.sample(ON_SKIN, 500);
        assert_eq!(est.sample(ON_SKIN, 500), OpticalOutcome::Rejected { interval_ms: 0 });
    }

    #[test]
    fn test_boundary_bpm_excluded() {
        let mut est = estimator_filled();
        est.sample(ON_SKIN, 0);
        // exactly 20 BPM
        assert_eq!(est.sample(ON_SKIN, 3000), OpticalOutcome::Rejected { interval_ms: 3000 });
    }

    #[test]
    fn test_zero_primed_warmup_reads_low() {
        let mut est = VitalSignEstimator::new(VitalConfig::default(), EveryBeat);
        est.sample(ON_SKIN, 0);
        est.sample(ON_SKIN, 1000);
        assert_relative_eq!(est.reading().heart_rate_bpm, 15.0);
        est.sample(ON_SKIN, 2000);
        est.sample(ON_SKIN, 3000);
        est.sample(ON_SKIN, 4000);
        assert_relative_eq!(est.reading().heart_rate_bpm, 60.0);
    }

    #[test]
    fn test_spo2_ratio_model() {
        let mut est = estimator_filled();
        est.sample(RawOpticalSample::new(60_000, 48_000), 0);
        est.sample(RawOpticalSample::new(60_000, 48_000), 1000);
        // 110 - 25 * 0.8
        assert_relative_eq!(est.reading().spo2_percent, 90.0);
    }

    #[test]
    fn test_spo2_ratio_clamped() {
        let high = Spo2Model::RedIrRatio.estimate(70.0, &RawOpticalSample::new(60_000, 0));
        let low = Spo2Model::RedIrRatio.estimate(70.0, &RawOpticalSample::new(40_000, 80_000));
        assert_eq!(high, Some(100.0));
        assert_eq!(low, Some(80.0));
    }

    #[test]
    fn test_spo2_hr_model() {
        assert_eq!(Spo2Model::HeartRateDerived.estimate(70.0, &ON_SKIN), Some(98.0));
        assert_eq!(Spo2Model::HeartRateDerived.estimate(250.0, &ON_SKIN), Some(80.0));
    }

    #[test]
    fn test_spo2_unchanged_before_first_accept() {
        let est = estimator_filled();
        assert_relative_eq!(est.reading().spo2_percent, 98.0);
    }

    #[test]
    fn test_scripted_detector_only_counts_reported_beats() {
        let script = [false, true, false, false, true];
        let mut est = VitalSignEstimator::new(
            VitalConfig {
                warmup: WarmupPolicy::FilledOnly,
                ..VitalConfig::default()
            },
            Scripted { beats: &script, pos: 0 },
        );
        let mut accepted = 0;
        for (i, _) in script.iter().enumerate() {
            if let OpticalOutcome::Accepted { .. } = est.sample(ON_SKIN, i as u64 * 400) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        // beats at 400 ms and 1600 ms -> 50 BPM
        assert_relative_eq!(est.reading().heart_rate_bpm, 50.0);
    }

    #[test]
    fn test_peak_detector_tracks_synthetic_pulse() {
        let mut est = VitalSignEstimator::with_peak_detector(VitalConfig {
            warmup: WarmupPolicy::FilledOnly,
            ..VitalConfig::default()
        });
        // 75 BPM pulse sampled at 100 Hz for 12 s
        let mut accepted = 0;
        for i in 0..1200u64 {
            let t = i as f32 * 0.01;
            let pulse = libm::sinf(2.0 * core::f32::consts::PI * 1.25 * t);
            let ir = (60_000.0 + 400.0 * pulse) as u32;
            let red = (45_000.0 + 300.0 * pulse) as u32;
            if let OpticalOutcome::Accepted { .. } = est.sample(RawOpticalSample::new(ir, red), i * 10) {
                accepted += 1;
            }
        }
        assert!(accepted >= 10, "accepted {accepted}");
        let hr = est.reading().heart_rate_bpm;
        assert!((72.0..=78.0).contains(&hr), "hr {hr}");
        assert!(est.reading().valid);
    }

    #[test]
    fn test_peak_detector_ignores_flat_signal() {
        let mut det = PeakBeatDetector::default();
        let beats = (0..500).filter(|_| det.check_for_beat(60_000)).count();
        assert_eq!(beats, 0);
    }

    #[test]
    fn test_reset_restores_initial() {
        let mut est = estimator_filled();
        est.sample(ON_SKIN, 0);
        est.sample(ON_SKIN, 700);
        est.reset();
        assert_eq!(est.reading(), VitalReading::INITIAL);
        assert_eq!(est.sample(ON_SKIN, 1400), OpticalOutcome::FirstBeat);
    }
}
