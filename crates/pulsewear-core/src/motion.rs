//! Step detection from accelerometer magnitude
//!
//! Magnitude in g is high-pass filtered to remove gravity. A step is counted
//! when the filtered value exceeds the threshold and the refractory period
//! since the previous step has elapsed.

use serde::{Deserialize, Serialize};

use crate::math::constants::ACCEL_LSB_PER_G_2G;
use crate::math::{accel_magnitude_g, HighPassFilter};
use crate::sensor::AccelSource;
use crate::types::{RawAccelSample, StepState};

/// Step detector configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Accelerometer counts per g
    pub lsb_per_g: f32,
    /// High-pass coefficient
    pub alpha: f32,
    /// Filtered magnitude that counts as a step, in g
    pub threshold_g: f32,
    /// Minimum time between steps
    pub refractory_ms: u64,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            lsb_per_g: ACCEL_LSB_PER_G_2G,
            alpha: 0.9,
            threshold_g: 0.18,
            refractory_ms: 300,
        }
    }
}

/// Threshold-crossing step counter.
#[derive(Clone, Debug)]
pub struct StepDetector {
    config: StepConfig,
    filter: HighPassFilter,
    last_step_ms: Option<u64>,
    total_steps: u32,
    magnitude_g: f32,
    counting_enabled: bool,
}

impl StepDetector {
    /// Create a detector; the first sample only primes the filter.
    #[must_use]
    pub const fn new(config: StepConfig) -> Self {
        Self {
            config,
            filter: HighPassFilter::new(config.alpha),
            last_step_ms: None,
            total_steps: 0,
            magnitude_g: 0.0,
            counting_enabled: true,
        }
    }

    /// Process one accelerometer sample. Returns `true` if a step was counted.
    pub fn update(&mut self, raw: RawAccelSample, now_ms: u64) -> bool {
        let mag = accel_magnitude_g(&raw, self.config.lsb_per_g);
        self.magnitude_g = mag;

        if !self.filter.is_primed() {
            self.filter.prime(mag);
            return false;
        }

        let filtered = self.filter.filter(mag);
        tracing::trace!(mag, filtered, "motion sample");

        if !self.counting_enabled || filtered <= self.config.threshold_g {
            return false;
        }

        let refractory_elapsed = self
            .last_step_ms
            .map_or(true, |last| now_ms.saturating_sub(last) > self.config.refractory_ms);
        if !refractory_elapsed {
            return false;
        }

        self.total_steps = self.total_steps.wrapping_add(1);
        self.last_step_ms = Some(now_ms);
        tracing::debug!(total = self.total_steps, filtered, "step");
        true
    }

    /// Read one sample from `source` and process it.
    pub fn read_from<S: AccelSource>(&mut self, source: &mut S, now_ms: u64) -> bool {
        let raw = source.read_accel();
        self.update(raw, now_ms)
    }

    /// Zero the step count. The refractory timer is kept.
    pub fn reset_step_count(&mut self) {
        tracing::info!(total = self.total_steps, "step count reset");
        self.total_steps = 0;
    }

    /// Enable or pause counting; filtering continues either way.
    pub fn set_counting_enabled(&mut self, enabled: bool) {
        if enabled != self.counting_enabled {
            tracing::info!(enabled, "step counting toggled");
        }
        self.counting_enabled = enabled;
    }

    /// Whether steps are currently being counted.
    #[must_use]
    pub const fn counting_enabled(&self) -> bool {
        self.counting_enabled
    }

    /// Steps counted since the last reset.
    #[inline]
    #[must_use]
    pub const fn total_steps(&self) -> u32 {
        self.total_steps
    }

    /// Snapshot of the counter state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> StepState {
        StepState {
            total_steps: self.total_steps,
            magnitude_g: self.magnitude_g,
        }
    }
}

impl Default for StepDetector {
    fn default() -> Self {
        Self::new(StepConfig::default())
    }
}
