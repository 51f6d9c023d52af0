//! Filters and small numeric helpers (`no_std` compatible)
//!
//! This module provides:
//! - One-pole high-pass and low-pass filters on `f32`
//! - Acceleration magnitude from raw counts
//! - A fixed-window heart-rate averager

use serde::{Deserialize, Serialize};

use crate::types::RawAccelSample;

// ============================================================================
// Constants
// ============================================================================

/// Signal-chain constants
pub mod constants {
    /// Accelerometer counts per g at the ±2 g range
    pub const ACCEL_LSB_PER_G_2G: f32 = 16384.0;

    /// Milliseconds per minute
    pub const MS_PER_MINUTE: f32 = 60_000.0;

    /// Lowest BPM accepted from a single beat interval (exclusive)
    pub const BPM_MIN_EXCLUSIVE: f32 = 20.0;

    /// Highest BPM accepted from a single beat interval (exclusive)
    pub const BPM_MAX_EXCLUSIVE: f32 = 255.0;

    /// Number of beat intervals averaged into the reported heart rate
    pub const BPM_WINDOW: usize = 4;
}

// ============================================================================
// High-Pass Filter
// ============================================================================

/// First-order high-pass filter.
///
/// Implements: y[n] = α · (y[n-1] + x[n] − x[n-1])
///
/// Removes the static gravity component from acceleration magnitude.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HighPassFilter {
    alpha: f32,
    prev_input: f32,
    state: f32,
    primed: bool,
}

impl HighPassFilter {
    /// Create a filter with the given coefficient (0 < α < 1).
    #[must_use]
    pub const fn new(alpha: f32) -> Self {
        Self {
            alpha,
            prev_input: 0.0,
            state: 0.0,
            primed: false,
        }
    }

    /// Seed the previous input so the first real sample produces no step.
    #[inline]
    pub fn prime(&mut self, input: f32) {
        self.prev_input = input;
        self.state = 0.0;
        self.primed = true;
    }

    /// Whether [`prime`](Self::prime) has been called since the last reset.
    #[inline]
    #[must_use]
    pub const fn is_primed(&self) -> bool {
        self.primed
    }

    /// Process a single sample.
    #[inline]
    pub fn filter(&mut self, input: f32) -> f32 {
        self.state = self.alpha * (self.state + input - self.prev_input);
        self.prev_input = input;
        self.state
    }

    /// Current output.
    #[inline]
    #[must_use]
    pub const fn output(&self) -> f32 {
        self.state
    }

    /// Clear all state.
    pub fn reset(&mut self) {
        self.prev_input = 0.0;
        self.state = 0.0;
        self.primed = false;
    }
}

// ============================================================================
// Low-Pass Filter
// ============================================================================

/// First-order IIR low-pass filter.
///
/// Implements: y[n] = α · x[n] + (1 − α) · y[n-1]
///
/// The first input initialises the state directly so there is no start-up
/// transient from zero.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LowPassFilter {
    alpha: f32,
    state: f32,
    initialised: bool,
}

impl LowPassFilter {
    /// Create a filter with a direct coefficient (0 < α ≤ 1).
    #[must_use]
    pub const fn new(alpha: f32) -> Self {
        Self {
            alpha,
            state: 0.0,
            initialised: false,
        }
    }

    /// Process a single sample.
    #[inline]
    pub fn filter(&mut self, input: f32) -> f32 {
        if self.initialised {
            self.state += self.alpha * (input - self.state);
        } else {
            self.state = input;
            self.initialised = true;
        }
        self.state
    }

    /// Current output.
    #[inline]
    #[must_use]
    pub const fn output(&self) -> f32 {
        self.state
    }

    /// Forget the state; the next input re-initialises it.
    #[inline]
    pub fn reset(&mut self) {
        self.state = 0.0;
        self.initialised = false;
    }
}

// ============================================================================
// Acceleration Magnitude
// ============================================================================

/// Magnitude of a raw accelerometer vector in g.
#[inline]
#[must_use]
pub fn accel_magnitude_g(sample: &RawAccelSample, lsb_per_g: f32) -> f32 {
    let ax = f32::from(sample.x) / lsb_per_g;
    let ay = f32::from(sample.y) / lsb_per_g;
    let az = f32::from(sample.z) / lsb_per_g;
    libm::sqrtf(ax * ax + ay * ay + az * az)
}

// ============================================================================
// Heart-Rate Averager
// ============================================================================

/// How empty slots count before the window has been filled once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarmupPolicy {
    /// Empty slots hold zero and are averaged in (reads low until full)
    #[default]
    ZeroPrimed,
    /// Only filled slots are averaged
    FilledOnly,
}

/// Ring of the last `N` accepted BPM values with an integer mean.
#[derive(Clone, Debug)]
pub struct BpmAverager<const N: usize> {
    slots: [u8; N],
    index: usize,
    filled: usize,
    policy: WarmupPolicy,
}

impl<const N: usize> BpmAverager<N> {
    /// Create an empty averager.
    #[must_use]
    pub const fn new(policy: WarmupPolicy) -> Self {
        Self {
            slots: [0; N],
            index: 0,
            filled: 0,
            policy,
        }
    }

    /// Store a value and return the new average.
    pub fn push(&mut self, bpm: u8) -> u8 {
        self.slots[self.index] = bpm;
        self.index = (self.index + 1) % N;
        if self.filled < N {
            self.filled += 1;
        }
        self.average()
    }

    /// Integer mean according to the warm-up policy.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn average(&self) -> u8 {
        let sum: u32 = self.slots.iter().map(|&b| u32::from(b)).sum();
        let count = match self.policy {
            WarmupPolicy::ZeroPrimed => N,
            WarmupPolicy::FilledOnly => self.filled.max(1),
        };
        (sum / count as u32) as u8
    }

    /// Number of values pushed, saturating at `N`.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.filled
    }

    /// Whether nothing has been pushed yet.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Reset all slots to zero.
    pub fn reset(&mut self) {
        self.slots = [0; N];
        self.index = 0;
        self.filled = 0;
    }
}

impl<const N: usize> Default for BpmAverager<N> {
    fn default() -> Self {
        Self::new(WarmupPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_high_pass_removes_dc() {
        let mut hp = HighPassFilter::new(0.9);
        hp.prime(1.0);
        let mut y = 0.0;
        for _ in 0..200 {
            y = hp.filter(1.0);
        }
        assert_relative_eq!(y, 0.0);
    }

    #[test]
    fn test_high_pass_step_response() {
        let mut hp = HighPassFilter::new(0.9);
        hp.prime(1.0);
        let y0 = hp.filter(1.5);
        assert_relative_eq!(y0, 0.45, epsilon = 1e-6);
        let y1 = hp.filter(1.5);
        assert_relative_eq!(y1, 0.405, epsilon = 1e-6);
    }

    #[test]
    fn test_low_pass_first_sample_initialises() {
        let mut lp = LowPassFilter::new(0.1);
        assert_relative_eq!(lp.filter(5000.0), 5000.0);
        let y = lp.filter(6000.0);
        assert_relative_eq!(y, 5100.0, epsilon = 1e-3);
    }

    #[test]
    fn test_magnitude_at_rest() {
        let s = RawAccelSample::new(0, 0, 16384);
        assert_relative_eq!(accel_magnitude_g(&s, constants::ACCEL_LSB_PER_G_2G), 1.0);
    }

    #[test]
    fn test_averager_zero_primed_reads_low() {
        let mut avg: BpmAverager<4> = BpmAverager::new(WarmupPolicy::ZeroPrimed);
        assert_eq!(avg.push(80), 20);
        assert_eq!(avg.push(80), 40);
        assert_eq!(avg.push(80), 60);
        assert_eq!(avg.push(80), 80);
    }

    #[test]
    fn test_averager_filled_only() {
        let mut avg: BpmAverager<4> = BpmAverager::new(WarmupPolicy::FilledOnly);
        assert_eq!(avg.push(80), 80);
        assert_eq!(avg.push(70), 75);
    }

    #[test]
    fn test_averager_reset() {
        let mut avg: BpmAverager<4> = BpmAverager::default();
        avg.push(90);
        avg.reset();
        assert!(avg.is_empty());
        assert_eq!(avg.average(), 0);
    }

    proptest! {
        #[test]
        fn prop_filled_only_is_mean_of_recent(values in proptest::collection::vec(21u8..=254, 1..40)) {
            let mut avg: BpmAverager<4> = BpmAverager::new(WarmupPolicy::FilledOnly);
            let mut last = 0;
            for &v in &values {
                last = avg.push(v);
            }
            let start = values.len().saturating_sub(4);
            let tail = &values[start..];
            let expected = tail.iter().map(|&v| u32::from(v)).sum::<u32>() / tail.len() as u32;
            prop_assert_eq!(u32::from(last), expected);
        }

        #[test]
        fn prop_zero_primed_after_fill_is_mean(values in proptest::collection::vec(21u8..=254, 4..40)) {
            let mut avg: BpmAverager<4> = BpmAverager::new(WarmupPolicy::ZeroPrimed);
            let mut last = 0;
            for &v in &values {
                last = avg.push(v);
            }
            let tail = &values[values.len() - 4..];
            let expected = tail.iter().map(|&v| u32::from(v)).sum::<u32>() / 4;
            prop_assert_eq!(u32::from(last), expected);
        }
    }
}
