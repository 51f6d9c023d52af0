//! Energy expenditure accumulator
//!
//! Two contributions: a per-step cost scaled by body weight, charged for new
//! steps on every update, and a heart-rate based estimate charged at most
//! once per minute of elapsed time.

use crate::math::constants::MS_PER_MINUTE;
use crate::types::{Sex, UserProfile};

/// Energy per step for a 70 kg reference body, in kcal.
pub const KCAL_PER_STEP_70KG: f32 = 0.04;

/// Minimum time between heart-rate based charges.
pub const HR_CHARGE_INTERVAL_MS: u64 = 60_000;

/// Heart rates outside (50, 200) BPM do not contribute.
const HR_VALID_MIN_EXCLUSIVE: f32 = 50.0;
const HR_VALID_MAX_EXCLUSIVE: f32 = 200.0;

const KJ_PER_KCAL: f32 = 4.184;

/// Energy for `steps` new steps, never negative.
#[inline]
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn step_energy_kcal(steps: u32, weight_kg: f32) -> f32 {
    (steps as f32 * KCAL_PER_STEP_70KG * (weight_kg / 70.0)).max(0.0)
}

/// Heart-rate based energy over `minutes`, clamped at zero.
///
/// Returns `None` when the heart rate is outside (50, 200) BPM.
#[must_use]
pub fn heart_rate_energy_kcal(profile: &UserProfile, heart_rate_bpm: f32, minutes: f32) -> Option<f32> {
    if heart_rate_bpm <= HR_VALID_MIN_EXCLUSIVE || heart_rate_bpm >= HR_VALID_MAX_EXCLUSIVE {
        return None;
    }
    let offset = match profile.sex {
        Sex::Male => 55.0969,
        Sex::Female => 20.4022,
    };
    let age = f32::from(profile.age_years);
    let per_minute_kj = age * 0.2017 - profile.weight_kg * 0.09036 + heart_rate_bpm * 0.6309 - offset;
    Some((per_minute_kj * minutes / KJ_PER_KCAL).max(0.0))
}

/// Running calorie total.
#[derive(Clone, Debug, Default)]
pub struct CalorieAccumulator {
    total_kcal: f32,
    last_step_count: u32,
    last_hr_eval_ms: Option<u64>,
}

impl CalorieAccumulator {
    /// Create an accumulator at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total_kcal: 0.0,
            last_step_count: 0,
            last_hr_eval_ms: None,
        }
    }

    /// Charge new steps and, once a minute has passed, heart-rate energy.
    ///
    /// A step total lower than the last one seen (counter reset) moves the
    /// baseline without charging anything.
    #[allow(clippy::cast_precision_loss)]
    pub fn update(&mut self, total_steps: u32, heart_rate_bpm: f32, profile: &UserProfile, now_ms: u64) {
        if total_steps > self.last_step_count {
            let delta = total_steps - self.last_step_count;
            self.total_kcal += step_energy_kcal(delta, profile.weight_kg);
        }
        self.last_step_count = total_steps;

        let Some(last) = self.last_hr_eval_ms else {
            self.last_hr_eval_ms = Some(now_ms);
            return;
        };

        let elapsed = now_ms.saturating_sub(last);
        if elapsed < HR_CHARGE_INTERVAL_MS {
            return;
        }
        self.last_hr_eval_ms = Some(now_ms);

        let minutes = elapsed as f32 / MS_PER_MINUTE;
        match heart_rate_energy_kcal(profile, heart_rate_bpm, minutes) {
            Some(kcal) => {
                self.total_kcal += kcal;
                tracing::debug!(kcal, minutes, total = self.total_kcal, "heart-rate energy charged");
            }
            None => tracing::trace!(heart_rate_bpm, "heart rate outside energy model range"),
        }
    }

    /// Accumulated energy in kcal.
    #[inline]
    #[must_use]
    pub const fn total_kcal(&self) -> f32 {
        self.total_kcal
    }

    /// Zero the total and all bookkeeping.
    pub fn reset(&mut self) {
        tracing::info!(total = self.total_kcal, "calorie total reset");
        *self = Self::new();
    }
}
