//! Anomaly scoring interface
//!
//! The pipeline normalises heart rate, SpO2 and BMI and hands them to a
//! pluggable scorer. The model itself lives outside this crate.

use serde::{Deserialize, Serialize};

use crate::types::{UserProfile, VitalReading};

/// Mean and standard deviation for one model input.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureScale {
    /// Training-set mean
    pub mean: f32,
    /// Training-set standard deviation
    pub std: f32,
}

impl FeatureScale {
    /// Z-score of `x`; zero if the deviation is degenerate.
    #[inline]
    #[must_use]
    pub fn normalize(&self, x: f32) -> f32 {
        if self.std <= 0.0 {
            return 0.0;
        }
        (x - self.mean) / self.std
    }
}

/// Normalisation constants the deployed model was trained with.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalNormalization {
    /// Heart rate scale
    pub heart_rate: FeatureScale,
    /// SpO2 scale
    pub spo2: FeatureScale,
    /// BMI scale
    pub bmi: FeatureScale,
}

impl Default for VitalNormalization {
    fn default() -> Self {
        Self {
            heart_rate: FeatureScale {
                mean: 79.533_75,
                std: 11.552_865,
            },
            spo2: FeatureScale {
                mean: 97.504_37,
                std: 1.442_594_3,
            },
            bmi: FeatureScale {
                mean: 25.003_625,
                std: 6.447_143,
            },
        }
    }
}

/// Model inputs after normalisation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedVitals {
    /// Normalised heart rate
    pub heart_rate: f32,
    /// Normalised SpO2
    pub spo2: f32,
    /// Normalised BMI
    pub bmi: f32,
}

impl VitalNormalization {
    /// Normalise a reading and profile.
    #[must_use]
    pub fn apply(&self, reading: &VitalReading, profile: &UserProfile) -> NormalizedVitals {
        NormalizedVitals {
            heart_rate: self.heart_rate.normalize(reading.heart_rate_bpm),
            spo2: self.spo2.normalize(reading.spo2_percent),
            bmi: self.bmi.normalize(profile.bmi()),
        }
    }
}

/// Produces an anomaly score from normalised vitals.
pub trait AnomalyScorer {
    /// Score in [0, 1]; any negative value means no score is available.
    fn score(&mut self, vitals: &NormalizedVitals) -> f32;
}

/// Scorer used when no model is deployed.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoScorer;

impl AnomalyScorer for NoScorer {
    fn score(&mut self, _vitals: &NormalizedVitals) -> f32 {
        -1.0
    }
}

impl<T: AnomalyScorer + ?Sized> AnomalyScorer for &mut T {
    fn score(&mut self, vitals: &NormalizedVitals) -> f32 {
        (**self).score(vitals)
    }
}

/// Interpret a raw scorer output: negative or NaN is no score, anything else
/// is clamped into [0, 1].
#[must_use]
pub fn alert_from_raw(raw: f32) -> Option<f32> {
    if raw.is_nan() || raw < 0.0 {
        None
    } else {
        Some(raw.min(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Fixed(f32);

    impl AnomalyScorer for Fixed {
        fn score(&mut self, _vitals: &NormalizedVitals) -> f32 {
            self.0
        }
    }

    #[test]
    fn test_normalize_at_mean_is_zero() {
        let norm = VitalNormalization::default();
        let reading = VitalReading {
            heart_rate_bpm: 79.533_75,
            spo2_percent: 97.504_37,
            valid: true,
        };
        let profile = UserProfile {
            bmi_override: Some(25.003_625),
            ..UserProfile::default()
        };
        let v = norm.apply(&reading, &profile);
        assert_relative_eq!(v.heart_rate, 0.0, epsilon = 1e-5);
        assert_relative_eq!(v.spo2, 0.0, epsilon = 1e-5);
        assert_relative_eq!(v.bmi, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_normalize_one_std() {
        let scale = FeatureScale { mean: 10.0, std: 2.0 };
        assert_relative_eq!(scale.normalize(12.0), 1.0);
        let flat = FeatureScale { mean: 10.0, std: 0.0 };
        assert_relative_eq!(flat.normalize(12.0), 0.0);
    }

    #[test]
    fn test_alert_interpretation() {
        assert_eq!(alert_from_raw(-1.0), None);
        assert_eq!(alert_from_raw(f32::NAN), None);
        assert_eq!(alert_from_raw(0.85), Some(0.85));
        assert_eq!(alert_from_raw(3.0), Some(1.0));
        assert_eq!(alert_from_raw(0.0), Some(0.0));
    }

    #[test]
    fn test_no_scorer() {
        let v = NormalizedVitals { heart_rate: 0.0, spo2: 0.0, bmi: 0.0 };
        assert_eq!(alert_from_raw(NoScorer.score(&v)), None);
        assert_eq!(alert_from_raw(Fixed(0.4).score(&v)), Some(0.4));
    }
}
