//! Core data types for the Pulsewear pipeline
//!
//! Raw sensor frames, derived readings, the emitted [`HealthSample`] and the
//! user profile that feeds the energy and anomaly models.

use core::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Raw Sensor Frames
// ============================================================================

/// One reading from the optical front end.
///
/// Counts are the 18-bit ADC values of the infrared and red LED channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOpticalSample {
    /// Infrared channel count
    pub ir: u32,
    /// Red channel count
    pub red: u32,
}

impl RawOpticalSample {
    /// Create a new optical sample.
    #[inline]
    #[must_use]
    pub const fn new(ir: u32, red: u32) -> Self {
        Self { ir, red }
    }
}

/// One three-axis accelerometer reading in raw signed counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAccelSample {
    /// X axis
    pub x: i16,
    /// Y axis
    pub y: i16,
    /// Z axis
    pub z: i16,
}

impl RawAccelSample {
    /// Create a new accelerometer sample.
    #[inline]
    #[must_use]
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }
}

// ============================================================================
// Derived State
// ============================================================================

/// SpO2 reported before the first estimate is available.
pub const INITIAL_SPO2_PERCENT: f32 = 98.0;

/// Current heart-rate and oxygen-saturation estimate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VitalReading {
    /// Averaged heart rate in beats per minute
    pub heart_rate_bpm: f32,
    /// Estimated oxygen saturation in percent
    pub spo2_percent: f32,
    /// Whether the last input cycle produced a trustworthy estimate
    pub valid: bool,
}

impl VitalReading {
    /// Reading used at boot: no heart rate, nominal SpO2, not valid.
    pub const INITIAL: Self = Self {
        heart_rate_bpm: 0.0,
        spo2_percent: INITIAL_SPO2_PERCENT,
        valid: false,
    };
}

impl Default for VitalReading {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// Step counter state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    /// Steps counted since the last reset
    pub total_steps: u32,
    /// Most recent raw acceleration magnitude in g
    pub magnitude_g: f32,
}

// ============================================================================
// Health Sample
// ============================================================================

/// A timestamped snapshot of heart rate, SpO2 and steps.
///
/// Heart rate and SpO2 are truncated to integers; the timestamp is in
/// seconds (epoch seconds once the clock has been synchronised, boot-relative
/// before).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HealthSample {
    /// Heart rate in BPM
    pub heart_rate: u8,
    /// SpO2 in percent
    pub spo2: u8,
    /// Cumulative step count
    pub steps: u32,
    /// Timestamp in seconds
    pub timestamp_s: u32,
}

impl HealthSample {
    /// All-zero sample, returned when nothing has been recorded yet.
    pub const ZERO: Self = Self {
        heart_rate: 0,
        spo2: 0,
        steps: 0,
        timestamp_s: 0,
    };

    /// Create a sample from integer fields.
    #[inline]
    #[must_use]
    pub const fn new(heart_rate: u8, spo2: u8, steps: u32, timestamp_s: u32) -> Self {
        Self {
            heart_rate,
            spo2,
            steps,
            timestamp_s,
        }
    }

    /// Create a sample from float estimates, truncating toward zero.
    ///
    /// SpO2 is clamped to `0..=100`, heart rate saturates at `0..=255`; NaN
    /// maps to 0.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_estimates(heart_rate_bpm: f32, spo2_percent: f32, steps: u32, timestamp_s: u32) -> Self {
        Self {
            heart_rate: heart_rate_bpm as u8,
            spo2: spo2_percent.clamp(0.0, 100.0) as u8,
            steps,
            timestamp_s,
        }
    }
}

// ============================================================================
// User Profile
// ============================================================================

/// Biological sex, as used by the energy and BMR formulas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Sex {
    /// Female
    Female = 0,
    /// Male
    #[default]
    Male = 1,
}

impl Sex {
    /// Decode the characteristic byte (1 = male, anything else = female).
    #[inline]
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        if b == 1 {
            Self::Male
        } else {
            Self::Female
        }
    }

    /// Encode as the characteristic byte.
    #[inline]
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Female => write!(f, "female"),
            Self::Male => write!(f, "male"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Sex {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Female => defmt::write!(f, "female"),
            Self::Male => defmt::write!(f, "male"),
        }
    }
}

/// Wearer profile used by the calorie, BMR and anomaly models.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Biological sex
    pub sex: Sex,
    /// Body weight in kilograms
    pub weight_kg: f32,
    /// Height in metres
    pub height_m: f32,
    /// Age in years
    pub age_years: u8,
    /// BMI supplied directly instead of a height, if any
    pub bmi_override: Option<f32>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            sex: Sex::Male,
            weight_kg: 65.0,
            height_m: 1.77,
            age_years: 21,
            bmi_override: None,
        }
    }
}

impl UserProfile {
    /// Body mass index in kg/m².
    ///
    /// A directly supplied BMI takes precedence over weight and height.
    #[must_use]
    pub fn bmi(&self) -> f32 {
        if let Some(bmi) = self.bmi_override {
            return bmi;
        }
        if self.height_m <= 0.0 {
            return 0.0;
        }
        self.weight_kg / (self.height_m * self.height_m)
    }

    /// Height in metres, derived from the BMI override when one is set.
    #[must_use]
    pub fn effective_height_m(&self) -> f32 {
        match self.bmi_override {
            Some(bmi) if bmi > 0.0 && self.weight_kg > 0.0 => libm::sqrtf(self.weight_kg / bmi),
            _ => self.height_m,
        }
    }

    /// Basal metabolic rate in kcal/day (Mifflin-St Jeor).
    #[must_use]
    pub fn bmr_kcal_per_day(&self) -> f32 {
        let height_cm = self.effective_height_m() * 100.0;
        let base = 10.0 * self.weight_kg + 6.25 * height_cm - 5.0 * f32::from(self.age_years);
        match self.sex {
            Sex::Male => base + 5.0,
            Sex::Female => base - 161.0,
        }
    }
}
