//! Runtime settings written by the paired app
//!
//! Writers (the BLE write callback) only enqueue [`ProfileWrite`] values on a
//! single-producer queue. The control loop drains the queue between ticks and
//! publishes a fresh [`DeviceSettings`] snapshot, so readers never observe a
//! half-applied profile.

use heapless::spsc::Consumer;
use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryMode;
use crate::error::SettingsError;
use crate::types::{Sex, UserProfile};

/// Depth of the settings write queue (holds one less than this).
pub const SETTINGS_QUEUE_DEPTH: usize = 8;

/// Queue type shared between the write callback and the control loop.
pub type SettingsQueue = heapless::spsc::Queue<ProfileWrite, SETTINGS_QUEUE_DEPTH>;

/// A single field update from the paired app.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProfileWrite {
    /// Body weight in kilograms
    WeightKg(f32),
    /// Height in metres; clears any BMI override
    HeightM(f32),
    /// BMI supplied instead of a height
    Bmi(f32),
    /// Age in years
    AgeYears(u8),
    /// Biological sex
    Sex(Sex),
    /// Enable or pause step counting
    StepCounting(bool),
    /// Delivery mode
    DeliveryMode(DeliveryMode),
    /// Wall-clock time in Unix seconds
    TimeSync {
        /// Seconds since the Unix epoch
        epoch_s: u32,
    },
}

impl ProfileWrite {
    /// Check the value is plausible.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let (field, value, lo, hi) = match *self {
            Self::WeightKg(v) => ("weight_kg", v, 0.0, 500.0),
            Self::HeightM(v) => ("height_m", v, 0.0, 3.0),
            Self::Bmi(v) => ("bmi", v, 5.0, 100.0),
            _ => return Ok(()),
        };
        if value.is_nan() || value <= lo || value > hi {
            return Err(SettingsError::OutOfRange { field, value });
        }
        Ok(())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ProfileWrite {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::WeightKg(v) => defmt::write!(f, "weight {}kg", v),
            Self::HeightM(v) => defmt::write!(f, "height {}m", v),
            Self::Bmi(v) => defmt::write!(f, "bmi {}", v),
            Self::AgeYears(v) => defmt::write!(f, "age {}", v),
            Self::Sex(s) => defmt::write!(f, "sex {}", s),
            Self::StepCounting(on) => defmt::write!(f, "steps {}", on),
            Self::DeliveryMode(m) => defmt::write!(f, "mode {}", m),
            Self::TimeSync { epoch_s } => defmt::write!(f, "time {}", epoch_s),
        }
    }
}

/// Settings snapshot read by the control loop.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Wearer profile
    pub profile: UserProfile,
    /// Whether steps are counted
    pub step_counting: bool,
    /// Delivery mode requested by the app
    pub delivery_mode: DeliveryMode,
    /// Last time sync received, if any
    pub time_sync_epoch_s: Option<u32>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            profile: UserProfile::default(),
            step_counting: true,
            delivery_mode: DeliveryMode::default(),
            time_sync_epoch_s: None,
        }
    }
}

impl DeviceSettings {
    /// Copy of `self` with one write applied.
    #[must_use]
    pub fn with(mut self, write: ProfileWrite) -> Self {
        match write {
            ProfileWrite::WeightKg(v) => self.profile.weight_kg = v,
            ProfileWrite::HeightM(v) => {
                self.profile.height_m = v;
                self.profile.bmi_override = None;
            }
            ProfileWrite::Bmi(v) => self.profile.bmi_override = Some(v),
            ProfileWrite::AgeYears(v) => self.profile.age_years = v,
            ProfileWrite::Sex(s) => self.profile.sex = s,
            ProfileWrite::StepCounting(on) => self.step_counting = on,
            ProfileWrite::DeliveryMode(m) => self.delivery_mode = m,
            ProfileWrite::TimeSync { epoch_s } => self.time_sync_epoch_s = Some(epoch_s),
        }
        self
    }
}

/// Holds the current snapshot and applies queued writes.
#[derive(Clone, Debug, Default)]
pub struct SettingsStore {
    current: DeviceSettings,
    revision: u32,
}

impl SettingsStore {
    /// Store starting from `initial`.
    #[must_use]
    pub const fn new(initial: DeviceSettings) -> Self {
        Self {
            current: initial,
            revision: 0,
        }
    }

    /// Current snapshot.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> &DeviceSettings {
        &self.current
    }

    /// Incremented every time a new snapshot is published.
    #[inline]
    #[must_use]
    pub const fn revision(&self) -> u32 {
        self.revision
    }

    /// Drain all queued writes into one new snapshot.
    ///
    /// Invalid writes are skipped with a warning. Returns the previous
    /// snapshot when anything changed.
    pub fn apply_pending<const Q: usize>(&mut self, queue: &mut Consumer<'_, ProfileWrite, Q>) -> Option<DeviceSettings> {
        let mut next = self.current;
        while let Some(write) = queue.dequeue() {
            match write.validate() {
                Ok(()) => next = next.with(write),
                Err(e) => tracing::warn!(error = %e, "settings write ignored"),
            }
        }
        self.publish(next)
    }

    /// Apply a single write immediately (host tools and tests).
    pub fn apply(&mut self, write: ProfileWrite) -> Result<Option<DeviceSettings>, SettingsError> {
        write.validate()?;
        Ok(self.publish(self.current.with(write)))
    }

    fn publish(&mut self, next: DeviceSettings) -> Option<DeviceSettings> {
        if next == self.current {
            return None;
        }
        let previous = core::mem::replace(&mut self.current, next);
        self.revision = self.revision.wrapping_add(1);
        tracing::info!(
            revision = self.revision,
            weight_kg = next.profile.weight_kg,
            age = next.profile.age_years,
            bmr = next.profile.bmr_kcal_per_day(),
            "settings updated"
        );
        Some(previous)
    }
}

/// Enqueue a write from the producer side; fails when the queue is full.
pub fn submit<const Q: usize>(
    producer: &mut heapless::spsc::Producer<'_, ProfileWrite, Q>,
    write: ProfileWrite,
) -> Result<(), SettingsError> {
    producer.enqueue(write).map_err(|_| SettingsError::QueueFull)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_writes_batched_into_one_snapshot() {
        let mut queue: SettingsQueue = SettingsQueue::new();
        let (mut tx, mut rx) = queue.split();
        let mut store = SettingsStore::default();

        submit(&mut tx, ProfileWrite::WeightKg(80.0)).unwrap();
        submit(&mut tx, ProfileWrite::AgeYears(40)).unwrap();
        submit(&mut tx, ProfileWrite::Sex(Sex::Female)).unwrap();

        // nothing visible until the loop drains the queue
        assert_relative_eq!(store.current().profile.weight_kg, 65.0);

        let previous = store.apply_pending(&mut rx).unwrap();
        assert_relative_eq!(previous.profile.weight_kg, 65.0);
        assert_eq!(store.revision(), 1);
        let p = store.current().profile;
        assert_relative_eq!(p.weight_kg, 80.0);
        assert_eq!(p.age_years, 40);
        assert_eq!(p.sex, Sex::Female);
    }

    #[test]
    fn test_empty_queue_no_new_revision() {
        let mut queue: SettingsQueue = SettingsQueue::new();
        let (_tx, mut rx) = queue.split();
        let mut store = SettingsStore::default();
        assert!(store.apply_pending(&mut rx).is_none());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_invalid_write_skipped() {
        let mut queue: SettingsQueue = SettingsQueue::new();
        let (mut tx, mut rx) = queue.split();
        let mut store = SettingsStore::default();
        submit(&mut tx, ProfileWrite::WeightKg(-3.0)).unwrap();
        submit(&mut tx, ProfileWrite::HeightM(1.60)).unwrap();
        store.apply_pending(&mut rx);
        assert_relative_eq!(store.current().profile.weight_kg, 65.0);
        assert_relative_eq!(store.current().profile.height_m, 1.60);
    }

    #[test]
    fn test_queue_full() {
        let mut queue: SettingsQueue = SettingsQueue::new();
        let (mut tx, _rx) = queue.split();
        for _ in 0..SETTINGS_QUEUE_DEPTH - 1 {
            submit(&mut tx, ProfileWrite::AgeYears(30)).unwrap();
        }
        assert_eq!(submit(&mut tx, ProfileWrite::AgeYears(31)), Err(SettingsError::QueueFull));
    }

    #[test]
    fn test_bmi_then_height_clears_override() {
        let mut store = SettingsStore::default();
        store.apply(ProfileWrite::Bmi(30.0)).unwrap();
        assert_relative_eq!(store.current().profile.bmi(), 30.0);
        store.apply(ProfileWrite::HeightM(2.0)).unwrap();
        assert_eq!(store.current().profile.bmi_override, None);
    }

    #[test]
    fn test_mode_and_time_sync() {
        let mut store = SettingsStore::default();
        store.apply(ProfileWrite::DeliveryMode(DeliveryMode::Realtime)).unwrap();
        store.apply(ProfileWrite::TimeSync { epoch_s: 1_700_000_000 }).unwrap();
        store.apply(ProfileWrite::StepCounting(false)).unwrap();
        let s = store.current();
        assert_eq!(s.delivery_mode, DeliveryMode::Realtime);
        assert_eq!(s.time_sync_epoch_s, Some(1_700_000_000));
        assert!(!s.step_counting);
    }

    #[test]
    fn test_apply_rejects_out_of_range() {
        let mut store = SettingsStore::default();
        assert!(store.apply(ProfileWrite::Bmi(2.0)).is_err());
        assert!(store.apply(ProfileWrite::WeightKg(f32::NAN)).is_err());
    }
}
