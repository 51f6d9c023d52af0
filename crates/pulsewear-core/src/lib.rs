//! Pulsewear Core - `no_std` health monitoring pipeline
//!
//! This crate turns raw optical and accelerometer samples into heart rate,
//! SpO2, step and calorie figures and delivers them to a paired receiver,
//! either one sample at a time or in buffered batches. It has no hardware
//! dependencies; sensors and the radio link plug in through small traits.
//!
//! # Modules
//!
//! - [`types`]: Raw frames, readings, health samples and the wearer profile
//! - [`error`]: Error types for sensors, payload encoding and settings
//! - [`math`]: Filters, magnitude and beat averaging helpers
//! - [`vitals`]: Heart-rate and SpO2 estimation
//! - [`motion`]: Step detection
//! - [`calories`]: Energy expenditure accumulation
//! - [`protocol`]: Binary and JSON payload formats
//! - [`buffer`]: Fixed-capacity sample ring buffer
//! - [`delivery`]: Realtime/batch delivery controller and transport trait
//! - [`profile`]: Runtime settings written by the paired app
//! - [`monitor`]: The control loop tying everything together
//!
//! # Features
//!
//! - `std`: Enable standard library support
//! - `defmt`: Enable `defmt` formatting for embedded logging
//!
//! # Example
//!
//! ```rust
//! use pulsewear_core::{RawAccelSample, StepDetector};
//!
//! let mut steps = StepDetector::default();
//! steps.update(RawAccelSample::new(0, 0, 16384), 0);
//! assert!(steps.update(RawAccelSample::new(0, 0, 24576), 20));
//! assert_eq!(steps.total_steps(), 1);
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[cfg(all(feature = "std", not(test)))]
extern crate std;

pub mod anomaly;
pub mod buffer;
pub mod calories;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod math;
pub mod monitor;
pub mod motion;
pub mod observe;
pub mod profile;
pub mod protocol;
pub mod sensor;
pub mod types;
pub mod vitals;

// Re-export commonly used types at crate root
pub use anomaly::{AnomalyScorer, NoScorer, VitalNormalization};
pub use buffer::{BufferConfig, SampleRingBuffer};
pub use calories::CalorieAccumulator;
pub use config::{PipelineConfig, TickConfig};
pub use delivery::{DeliveryController, DeliveryMode, DeliveryOutcome, Transport};
pub use error::{ProtocolError, SensorError, SettingsError};
pub use monitor::{DefaultMonitor, Devices, HealthMonitor, TickReport};
pub use motion::{StepConfig, StepDetector};
pub use observe::{NoopObserver, PipelineCounters, PipelineObserver};
pub use profile::{DeviceSettings, ProfileWrite, SettingsQueue, SettingsStore};
pub use protocol::PayloadFormat;
pub use sensor::{AccelSource, OpticalSource};
pub use types::{HealthSample, RawAccelSample, RawOpticalSample, Sex, StepState, UserProfile, VitalReading};
pub use vitals::{BeatDetector, PeakBeatDetector, VitalConfig, VitalSignEstimator};
