//! Static pipeline configuration
//!
//! Everything here is fixed at start-up. Values the paired app may change at
//! runtime live in [`crate::profile::DeviceSettings`].

use serde::{Deserialize, Serialize};

use crate::anomaly::VitalNormalization;
use crate::delivery::DeliveryConfig;
use crate::motion::StepConfig;
use crate::types::UserProfile;
use crate::vitals::VitalConfig;

/// Periods of the cooperative control-loop tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Optical FIFO drain period
    pub optical_period_ms: u64,
    /// Accelerometer read period
    pub motion_period_ms: u64,
    /// Health sample period
    pub sample_period_ms: u64,
    /// Most optical samples processed per drain
    pub max_optical_burst: usize,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            optical_period_ms: 20,
            motion_period_ms: 20,
            sample_period_ms: 500,
            max_optical_burst: 32,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Heart-rate and SpO2 estimator
    pub vitals: VitalConfig,
    /// Step detector
    pub steps: StepConfig,
    /// Delivery mode, format and batch policy
    pub delivery: DeliveryConfig,
    /// Task periods
    pub ticks: TickConfig,
    /// Profile used until the app writes one
    pub profile: UserProfile,
    /// Anomaly model input scaling
    pub normalization: VitalNormalization,
}

/// Fixed-period task timer.
///
/// Fires on the first check, then every `period_ms`. Missed periods are
/// skipped rather than replayed.
#[derive(Clone, Copy, Debug)]
pub struct Periodic {
    period_ms: u64,
    next_due_ms: Option<u64>,
}

impl Periodic {
    /// Timer with the given period.
    #[must_use]
    pub const fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            next_due_ms: None,
        }
    }

    /// Whether the task should run at `now_ms`; advances the schedule if so.
    pub fn due(&mut self, now_ms: u64) -> bool {
        match self.next_due_ms {
            Some(next) if now_ms < next => false,
            Some(next) => {
                let mut following = next + self.period_ms;
                if following <= now_ms {
                    following = now_ms + self.period_ms;
                }
                self.next_due_ms = Some(following);
                true
            }
            None => {
                self.next_due_ms = Some(now_ms + self.period_ms);
                true
            }
        }
    }
}
