//! Pipeline observation hook
//!
//! The monitor reports what each tick did through [`PipelineObserver`].
//! [`PipelineCounters`] keeps simple totals for periodic diagnostic dumps.

use crate::delivery::DeliveryOutcome;
use crate::error::ProtocolError;
use crate::vitals::OpticalOutcome;

/// Receives pipeline events. All methods default to doing nothing.
pub trait PipelineObserver {
    /// One optical sample was processed.
    fn on_optical(&mut self, _outcome: &OpticalOutcome) {}

    /// A step was counted.
    fn on_step(&mut self, _total_steps: u32) {}

    /// The delivery controller recorded or sent something.
    fn on_delivery(&mut self, _outcome: &DeliveryOutcome) {}

    /// Encoding a payload failed.
    fn on_encode_error(&mut self, _error: &ProtocolError) {}

    /// A new settings snapshot was published.
    fn on_settings_applied(&mut self, _revision: u32) {}
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

impl<T: PipelineObserver + ?Sized> PipelineObserver for &mut T {
    fn on_optical(&mut self, outcome: &OpticalOutcome) {
        (**self).on_optical(outcome);
    }

    fn on_step(&mut self, total_steps: u32) {
        (**self).on_step(total_steps);
    }

    fn on_delivery(&mut self, outcome: &DeliveryOutcome) {
        (**self).on_delivery(outcome);
    }

    fn on_encode_error(&mut self, error: &ProtocolError) {
        (**self).on_encode_error(error);
    }

    fn on_settings_applied(&mut self, revision: u32) {
        (**self).on_settings_applied(revision);
    }
}

/// Running totals of pipeline events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineCounters {
    /// Optical samples processed
    pub optical_samples: u32,
    /// Samples rejected by the contact gate
    pub no_contact: u32,
    /// Beats accepted into the average
    pub beats_accepted: u32,
    /// Beats rejected for an implausible interval
    pub beats_rejected: u32,
    /// Steps counted
    pub steps: u32,
    /// Samples stored in the batch buffer
    pub samples_buffered: u32,
    /// Payloads handed to the transport
    pub payloads_sent: u32,
    /// Sends held back for lack of a receiver
    pub sends_deferred: u32,
    /// Realtime samples lost for lack of a receiver
    pub samples_dropped: u32,
    /// Payloads that failed to encode
    pub encode_failures: u32,
    /// Settings snapshots published
    pub settings_applied: u32,
}

impl PipelineCounters {
    /// Return the totals and start again from zero.
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }
}

impl PipelineObserver for PipelineCounters {
    fn on_optical(&mut self, outcome: &OpticalOutcome) {
        self.optical_samples = self.optical_samples.wrapping_add(1);
        match outcome {
            OpticalOutcome::NoContact => self.no_contact = self.no_contact.wrapping_add(1),
            OpticalOutcome::Accepted { .. } => self.beats_accepted = self.beats_accepted.wrapping_add(1),
            OpticalOutcome::Rejected { .. } => self.beats_rejected = self.beats_rejected.wrapping_add(1),
            OpticalOutcome::NoBeat | OpticalOutcome::FirstBeat => {}
        }
    }

    fn on_step(&mut self, _total_steps: u32) {
        self.steps = self.steps.wrapping_add(1);
    }

    fn on_delivery(&mut self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Buffered { .. } => self.samples_buffered = self.samples_buffered.wrapping_add(1),
            DeliveryOutcome::Sent { .. } => self.payloads_sent = self.payloads_sent.wrapping_add(1),
            DeliveryOutcome::Deferred { .. } => self.sends_deferred = self.sends_deferred.wrapping_add(1),
            DeliveryOutcome::Dropped => self.samples_dropped = self.samples_dropped.wrapping_add(1),
            DeliveryOutcome::Idle | DeliveryOutcome::NoValidReading => {}
        }
    }

    fn on_encode_error(&mut self, _error: &ProtocolError) {
        self.encode_failures = self.encode_failures.wrapping_add(1);
    }

    fn on_settings_applied(&mut self, _revision: u32) {
        self.settings_applied = self.settings_applied.wrapping_add(1);
    }
}
