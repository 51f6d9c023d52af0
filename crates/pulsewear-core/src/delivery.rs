//! Delivery mode controller
//!
//! In realtime mode every sample is pushed to the transport as it is
//! produced. In batch mode samples accumulate in the ring buffer and are sent
//! together when the buffer's send policy fires.
//!
//! Switching from batch to realtime flushes whatever was pending on the next
//! poll, retrying until the transport accepts it. Realtime mode does not add
//! to the buffer. Batches are split to fit the link's payload limit.

use serde::{Deserialize, Serialize};

use crate::buffer::{BufferConfig, SampleRingBuffer};
use crate::error::ProtocolError;
use crate::protocol::{encode_batch, encode_report, PayloadFormat, SampleReport};
use crate::types::{HealthSample, StepState, VitalReading};

/// Scratch space for one outgoing payload.
pub const MAX_PAYLOAD_SIZE: usize = 512;

// ============================================================================
// Transport
// ============================================================================

/// Outbound notification channel to the paired receiver.
pub trait Transport {
    /// Push one payload. Returns `false` if no receiver took it.
    fn notify(&mut self, payload: &[u8]) -> bool;

    /// Whether a receiver is currently attached.
    fn is_connected(&self) -> bool {
        true
    }

    /// Largest payload the link accepts in one notification.
    fn max_payload_len(&self) -> usize {
        MAX_PAYLOAD_SIZE
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn notify(&mut self, payload: &[u8]) -> bool {
        (**self).notify(payload)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn max_payload_len(&self) -> usize {
        (**self).max_payload_len()
    }
}

// ============================================================================
// Modes and Outcomes
// ============================================================================

/// How samples leave the device.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DeliveryMode {
    /// One notification per sample
    Realtime = 0,
    /// Buffered and sent in batches
    #[default]
    Batch = 1,
}

impl DeliveryMode {
    /// Try to convert a byte to a mode.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Realtime),
            1 => Some(Self::Batch),
            _ => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DeliveryMode {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Realtime => defmt::write!(f, "realtime"),
            Self::Batch => defmt::write!(f, "batch"),
        }
    }
}

/// Result of a record or poll call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Nothing was due
    Idle,
    /// Reading was not valid; no sample was produced
    NoValidReading,
    /// Sample stored for a later batch
    Buffered {
        /// Samples now pending
        pending: usize,
    },
    /// Payload handed to the transport
    Sent {
        /// Encoded size
        bytes: usize,
        /// Samples in the payload
        samples: usize,
    },
    /// No receiver; pending samples retained
    Deferred {
        /// Samples still pending
        pending: usize,
    },
    /// No receiver in realtime mode; the sample is gone
    Dropped,
}

/// Optional values attached to a realtime sample.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SampleExtras {
    /// Calories burned so far
    pub calories_kcal: Option<f32>,
    /// Anomaly score in [0, 1]
    pub alert: Option<f32>,
}

/// Controller configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Mode at start-up
    pub mode: DeliveryMode,
    /// Payload encoding
    pub format: PayloadFormat,
    /// Batch send policy
    pub buffer: BufferConfig,
}

// ============================================================================
// Controller
// ============================================================================

/// Routes samples to the transport according to the active mode.
#[derive(Clone, Debug)]
pub struct DeliveryController<const N: usize> {
    mode: DeliveryMode,
    format: PayloadFormat,
    buffer: SampleRingBuffer<N>,
    scratch: [u8; MAX_PAYLOAD_SIZE],
    flush_pending: bool,
}

impl<const N: usize> DeliveryController<N> {
    /// Create a controller with an empty buffer.
    #[must_use]
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            mode: config.mode,
            format: config.format,
            buffer: SampleRingBuffer::new(config.buffer),
            scratch: [0; MAX_PAYLOAD_SIZE],
            flush_pending: false,
        }
    }

    /// Active mode.
    #[inline]
    #[must_use]
    pub const fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Active payload format.
    #[inline]
    #[must_use]
    pub const fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Change the payload format for subsequent sends.
    pub fn set_format(&mut self, format: PayloadFormat) {
        self.format = format;
    }

    /// Switch mode. Leaving batch mode schedules a flush of pending samples.
    pub fn set_mode(&mut self, mode: DeliveryMode) {
        if mode == self.mode {
            return;
        }
        self.flush_pending = mode == DeliveryMode::Realtime && !self.buffer.is_empty();
        tracing::info!(?mode, pending = self.buffer.len(), "delivery mode changed");
        self.mode = mode;
    }

    /// Build a sample from the latest estimates and route it.
    ///
    /// Invalid readings produce no sample. A payload that does not fit the
    /// link is an error; nothing is sent in that case.
    pub fn record<T: Transport>(
        &mut self,
        reading: &VitalReading,
        steps: &StepState,
        extras: SampleExtras,
        timestamp_s: u32,
        now_ms: u64,
        transport: &mut T,
    ) -> Result<DeliveryOutcome, ProtocolError> {
        if !reading.valid {
            return Ok(DeliveryOutcome::NoValidReading);
        }

        let sample =
            HealthSample::from_estimates(reading.heart_rate_bpm, reading.spo2_percent, steps.total_steps, timestamp_s);

        match self.mode {
            DeliveryMode::Realtime => {
                let report = SampleReport {
                    sample,
                    calories_kcal: extras.calories_kcal,
                    alert: extras.alert,
                };
                self.send_report(&report, transport)
            }
            DeliveryMode::Batch => {
                self.buffer.add_sample(sample, now_ms);
                Ok(DeliveryOutcome::Buffered {
                    pending: self.buffer.len(),
                })
            }
        }
    }

    /// Send a batch if one is due.
    ///
    /// A batch larger than the link allows goes out as the longest oldest-first
    /// run that fits; the rest stays pending and is sent on the following
    /// polls.
    pub fn poll<T: Transport>(&mut self, now_ms: u64, transport: &mut T) -> Result<DeliveryOutcome, ProtocolError> {
        let due = match self.mode {
            DeliveryMode::Batch => self.buffer.should_send(now_ms),
            DeliveryMode::Realtime => false,
        };
        if !(due || (self.flush_pending && !self.buffer.is_empty())) {
            return Ok(DeliveryOutcome::Idle);
        }
        self.send_batch(transport)
    }

    fn send_batch<T: Transport>(&mut self, transport: &mut T) -> Result<DeliveryOutcome, ProtocolError> {
        let pending = self.buffer.len();
        if !transport.is_connected() {
            tracing::debug!(pending, "batch deferred: no receiver");
            return Ok(DeliveryOutcome::Deferred { pending });
        }

        let limit = transport.max_payload_len().min(MAX_PAYLOAD_SIZE);
        let (samples, bytes) = self.encode_fitting(limit).map_err(|e| {
            tracing::warn!(error = %e, pending, "sample does not fit the link");
            e
        })?;

        if !transport.notify(&self.scratch[..bytes]) {
            tracing::debug!(pending, "batch deferred: notify refused");
            return Ok(DeliveryOutcome::Deferred { pending });
        }

        self.buffer.discard_oldest(samples);
        self.flush_pending = !self.buffer.is_empty();
        tracing::info!(bytes, samples, remaining = self.buffer.len(), format = ?self.format, "batch sent");
        Ok(DeliveryOutcome::Sent { bytes, samples })
    }

    /// Encode the longest oldest-first run of pending samples that fits in
    /// `limit` bytes. Fails only when not even the oldest sample fits.
    fn encode_fitting(&mut self, limit: usize) -> Result<(usize, usize), ProtocolError> {
        let pending = self.buffer.to_vec();
        let mut take = pending.len();
        loop {
            match encode_batch(self.format, &pending[..take], &mut self.scratch[..limit]) {
                Ok(bytes) => return Ok((take, bytes)),
                Err(e) if take <= 1 => return Err(e),
                Err(_) => take -= 1,
            }
        }
    }

    fn send_report<T: Transport>(
        &mut self,
        report: &SampleReport,
        transport: &mut T,
    ) -> Result<DeliveryOutcome, ProtocolError> {
        if !transport.is_connected() {
            return Ok(DeliveryOutcome::Dropped);
        }

        let limit = transport.max_payload_len().min(MAX_PAYLOAD_SIZE);
        let bytes = encode_report(self.format, report, &mut self.scratch[..limit])?;
        if transport.notify(&self.scratch[..bytes]) {
            tracing::debug!(bytes, hr = report.sample.heart_rate, "realtime sample sent");
            Ok(DeliveryOutcome::Sent { bytes, samples: 1 })
        } else {
            Ok(DeliveryOutcome::Dropped)
        }
    }

    /// Samples waiting for a batch send.
    #[inline]
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Most recent buffered sample.
    #[must_use]
    pub fn latest_sample(&self) -> HealthSample {
        self.buffer.latest()
    }

    /// The underlying buffer.
    #[must_use]
    pub const fn buffer(&self) -> &SampleRingBuffer<N> {
        &self.buffer
    }
}
