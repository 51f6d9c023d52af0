//! Fixed-capacity ring buffer of health samples
//!
//! When full, the oldest sample is overwritten. Iteration and serialization
//! always run oldest to newest.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::protocol::{encode_batch, PayloadFormat};
use crate::types::HealthSample;

/// Default number of retained samples.
pub const DEFAULT_CAPACITY: usize = 10;

/// Batch send policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Samples required before a send is considered (clamped to `1..=N`)
    pub min_samples_to_send: usize,
    /// Age of the oldest pending sample that triggers a send
    pub send_interval_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            min_samples_to_send: 1,
            send_interval_ms: 60_000,
        }
    }
}

/// Ring buffer of the last `N` samples. `N` must be non-zero.
#[derive(Clone, Debug)]
pub struct SampleRingBuffer<const N: usize> {
    slots: [HealthSample; N],
    head: usize,
    count: usize,
    first_sample_ms: Option<u64>,
    min_samples_to_send: usize,
    send_interval_ms: u64,
}

impl<const N: usize> SampleRingBuffer<N> {
    /// Create an empty buffer.
    #[must_use]
    pub fn new(config: BufferConfig) -> Self {
        Self {
            slots: [HealthSample::ZERO; N],
            head: 0,
            count: 0,
            first_sample_ms: None,
            min_samples_to_send: config.min_samples_to_send.clamp(1, N.max(1)),
            send_interval_ms: config.send_interval_ms,
        }
    }

    /// Store a sample, overwriting the oldest when full. SpO2 is capped at 100.
    ///
    /// Returns `true` if the buffer is full after the write.
    pub fn add_sample(&mut self, mut sample: HealthSample, now_ms: u64) -> bool {
        sample.spo2 = sample.spo2.min(100);
        if self.count == 0 {
            self.first_sample_ms = Some(now_ms);
        }

        self.slots[self.head] = sample;
        self.head = (self.head + 1) % N;
        if self.count < N {
            self.count += 1;
        }

        tracing::trace!(count = self.count, hr = sample.heart_rate, spo2 = sample.spo2, "sample buffered");
        self.is_full()
    }

    /// Truncate float estimates into a sample and store it.
    pub fn add_reading(&mut self, heart_rate_bpm: f32, spo2_percent: f32, steps: u32, timestamp_s: u32, now_ms: u64) -> bool {
        self.add_sample(HealthSample::from_estimates(heart_rate_bpm, spo2_percent, steps, timestamp_s), now_ms)
    }

    /// Whether a batch should be sent now.
    ///
    /// True once enough samples are pending and either the buffer is full or
    /// the oldest pending sample is older than the send interval.
    pub fn should_send(&self, now_ms: u64) -> bool {
        if self.count < self.min_samples_to_send {
            return false;
        }
        if self.is_full() {
            return true;
        }
        self.first_sample_ms
            .is_some_and(|first| now_ms.saturating_sub(first) >= self.send_interval_ms)
    }

    /// Samples oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &HealthSample> + '_ {
        let start = (self.head + N - self.count) % N;
        (0..self.count).map(move |i| &self.slots[(start + i) % N])
    }

    /// Copy of the pending samples, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> heapless::Vec<HealthSample, N> {
        self.iter().copied().collect()
    }

    /// Encode all pending samples into `out`.
    pub fn serialize(&self, format: PayloadFormat, out: &mut [u8]) -> Result<usize, ProtocolError> {
        encode_batch(format, &self.to_vec(), out)
    }

    /// Drop all samples and reset the send timer.
    pub fn clear(&mut self) {
        self.head = 0;
        self.count = 0;
        self.first_sample_ms = None;
    }

    /// Drop the `n` oldest samples. The send timer keeps running while
    /// samples remain.
    pub fn discard_oldest(&mut self, n: usize) {
        if n >= self.count {
            self.clear();
        } else {
            self.count -= n;
        }
    }

    /// Most recent sample, or [`HealthSample::ZERO`] when empty.
    #[must_use]
    pub fn latest(&self) -> HealthSample {
        if self.count == 0 {
            return HealthSample::ZERO;
        }
        let idx = if self.head == 0 { N - 1 } else { self.head - 1 };
        self.slots[idx]
    }

    /// Number of pending samples.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Whether no samples are pending.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether the next write overwrites the oldest sample.
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.count == N
    }

    /// Maximum number of samples held.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for SampleRingBuffer<N> {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}
