//! Payload formats for delivering health samples
//!
//! Three encodings are supported, selected at runtime with [`PayloadFormat`]:
//! - Compact binary records (10 bytes each, little-endian), batched in a
//!   small frame with an XOR checksum
//! - JSON records, one object per sample
//! - A JSON summary with parallel arrays, used to keep batch payloads small
//!
//! Every encoder writes into a caller-supplied slice and fails without
//! producing a partial payload when the slice is too small.

use serde::{Deserialize, Serialize, Serializer};

use crate::error::ProtocolError;
use crate::types::HealthSample;

// ============================================================================
// Formats
// ============================================================================

/// Encoding used for outgoing payloads.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PayloadFormat {
    /// Fixed-width binary records
    Binary = 0,
    /// JSON object per sample
    JsonRecords = 1,
    /// JSON summary with parallel arrays
    #[default]
    JsonSummary = 2,
}

impl PayloadFormat {
    /// Try to convert a byte to a format.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Binary),
            1 => Some(Self::JsonRecords),
            2 => Some(Self::JsonSummary),
            _ => None,
        }
    }

    /// Whether payloads in this format are UTF-8 text.
    #[must_use]
    pub const fn is_text(self) -> bool {
        !matches!(self, Self::Binary)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PayloadFormat {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Binary => defmt::write!(f, "binary"),
            Self::JsonRecords => defmt::write!(f, "json-records"),
            Self::JsonSummary => defmt::write!(f, "json-summary"),
        }
    }
}

/// A single sample as sent in realtime mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleReport {
    /// The sample
    pub sample: HealthSample,
    /// Calories burned so far (textual formats only)
    pub calories_kcal: Option<f32>,
    /// Anomaly score in [0, 1], if one was produced
    pub alert: Option<f32>,
}

impl SampleReport {
    /// Report without extras.
    #[must_use]
    pub const fn new(sample: HealthSample) -> Self {
        Self {
            sample,
            calories_kcal: None,
            alert: None,
        }
    }
}

// ============================================================================
// Binary Records
// ============================================================================

/// Size of one binary record.
pub const RECORD_SIZE: usize = 10;

/// Size of the optional alert suffix on a realtime record.
pub const ALERT_SIZE: usize = 4;

/// First byte of a binary batch frame.
pub const BATCH_FRAME_TYPE: u8 = 0xB1;

/// Frame bytes around the records: type, count and checksum.
pub const BATCH_FRAME_OVERHEAD: usize = 3;

/// Most records a binary batch frame can carry.
pub const MAX_BATCH_RECORDS: usize = u8::MAX as usize;

/// Compute XOR checksum for payload.
#[must_use]
pub fn payload_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Serialize one sample as a binary record.
///
/// Format:
/// - 1 byte: heart rate (BPM)
/// - 1 byte: SpO2 (%)
/// - 4 bytes: steps (little-endian u32)
/// - 4 bytes: timestamp in seconds (little-endian u32)
///
/// Total: 10 bytes
pub fn serialize_record(sample: &HealthSample, buffer: &mut [u8]) -> Result<usize, ProtocolError> {
    if buffer.len() < RECORD_SIZE {
        return Err(ProtocolError::BufferOverflow {
            required: RECORD_SIZE,
            available: buffer.len(),
        });
    }

    buffer[0] = sample.heart_rate;
    buffer[1] = sample.spo2;
    buffer[2..6].copy_from_slice(&sample.steps.to_le_bytes());
    buffer[6..10].copy_from_slice(&sample.timestamp_s.to_le_bytes());

    Ok(RECORD_SIZE)
}

/// Deserialize one binary record.
pub fn deserialize_record(data: &[u8]) -> Result<HealthSample, ProtocolError> {
    if data.len() < RECORD_SIZE {
        return Err(ProtocolError::IncompletePacket {
            received: data.len(),
            expected: RECORD_SIZE,
        });
    }

    Ok(HealthSample {
        heart_rate: data[0],
        spo2: data[1],
        steps: u32::from_le_bytes([data[2], data[3], data[4], data[5]]),
        timestamp_s: u32::from_le_bytes([data[6], data[7], data[8], data[9]]),
    })
}

#[allow(clippy::cast_possible_truncation)]
fn serialize_binary_batch(samples: &[HealthSample], buffer: &mut [u8]) -> Result<usize, ProtocolError> {
    if samples.len() > MAX_BATCH_RECORDS {
        return Err(ProtocolError::CapacityExceeded {
            count: samples.len(),
            capacity: MAX_BATCH_RECORDS,
        });
    }

    let required = BATCH_FRAME_OVERHEAD + samples.len() * RECORD_SIZE;
    if buffer.len() < required {
        return Err(ProtocolError::BufferOverflow {
            required,
            available: buffer.len(),
        });
    }

    buffer[0] = BATCH_FRAME_TYPE;
    buffer[1] = samples.len() as u8;
    let mut offset = 2;
    for sample in samples {
        offset += serialize_record(sample, &mut buffer[offset..])?;
    }
    buffer[offset] = payload_checksum(&buffer[..offset]);

    Ok(required)
}

fn deserialize_binary_batch<const N: usize>(data: &[u8]) -> Result<heapless::Vec<HealthSample, N>, ProtocolError> {
    if data.len() < BATCH_FRAME_OVERHEAD {
        return Err(ProtocolError::IncompletePacket {
            received: data.len(),
            expected: BATCH_FRAME_OVERHEAD,
        });
    }
    if data[0] != BATCH_FRAME_TYPE {
        return Err(ProtocolError::InvalidPacketType { packet_type: data[0] });
    }

    let count = usize::from(data[1]);
    let expected = BATCH_FRAME_OVERHEAD + count * RECORD_SIZE;
    if data.len() != expected {
        return Err(ProtocolError::IncompletePacket {
            received: data.len(),
            expected,
        });
    }
    if count > N {
        return Err(ProtocolError::CapacityExceeded { count, capacity: N });
    }

    let body = &data[..expected - 1];
    let computed = payload_checksum(body);
    let stored = data[expected - 1];
    if computed != stored {
        return Err(ProtocolError::ChecksumMismatch {
            expected: stored,
            computed,
        });
    }

    let mut out = heapless::Vec::new();
    for chunk in body[2..].chunks_exact(RECORD_SIZE) {
        out.push(deserialize_record(chunk)?)
            .map_err(|_| ProtocolError::CapacityExceeded { count, capacity: N })?;
    }
    Ok(out)
}

// ============================================================================
// JSON Records
// ============================================================================

/// One sample as a JSON object.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
struct JsonRecord {
    hr: u8,
    spo2: u8,
    steps: u32,
    ts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cal: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alert: Option<f32>,
}

impl JsonRecord {
    fn from_sample(sample: &HealthSample) -> Self {
        Self {
            hr: sample.heart_rate,
            spo2: sample.spo2,
            steps: sample.steps,
            ts: sample.timestamp_s,
            cal: None,
            alert: None,
        }
    }

    const fn to_sample(self) -> HealthSample {
        HealthSample::new(self.hr, self.spo2, self.steps, self.ts)
    }
}

/// Sequence adaptor so records serialize without an intermediate buffer.
struct RecordSeq<'a>(&'a [HealthSample]);

impl Serialize for RecordSeq<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(JsonRecord::from_sample))
    }
}

fn round_to(value: f32, scale: f32) -> f32 {
    libm::roundf(value * scale) / scale
}

// ============================================================================
// JSON Summary
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum SummaryKind {
    #[serde(rename = "batch")]
    Batch,
}

/// One field of every sample, serialized as an array.
struct Column<'a> {
    samples: &'a [HealthSample],
    field: fn(&HealthSample) -> u32,
}

impl Serialize for Column<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.samples.iter().map(self.field))
    }
}

#[derive(Serialize)]
struct SummaryOut<'a> {
    #[serde(rename = "type")]
    kind: SummaryKind,
    count: usize,
    start_ts: u32,
    interval: u32,
    hr: Column<'a>,
    spo2: Column<'a>,
    steps: Column<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<Column<'a>>,
}

#[derive(Deserialize)]
struct SummaryIn<const N: usize> {
    #[serde(rename = "type")]
    _kind: SummaryKind,
    count: usize,
    start_ts: u32,
    interval: u32,
    hr: heapless::Vec<u8, N>,
    spo2: heapless::Vec<u8, N>,
    steps: heapless::Vec<u32, N>,
    #[serde(default)]
    ts: Option<heapless::Vec<u32, N>>,
}

/// Common spacing of the timestamps, if there is one.
fn uniform_interval(samples: &[HealthSample]) -> Option<u32> {
    let interval = match samples {
        [a, b, ..] => b.timestamp_s.wrapping_sub(a.timestamp_s),
        _ => return Some(1),
    };
    samples
        .windows(2)
        .all(|w| w[1].timestamp_s.wrapping_sub(w[0].timestamp_s) == interval)
        .then_some(interval)
}

fn serialize_summary(samples: &[HealthSample], buffer: &mut [u8]) -> Result<usize, ProtocolError> {
    let first = samples.first().ok_or(ProtocolError::Empty)?;
    let uniform = uniform_interval(samples);
    let interval = uniform.unwrap_or_else(|| match samples {
        [a, b, ..] => b.timestamp_s.wrapping_sub(a.timestamp_s),
        _ => 1,
    });

    let summary = SummaryOut {
        kind: SummaryKind::Batch,
        count: samples.len(),
        start_ts: first.timestamp_s,
        interval,
        hr: Column { samples, field: |s| u32::from(s.heart_rate) },
        spo2: Column { samples, field: |s| u32::from(s.spo2) },
        steps: Column { samples, field: |s| s.steps },
        ts: uniform.is_none().then_some(Column { samples, field: |s| s.timestamp_s }),
    };
    to_json(&summary, buffer)
}

fn deserialize_summary<const N: usize>(data: &[u8]) -> Result<heapless::Vec<HealthSample, N>, ProtocolError> {
    let (summary, _): (SummaryIn<N>, usize) =
        serde_json_core::from_slice(data).map_err(|_| ProtocolError::MalformedJson)?;

    let count = summary.count;
    let columns_agree = summary.hr.len() == count
        && summary.spo2.len() == count
        && summary.steps.len() == count
        && summary.ts.as_ref().map_or(true, |ts| ts.len() == count);
    if !columns_agree {
        return Err(ProtocolError::InconsistentSummary);
    }

    let mut out = heapless::Vec::new();
    let mut ts = summary.start_ts;
    for i in 0..count {
        let timestamp_s = match &summary.ts {
            Some(explicit) => explicit[i],
            None => ts,
        };
        out.push(HealthSample::new(summary.hr[i], summary.spo2[i], summary.steps[i], timestamp_s))
            .map_err(|_| ProtocolError::CapacityExceeded { count, capacity: N })?;
        ts = ts.wrapping_add(summary.interval);
    }
    Ok(out)
}

fn to_json<T: Serialize + ?Sized>(value: &T, buffer: &mut [u8]) -> Result<usize, ProtocolError> {
    serde_json_core::to_slice(value, buffer).map_err(|_| ProtocolError::OutputFull {
        available: buffer.len(),
    })
}

// ============================================================================
// Public Encode / Decode
// ============================================================================

/// Encode a realtime report.
///
/// Binary: one record plus a 4-byte LE `f32` alert suffix when an alert is
/// present (calories are not carried). Both JSON formats produce a single
/// JSON object; calories are rounded to 0.1 and the alert to 1e-4.
pub fn encode_report(format: PayloadFormat, report: &SampleReport, buffer: &mut [u8]) -> Result<usize, ProtocolError> {
    match format {
        PayloadFormat::Binary => {
            let required = RECORD_SIZE + report.alert.map_or(0, |_| ALERT_SIZE);
            if buffer.len() < required {
                return Err(ProtocolError::BufferOverflow {
                    required,
                    available: buffer.len(),
                });
            }
            serialize_record(&report.sample, buffer)?;
            if let Some(alert) = report.alert {
                buffer[RECORD_SIZE..required].copy_from_slice(&alert.to_le_bytes());
            }
            Ok(required)
        }
        PayloadFormat::JsonRecords | PayloadFormat::JsonSummary => {
            let record = JsonRecord {
                cal: report.calories_kcal.map(|c| round_to(c, 10.0)),
                alert: report.alert.map(|a| round_to(a, 10_000.0)),
                ..JsonRecord::from_sample(&report.sample)
            };
            to_json(&record, buffer)
        }
    }
}

/// Decode a realtime report produced by [`encode_report`].
pub fn decode_report(format: PayloadFormat, data: &[u8]) -> Result<SampleReport, ProtocolError> {
    match format {
        PayloadFormat::Binary => {
            let alert = match data.len() {
                RECORD_SIZE => None,
                len if len == RECORD_SIZE + ALERT_SIZE => {
                    Some(f32::from_le_bytes([data[10], data[11], data[12], data[13]]))
                }
                length => return Err(ProtocolError::InvalidLength { length }),
            };
            Ok(SampleReport {
                sample: deserialize_record(data)?,
                calories_kcal: None,
                alert,
            })
        }
        PayloadFormat::JsonRecords | PayloadFormat::JsonSummary => {
            let (record, _): (JsonRecord, usize) =
                serde_json_core::from_slice(data).map_err(|_| ProtocolError::MalformedJson)?;
            Ok(SampleReport {
                sample: record.to_sample(),
                calories_kcal: record.cal,
                alert: record.alert,
            })
        }
    }
}

/// Encode samples, oldest first, as a batch payload.
pub fn encode_batch(format: PayloadFormat, samples: &[HealthSample], buffer: &mut [u8]) -> Result<usize, ProtocolError> {
    if samples.is_empty() {
        return Err(ProtocolError::Empty);
    }
    match format {
        PayloadFormat::Binary => serialize_binary_batch(samples, buffer),
        PayloadFormat::JsonRecords => to_json(&RecordSeq(samples), buffer),
        PayloadFormat::JsonSummary => serialize_summary(samples, buffer),
    }
}

/// Decode a batch payload produced by [`encode_batch`].
pub fn decode_batch<const N: usize>(
    format: PayloadFormat,
    data: &[u8],
) -> Result<heapless::Vec<HealthSample, N>, ProtocolError> {
    match format {
        PayloadFormat::Binary => deserialize_binary_batch(data),
        PayloadFormat::JsonRecords => {
            let (records, _): (heapless::Vec<JsonRecord, N>, usize) =
                serde_json_core::from_slice(data).map_err(|_| ProtocolError::MalformedJson)?;
            Ok(records.iter().map(|r| r.to_sample()).collect())
        }
        PayloadFormat::JsonSummary => deserialize_summary(data),
    }
}
