//! Error types for the Pulsewear pipeline
//!
//! All errors work without an allocator and carry enough context to be
//! logged directly from the control loop.

use core::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Sensor Errors
// ============================================================================

/// Errors from the I2C sensor drivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorError<E> {
    /// Bus transaction failed
    I2c(E),
    /// Identity register did not match the expected part
    InvalidDeviceId {
        /// The ID value that was read
        got: u8,
        /// The expected ID value
        expected: u8,
    },
    /// Read attempted before `init` succeeded
    NotInitialized,
}

impl<E: fmt::Debug> fmt::Display for SensorError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c(e) => write!(f, "I2C communication error: {e:?}"),
            Self::InvalidDeviceId { got, expected } => {
                write!(f, "Invalid device ID: got 0x{got:02X}, expected 0x{expected:02X}")
            }
            Self::NotInitialized => write!(f, "Sensor not initialized"),
        }
    }
}

#[cfg(feature = "defmt")]
impl<E: defmt::Format> defmt::Format for SensorError<E> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::I2c(e) => defmt::write!(f, "I2C error: {}", e),
            Self::InvalidDeviceId { got, expected } => {
                defmt::write!(f, "Invalid ID: 0x{:02X} (expected 0x{:02X})", got, expected);
            }
            Self::NotInitialized => defmt::write!(f, "Not initialized"),
        }
    }
}

// ============================================================================
// Protocol Errors
// ============================================================================

/// Errors while encoding or decoding payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolError {
    /// Invalid packet type byte
    InvalidPacketType {
        /// Unknown packet type value
        packet_type: u8,
    },
    /// Checksum mismatch
    ChecksumMismatch {
        /// Expected checksum
        expected: u8,
        /// Computed checksum
        computed: u8,
    },
    /// Output buffer too small (no partial payload is produced)
    BufferOverflow {
        /// Required size
        required: usize,
        /// Available size
        available: usize,
    },
    /// Textual encoder ran out of output space
    OutputFull {
        /// Available size
        available: usize,
    },
    /// Incomplete packet (not enough bytes)
    IncompletePacket {
        /// Bytes received
        received: usize,
        /// Bytes expected
        expected: usize,
    },
    /// Payload length does not match any valid layout
    InvalidLength {
        /// Bytes received
        length: usize,
    },
    /// More records than the destination can hold
    CapacityExceeded {
        /// Records in the payload
        count: usize,
        /// Destination capacity
        capacity: usize,
    },
    /// Textual payload could not be parsed
    MalformedJson,
    /// Parallel arrays in a summary payload disagree in length
    InconsistentSummary,
    /// Nothing to encode
    Empty,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPacketType { packet_type } => {
                write!(f, "Invalid packet type: 0x{packet_type:02X}")
            }
            Self::ChecksumMismatch { expected, computed } => {
                write!(f, "Checksum mismatch: expected 0x{expected:02X}, got 0x{computed:02X}")
            }
            Self::BufferOverflow { required, available } => {
                write!(f, "Buffer overflow: need {required} bytes, have {available}")
            }
            Self::OutputFull { available } => {
                write!(f, "Encoded payload does not fit in {available} bytes")
            }
            Self::IncompletePacket { received, expected } => {
                write!(f, "Incomplete packet: got {received}/{expected} bytes")
            }
            Self::InvalidLength { length } => write!(f, "Invalid payload length: {length}"),
            Self::CapacityExceeded { count, capacity } => {
                write!(f, "Payload holds {count} records, capacity is {capacity}")
            }
            Self::MalformedJson => write!(f, "Malformed JSON payload"),
            Self::InconsistentSummary => write!(f, "Summary arrays have mismatched lengths"),
            Self::Empty => write!(f, "Nothing to encode"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ProtocolError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::InvalidPacketType { packet_type } => {
                defmt::write!(f, "Bad type: {:02X}", packet_type);
            }
            Self::ChecksumMismatch { expected, computed } => {
                defmt::write!(f, "Checksum: {:02X} != {:02X}", expected, computed);
            }
            Self::BufferOverflow { required, available } => {
                defmt::write!(f, "Overflow: {} > {}", required, available);
            }
            Self::OutputFull { available } => defmt::write!(f, "Output full: {}", available),
            Self::IncompletePacket { received, expected } => {
                defmt::write!(f, "Incomplete: {}/{}", received, expected);
            }
            Self::InvalidLength { length } => defmt::write!(f, "Bad length: {}", length),
            Self::CapacityExceeded { count, capacity } => {
                defmt::write!(f, "Capacity: {} > {}", count, capacity);
            }
            Self::MalformedJson => defmt::write!(f, "Bad JSON"),
            Self::InconsistentSummary => defmt::write!(f, "Bad summary"),
            Self::Empty => defmt::write!(f, "Empty"),
        }
    }
}

// ============================================================================
// Settings Errors
// ============================================================================

/// Rejected runtime settings write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingsError {
    /// Value outside the plausible range for the field
    OutOfRange {
        /// Field name
        field: &'static str,
        /// Rejected value
        value: f32,
    },
    /// Write queue is full; the write was dropped
    QueueFull,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { field, value } => write!(f, "{field} out of range: {value}"),
            Self::QueueFull => write!(f, "Settings queue full"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SettingsError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::OutOfRange { field, value } => {
                defmt::write!(f, "{} out of range: {}", field, value);
            }
            Self::QueueFull => defmt::write!(f, "Queue full"),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for SensorError<E> {}

#[cfg(feature = "std")]
impl std::error::Error for ProtocolError {}

#[cfg(feature = "std")]
impl std::error::Error for SettingsError {}
