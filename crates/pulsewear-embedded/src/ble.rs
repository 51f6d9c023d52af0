//! BLE Peripheral for Health Data
//!
//! GATT layout, characteristic decoding and the notification path used by
//! the wrist device. The radio stack itself is outside this crate: its write
//! callback hands raw bytes to [`handle_write`], and its notify task drains
//! the queue that [`BleNotifier`] fills.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BLE Peripheral                       │
//! ├─────────────────────────────────────────────────────────┤
//! │  User Data Service (0x181C)                             │
//! │  ├── Weight (0x2A98)        [Write]  u16 LE, kg         │
//! │  ├── Height (0x2A8E)        [Write]  u16 LE, cm         │
//! │  ├── Gender (0x2A8C)        [Write]  u8, 1 = male       │
//! │  └── Age (0x2A80)           [Write]  u8, years          │
//! ├─────────────────────────────────────────────────────────┤
//! │  Health Data Service (0x180D)                           │
//! │  ├── Health Data (0x2A37)   [Notify] sample/batch       │
//! │  └── Device Status (0x2A19) [Read]   status packet      │
//! ├─────────────────────────────────────────────────────────┤
//! │  Pulsewear Control Service (Custom)                     │
//! │  ├── Delivery Mode          [Write]  u8, 0 = realtime   │
//! │  ├── Step Counting          [Write]  u8, 0 = paused     │
//! │  ├── Time Sync              [Write]  u32 LE, Unix secs  │
//! │  └── BMI                    [Write]  u16 LE, 0.1 units  │
//! └─────────────────────────────────────────────────────────┘
//! ```

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, Ordering};

use heapless::spsc::{Producer, Queue};
use heapless::Vec;

use pulsewear_core::delivery::{DeliveryMode, Transport, MAX_PAYLOAD_SIZE};
use pulsewear_core::profile::{submit, DeviceSettings, ProfileWrite};
use pulsewear_core::types::Sex;

// ============================================================================
// Service and Characteristic UUIDs
// ============================================================================

/// Bluetooth base UUID (`0000xxxx-0000-1000-8000-00805F9B34FB`)
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;

/// User Data Service
pub const USER_DATA_SERVICE_UUID: u16 = 0x181C;
/// Weight Characteristic
pub const WEIGHT_CHAR_UUID: u16 = 0x2A98;
/// Height Characteristic
pub const HEIGHT_CHAR_UUID: u16 = 0x2A8E;
/// Gender Characteristic
pub const GENDER_CHAR_UUID: u16 = 0x2A8C;
/// Age Characteristic
pub const AGE_CHAR_UUID: u16 = 0x2A80;

/// Health Data Service
pub const HEALTH_DATA_SERVICE_UUID: u16 = 0x180D;
/// Health Data Characteristic (notify)
pub const HEALTH_DATA_CHAR_UUID: u16 = 0x2A37;
/// Device Status Characteristic
pub const DEVICE_STATUS_CHAR_UUID: u16 = 0x2A19;

/// Pulsewear Control Service (custom 128-bit)
pub const CONTROL_SERVICE_UUID: u128 = 0x50570000_6d2c_4f1e_9a3b_c0ffee5a1e00;
/// Delivery Mode Characteristic
pub const DELIVERY_MODE_CHAR_UUID: u128 = 0x50570001_6d2c_4f1e_9a3b_c0ffee5a1e00;
/// Step Counting Characteristic
pub const STEP_COUNTING_CHAR_UUID: u128 = 0x50570002_6d2c_4f1e_9a3b_c0ffee5a1e00;
/// Time Sync Characteristic
pub const TIME_SYNC_CHAR_UUID: u128 = 0x50570003_6d2c_4f1e_9a3b_c0ffee5a1e00;
/// BMI Characteristic
pub const BMI_CHAR_UUID: u128 = 0x50570004_6d2c_4f1e_9a3b_c0ffee5a1e00;

/// Expand a 16-bit SIG UUID to its 128-bit form.
#[must_use]
pub const fn sig_uuid(short: u16) -> u128 {
    BLUETOOTH_BASE_UUID | ((short as u128) << 96)
}

// ============================================================================
// Packet Sizes and Constraints
// ============================================================================

/// Default ATT MTU before negotiation
pub const DEFAULT_MTU: u16 = 23;
/// MTU requested by the device
pub const PREFERRED_MTU: u16 = 247;
/// ATT notification header (opcode + handle)
pub const ATT_HEADER_SIZE: usize = 3;
/// Largest notification value the queue stores
pub const MAX_NOTIFY_LEN: usize = MAX_PAYLOAD_SIZE;
/// Notification queue depth (holds one less than this)
pub const NOTIFY_QUEUE_DEPTH: usize = 4;

/// One queued notification value
pub type Notification = Vec<u8, MAX_NOTIFY_LEN>;

/// Queue between the control loop and the radio's notify task
pub type NotifyQueue = Queue<Notification, NOTIFY_QUEUE_DEPTH>;

// ============================================================================
// Characteristic Writes
// ============================================================================

/// Writable profile and control characteristics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileCharacteristic {
    /// Weight in whole kilograms
    Weight,
    /// Height in centimetres
    Height,
    /// Gender byte
    Gender,
    /// Age in years
    Age,
    /// Delivery mode byte
    DeliveryMode,
    /// Step counting flag
    StepCounting,
    /// Unix time in seconds
    TimeSync,
    /// BMI in tenths
    Bmi,
}

impl ProfileCharacteristic {
    /// Look up a characteristic by its 128-bit UUID (SIG UUIDs in expanded form).
    #[must_use]
    pub const fn from_uuid(uuid: u128) -> Option<Self> {
        match uuid {
            DELIVERY_MODE_CHAR_UUID => return Some(Self::DeliveryMode),
            STEP_COUNTING_CHAR_UUID => return Some(Self::StepCounting),
            TIME_SYNC_CHAR_UUID => return Some(Self::TimeSync),
            BMI_CHAR_UUID => return Some(Self::Bmi),
            _ => {}
        }
        if uuid & !(0xFFFF_u128 << 96) != BLUETOOTH_BASE_UUID {
            return None;
        }
        match (uuid >> 96) as u16 {
            WEIGHT_CHAR_UUID => Some(Self::Weight),
            HEIGHT_CHAR_UUID => Some(Self::Height),
            GENDER_CHAR_UUID => Some(Self::Gender),
            AGE_CHAR_UUID => Some(Self::Age),
            _ => None,
        }
    }

    /// Full 128-bit UUID.
    #[must_use]
    pub const fn uuid(self) -> u128 {
        match self {
            Self::Weight => sig_uuid(WEIGHT_CHAR_UUID),
            Self::Height => sig_uuid(HEIGHT_CHAR_UUID),
            Self::Gender => sig_uuid(GENDER_CHAR_UUID),
            Self::Age => sig_uuid(AGE_CHAR_UUID),
            Self::DeliveryMode => DELIVERY_MODE_CHAR_UUID,
            Self::StepCounting => STEP_COUNTING_CHAR_UUID,
            Self::TimeSync => TIME_SYNC_CHAR_UUID,
            Self::Bmi => BMI_CHAR_UUID,
        }
    }

    /// Expected value length in bytes.
    #[must_use]
    pub const fn value_len(self) -> usize {
        match self {
            Self::Weight | Self::Height | Self::Bmi => 2,
            Self::Gender | Self::Age | Self::DeliveryMode | Self::StepCounting => 1,
            Self::TimeSync => 4,
        }
    }
}

/// Errors decoding a characteristic write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharacteristicError {
    /// UUID is not a writable characteristic
    UnknownCharacteristic,
    /// Value has the wrong length
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Received length
        got: usize,
    },
    /// Byte does not map to a valid value
    InvalidValue {
        /// Offending byte
        value: u8,
    },
    /// Settings queue is full; the write was dropped
    QueueFull,
}

impl fmt::Display for CharacteristicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCharacteristic => write!(f, "Unknown characteristic"),
            Self::InvalidLength { expected, got } => {
                write!(f, "Invalid value length: expected {expected}, got {got}")
            }
            Self::InvalidValue { value } => write!(f, "Invalid value: 0x{value:02X}"),
            Self::QueueFull => write!(f, "Settings queue full"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CharacteristicError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::UnknownCharacteristic => defmt::write!(f, "Unknown characteristic"),
            Self::InvalidLength { expected, got } => defmt::write!(f, "Bad length: {} != {}", got, expected),
            Self::InvalidValue { value } => defmt::write!(f, "Bad value: 0x{:02X}", value),
            Self::QueueFull => defmt::write!(f, "Queue full"),
        }
    }
}

/// Decode a written value into a settings update.
///
/// Only the encoding is checked here; ranges are enforced when the settings
/// store applies the write.
pub fn decode_profile_write(
    characteristic: ProfileCharacteristic,
    data: &[u8],
) -> Result<ProfileWrite, CharacteristicError> {
    let expected = characteristic.value_len();
    if data.len() != expected {
        return Err(CharacteristicError::InvalidLength {
            expected,
            got: data.len(),
        });
    }

    let u16_le = || u16::from_le_bytes([data[0], data[1]]);
    let write = match characteristic {
        ProfileCharacteristic::Weight => ProfileWrite::WeightKg(f32::from(u16_le())),
        ProfileCharacteristic::Height => ProfileWrite::HeightM(f32::from(u16_le()) / 100.0),
        ProfileCharacteristic::Bmi => ProfileWrite::Bmi(f32::from(u16_le()) / 10.0),
        ProfileCharacteristic::Gender => ProfileWrite::Sex(Sex::from_byte(data[0])),
        ProfileCharacteristic::Age => ProfileWrite::AgeYears(data[0]),
        ProfileCharacteristic::DeliveryMode => {
            let mode = DeliveryMode::from_byte(data[0]).ok_or(CharacteristicError::InvalidValue { value: data[0] })?;
            ProfileWrite::DeliveryMode(mode)
        }
        ProfileCharacteristic::StepCounting => ProfileWrite::StepCounting(data[0] != 0),
        ProfileCharacteristic::TimeSync => ProfileWrite::TimeSync {
            epoch_s: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        },
    };
    Ok(write)
}

/// Write callback body: decode and queue for the control loop.
pub fn handle_write<const Q: usize>(
    uuid: u128,
    data: &[u8],
    queue: &mut Producer<'_, ProfileWrite, Q>,
) -> Result<(), CharacteristicError> {
    let characteristic = ProfileCharacteristic::from_uuid(uuid).ok_or(CharacteristicError::UnknownCharacteristic)?;
    let write = decode_profile_write(characteristic, data)?;
    // submit only fails on a full queue
    submit(queue, write).map_err(|_| CharacteristicError::QueueFull)?;
    tracing::debug!(?characteristic, ?write, "characteristic write queued");
    Ok(())
}

/// Current value of a profile characteristic, for GATT reads.
///
/// Returns `None` only if an encoding were to exceed four bytes.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn read_profile_value(settings: &DeviceSettings, characteristic: ProfileCharacteristic) -> Option<Vec<u8, 4>> {
    let profile = &settings.profile;
    let to_u16 = |v: f32| libm::roundf(v).clamp(0.0, f32::from(u16::MAX)) as u16;
    let value = match characteristic {
        ProfileCharacteristic::Weight => Vec::from_slice(&to_u16(profile.weight_kg).to_le_bytes()),
        ProfileCharacteristic::Height => Vec::from_slice(&to_u16(profile.effective_height_m() * 100.0).to_le_bytes()),
        ProfileCharacteristic::Bmi => Vec::from_slice(&to_u16(profile.bmi() * 10.0).to_le_bytes()),
        ProfileCharacteristic::Gender => Vec::from_slice(&[profile.sex.to_byte()]),
        ProfileCharacteristic::Age => Vec::from_slice(&[profile.age_years]),
        ProfileCharacteristic::DeliveryMode => Vec::from_slice(&[settings.delivery_mode as u8]),
        ProfileCharacteristic::StepCounting => Vec::from_slice(&[u8::from(settings.step_counting)]),
        ProfileCharacteristic::TimeSync => Vec::from_slice(&settings.time_sync_epoch_s.unwrap_or(0).to_le_bytes()),
    };
    value.ok()
}

// ============================================================================
// Status
// ============================================================================

/// Status flag bits
pub mod status_flags {
    /// Delivery mode is realtime
    pub const REALTIME: u8 = 1 << 0;
    /// Steps are being counted
    pub const STEP_COUNTING: u8 = 1 << 1;
    /// Wall clock has been synced
    pub const TIME_SYNCED: u8 = 1 << 2;
    /// Health data notifications enabled
    pub const NOTIFY_ENABLED: u8 = 1 << 3;
    /// Battery below 20%
    pub const BATTERY_LOW: u8 = 1 << 4;
}

/// Status packet size
pub const STATUS_PACKET_SIZE: usize = 7;

/// Device status characteristic value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusPacket {
    /// Battery percentage (0-100)
    pub battery_percent: u8,
    /// [`status_flags`] bits
    pub flags: u8,
    /// Samples waiting for a batch send
    pub pending_samples: u8,
    /// Uptime in seconds
    pub uptime_sec: u32,
}

impl StatusPacket {
    /// Packet size in bytes
    pub const SIZE: usize = STATUS_PACKET_SIZE;

    /// Serialize to bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; STATUS_PACKET_SIZE] {
        let up = self.uptime_sec.to_be_bytes();
        [
            self.battery_percent,
            self.flags,
            self.pending_samples,
            up[0],
            up[1],
            up[2],
            up[3],
        ]
    }

    /// Deserialize from bytes
    #[must_use]
    pub fn from_bytes(buf: &[u8; STATUS_PACKET_SIZE]) -> Self {
        Self {
            battery_percent: buf[0],
            flags: buf[1],
            pending_samples: buf[2],
            uptime_sec: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
        }
    }

    /// Check a flag
    #[must_use]
    pub const fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

// ============================================================================
// Link State
// ============================================================================

/// Shared link state (lock-free atomics, written from radio callbacks)
pub struct BleLinkState {
    conn_handle: AtomicU16,
    connected: AtomicBool,
    mtu: AtomicU16,
    notify_enabled: AtomicBool,
    battery: AtomicU8,
    uptime: AtomicU32,
    packets_sent: AtomicU32,
    packets_dropped: AtomicU32,
}

impl BleLinkState {
    /// Disconnected state with the default MTU
    #[must_use]
    pub const fn new() -> Self {
        Self {
            conn_handle: AtomicU16::new(0),
            connected: AtomicBool::new(false),
            mtu: AtomicU16::new(DEFAULT_MTU),
            notify_enabled: AtomicBool::new(false),
            battery: AtomicU8::new(100),
            uptime: AtomicU32::new(0),
            packets_sent: AtomicU32::new(0),
            packets_dropped: AtomicU32::new(0),
        }
    }

    /// Record a new connection
    pub fn on_connect(&self, handle: u16) {
        self.conn_handle.store(handle, Ordering::Relaxed);
        self.connected.store(true, Ordering::Release);
        tracing::info!(handle, "BLE client connected");
    }

    /// Record a disconnect; subscriptions and MTU reset
    pub fn on_disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.notify_enabled.store(false, Ordering::Relaxed);
        self.mtu.store(DEFAULT_MTU, Ordering::Relaxed);
        tracing::info!("BLE client disconnected");
    }

    /// Whether a client is connected
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Current connection handle
    #[must_use]
    pub fn conn_handle(&self) -> u16 {
        self.conn_handle.load(Ordering::Relaxed)
    }

    /// Negotiated MTU
    #[must_use]
    pub fn mtu(&self) -> u16 {
        self.mtu.load(Ordering::Relaxed)
    }

    /// Update the MTU after an exchange
    pub fn set_mtu(&self, mtu: u16) {
        self.mtu.store(mtu.max(DEFAULT_MTU), Ordering::Relaxed);
    }

    /// Largest notification value at the current MTU
    #[must_use]
    pub fn payload_capacity(&self) -> usize {
        (usize::from(self.mtu()) - ATT_HEADER_SIZE).min(MAX_NOTIFY_LEN)
    }

    /// Whether the client subscribed to health data (CCCD)
    #[must_use]
    pub fn notify_enabled(&self) -> bool {
        self.notify_enabled.load(Ordering::Relaxed)
    }

    /// CCCD write
    pub fn set_notify_enabled(&self, enabled: bool) {
        self.notify_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Set battery percentage
    pub fn set_battery(&self, percent: u8) {
        self.battery.store(percent.min(100), Ordering::Relaxed);
    }

    /// Battery percentage
    #[must_use]
    pub fn battery(&self) -> u8 {
        self.battery.load(Ordering::Relaxed)
    }

    /// Advance uptime by one second
    pub fn tick_uptime(&self) {
        self.uptime.fetch_add(1, Ordering::Relaxed);
    }

    /// Uptime in seconds
    #[must_use]
    pub fn uptime_sec(&self) -> u32 {
        self.uptime.load(Ordering::Relaxed)
    }

    /// Count a delivered notification
    pub fn record_packet_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a refused notification
    pub fn record_packet_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Notifications delivered
    #[must_use]
    pub fn packets_sent(&self) -> u32 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    /// Notifications refused
    #[must_use]
    pub fn packets_dropped(&self) -> u32 {
        self.packets_dropped.load(Ordering::Relaxed)
    }

    /// Build the status characteristic value
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn build_status(&self, settings: &DeviceSettings, pending_samples: usize) -> StatusPacket {
        let mut flags = 0;
        if settings.delivery_mode == DeliveryMode::Realtime {
            flags |= status_flags::REALTIME;
        }
        if settings.step_counting {
            flags |= status_flags::STEP_COUNTING;
        }
        if settings.time_sync_epoch_s.is_some() {
            flags |= status_flags::TIME_SYNCED;
        }
        if self.notify_enabled() {
            flags |= status_flags::NOTIFY_ENABLED;
        }
        let battery = self.battery();
        if battery < 20 {
            flags |= status_flags::BATTERY_LOW;
        }
        StatusPacket {
            battery_percent: battery,
            flags,
            pending_samples: pending_samples.min(usize::from(u8::MAX)) as u8,
            uptime_sec: self.uptime_sec(),
        }
    }
}

impl Default for BleLinkState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Notification Transport
// ============================================================================

/// [`Transport`] that queues health-data notifications for the radio task.
pub struct BleNotifier<'a, const Q: usize> {
    link: &'a BleLinkState,
    queue: Producer<'a, Notification, Q>,
}

impl<'a, const Q: usize> BleNotifier<'a, Q> {
    /// Wrap the producer half of a notification queue
    #[must_use]
    pub fn new(link: &'a BleLinkState, queue: Producer<'a, Notification, Q>) -> Self {
        Self { link, queue }
    }
}

impl<const Q: usize> Transport for BleNotifier<'_, Q> {
    fn notify(&mut self, payload: &[u8]) -> bool {
        if !self.is_connected() || payload.len() > self.link.payload_capacity() {
            self.link.record_packet_dropped();
            return false;
        }
        let Ok(value) = Notification::from_slice(payload) else {
            self.link.record_packet_dropped();
            return false;
        };
        if self.queue.enqueue(value).is_err() {
            tracing::debug!("notification queue full");
            self.link.record_packet_dropped();
            return false;
        }
        self.link.record_packet_sent();
        true
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected() && self.link.notify_enabled()
    }

    fn max_payload_len(&self) -> usize {
        self.link.payload_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsewear_core::profile::SettingsQueue;

    #[test]
    fn test_sig_uuid_expansion() {
        assert_eq!(sig_uuid(WEIGHT_CHAR_UUID), 0x00002A98_0000_1000_8000_00805F9B34FB);
        assert_eq!(
            ProfileCharacteristic::from_uuid(0x00002A8E_0000_1000_8000_00805F9B34FB),
            Some(ProfileCharacteristic::Height)
        );
        assert_eq!(ProfileCharacteristic::from_uuid(sig_uuid(HEALTH_DATA_CHAR_UUID)), None);
        assert_eq!(ProfileCharacteristic::from_uuid(0x12345678_0000_1000_8000_00805F9B34FA), None);
        assert_eq!(ProfileCharacteristic::from_uuid(TIME_SYNC_CHAR_UUID), Some(ProfileCharacteristic::TimeSync));
    }

    #[test]
    fn test_uuid_lookup_consistent() {
        for ch in [
            ProfileCharacteristic::Weight,
            ProfileCharacteristic::Height,
            ProfileCharacteristic::Gender,
            ProfileCharacteristic::Age,
            ProfileCharacteristic::DeliveryMode,
            ProfileCharacteristic::StepCounting,
            ProfileCharacteristic::TimeSync,
            ProfileCharacteristic::Bmi,
        ] {
            assert_eq!(ProfileCharacteristic::from_uuid(ch.uuid()), Some(ch));
        }
    }

    #[test]
    fn test_decode_profile_writes() {
        assert_eq!(
            decode_profile_write(ProfileCharacteristic::Weight, &[72, 0]),
            Ok(ProfileWrite::WeightKg(72.0))
        );
        assert_eq!(
            decode_profile_write(ProfileCharacteristic::Height, &[0xB0, 0x00]),
            Ok(ProfileWrite::HeightM(1.76))
        );
        assert_eq!(
            decode_profile_write(ProfileCharacteristic::Gender, &[0]),
            Ok(ProfileWrite::Sex(Sex::Female))
        );
        assert_eq!(decode_profile_write(ProfileCharacteristic::Age, &[34]), Ok(ProfileWrite::AgeYears(34)));
        assert_eq!(
            decode_profile_write(ProfileCharacteristic::Bmi, &[0xE0, 0x00]),
            Ok(ProfileWrite::Bmi(22.4))
        );
        assert_eq!(
            decode_profile_write(ProfileCharacteristic::DeliveryMode, &[0]),
            Ok(ProfileWrite::DeliveryMode(DeliveryMode::Realtime))
        );
        assert_eq!(
            decode_profile_write(ProfileCharacteristic::StepCounting, &[0]),
            Ok(ProfileWrite::StepCounting(false))
        );
        assert_eq!(
            decode_profile_write(ProfileCharacteristic::TimeSync, &1_700_000_000u32.to_le_bytes()),
            Ok(ProfileWrite::TimeSync { epoch_s: 1_700_000_000 })
        );
    }

    #[test]
    fn test_decode_rejects_bad_values() {
        assert_eq!(
            decode_profile_write(ProfileCharacteristic::Weight, &[72]),
            Err(CharacteristicError::InvalidLength { expected: 2, got: 1 })
        );
        assert_eq!(
            decode_profile_write(ProfileCharacteristic::DeliveryMode, &[7]),
            Err(CharacteristicError::InvalidValue { value: 7 })
        );
    }

    #[test]
    fn test_handle_write_queues() {
        let mut queue = SettingsQueue::new();
        let (mut tx, mut rx) = queue.split();

        handle_write(sig_uuid(AGE_CHAR_UUID), &[40], &mut tx).unwrap();
        assert_eq!(rx.dequeue(), Some(ProfileWrite::AgeYears(40)));

        assert_eq!(
            handle_write(0xDEAD, &[1], &mut tx),
            Err(CharacteristicError::UnknownCharacteristic)
        );

        for _ in 0..7 {
            handle_write(STEP_COUNTING_CHAR_UUID, &[1], &mut tx).unwrap();
        }
        assert_eq!(
            handle_write(STEP_COUNTING_CHAR_UUID, &[1], &mut tx),
            Err(CharacteristicError::QueueFull)
        );
    }

    #[test]
    fn test_out_of_range_write_left_to_store() {
        let mut queue = SettingsQueue::new();
        let (mut tx, mut rx) = queue.split();

        // 0 kg decodes fine; the settings store rejects it on apply
        handle_write(sig_uuid(WEIGHT_CHAR_UUID), &[0, 0], &mut tx).unwrap();
        let write = rx.dequeue().unwrap();
        assert_eq!(write, ProfileWrite::WeightKg(0.0));
        assert!(write.validate().is_err());
    }

    #[test]
    fn test_read_profile_value() {
        let settings = DeviceSettings::default();
        let read = |ch| read_profile_value(&settings, ch).unwrap();
        assert_eq!(read(ProfileCharacteristic::Height).as_slice(), &177u16.to_le_bytes());
        assert_eq!(read(ProfileCharacteristic::Gender).as_slice(), &[1]);
        assert_eq!(read(ProfileCharacteristic::DeliveryMode).as_slice(), &[1]);
        assert_eq!(read(ProfileCharacteristic::TimeSync).as_slice(), &[0, 0, 0, 0]);
        for ch in [
            ProfileCharacteristic::Weight,
            ProfileCharacteristic::Height,
            ProfileCharacteristic::Bmi,
            ProfileCharacteristic::Gender,
            ProfileCharacteristic::Age,
            ProfileCharacteristic::DeliveryMode,
            ProfileCharacteristic::StepCounting,
            ProfileCharacteristic::TimeSync,
        ] {
            assert_eq!(read(ch).len(), ch.value_len());
        }
    }

    #[test]
    fn test_status_packet_roundtrip() {
        let original = StatusPacket {
            battery_percent: 87,
            flags: status_flags::REALTIME | status_flags::TIME_SYNCED,
            pending_samples: 4,
            uptime_sec: 123_456,
        };
        let restored = StatusPacket::from_bytes(&original.to_bytes());
        assert_eq!(restored, original);
        assert!(restored.has(status_flags::REALTIME));
        assert!(!restored.has(status_flags::STEP_COUNTING));
    }

    #[test]
    fn test_build_status() {
        let link = BleLinkState::new();
        link.set_battery(15);
        link.set_notify_enabled(true);
        let status = link.build_status(&DeviceSettings::default(), 300);
        assert_eq!(status.pending_samples, 255);
        assert!(status.has(status_flags::BATTERY_LOW));
        assert!(status.has(status_flags::STEP_COUNTING));
        assert!(status.has(status_flags::NOTIFY_ENABLED));
        assert!(!status.has(status_flags::REALTIME));
    }

    #[test]
    fn test_link_state_disconnect_resets() {
        let link = BleLinkState::new();
        link.on_connect(7);
        link.set_mtu(247);
        link.set_notify_enabled(true);
        assert_eq!(link.payload_capacity(), 244);

        link.on_disconnect();
        assert!(!link.is_connected());
        assert!(!link.notify_enabled());
        assert_eq!(link.mtu(), DEFAULT_MTU);
        assert_eq!(link.payload_capacity(), 20);
    }

    #[test]
    fn test_notifier_requires_subscription() {
        let link = BleLinkState::new();
        let mut queue = NotifyQueue::new();
        let (tx, mut rx) = queue.split();
        let mut notifier = BleNotifier::new(&link, tx);

        assert!(!notifier.is_connected());
        assert!(!notifier.notify(b"x"));
        assert_eq!(link.packets_dropped(), 1);

        link.on_connect(1);
        link.set_mtu(247);
        link.set_notify_enabled(true);
        assert!(notifier.is_connected());
        assert_eq!(notifier.max_payload_len(), 244);
        assert!(notifier.notify(b"{\"hr\":72}"));
        assert_eq!(rx.dequeue().unwrap().as_slice(), b"{\"hr\":72}");
        assert_eq!(link.packets_sent(), 1);
    }

    #[test]
    fn test_notifier_bounds() {
        let link = BleLinkState::new();
        link.on_connect(1);
        link.set_notify_enabled(true);
        let mut queue = NotifyQueue::new();
        let (tx, _rx) = queue.split();
        let mut notifier = BleNotifier::new(&link, tx);

        // default MTU leaves 20 bytes
        assert!(!notifier.notify(&[0u8; 21]));
        assert!(notifier.notify(&[0u8; 20]));
        assert!(notifier.notify(&[0u8; 20]));
        assert!(notifier.notify(&[0u8; 20]));
        // queue holds three
        assert!(!notifier.notify(&[0u8; 20]));
        assert_eq!(link.packets_sent(), 3);
        assert_eq!(link.packets_dropped(), 2);
    }
}
