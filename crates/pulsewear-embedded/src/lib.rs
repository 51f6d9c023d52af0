//! Pulsewear Embedded - sensor drivers and BLE link layer
//!
//! This crate provides the hardware-facing half of the wrist device:
//! - MAX30102 red/IR pulse oximeter driver (I2C)
//! - MPU6050 accelerometer driver (I2C)
//! - BLE health service definitions, characteristic decoding and the
//!   notification queue that carries payloads to the radio
//!
//! # Hardware Requirements
//!
//! - ESP32-C3 (single hardware I2C bus shared by both sensors)
//! - Maxim MAX30102 at 0x57
//! - InvenSense MPU6050 at 0x68
//!
//! # GPIO Assignments
//!
//! ```text
//! I2C (sensors):  SDA=8, SCL=9
//! Battery ADC:    GPIO 0 (1:2 divider)
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod ble;
pub mod drivers;

// Re-export driver types
pub use drivers::max30102::{decode_fifo_sample, Max30102};
pub use drivers::mpu6050::{decode_accel, Mpu6050};

// Re-export BLE definitions
pub use ble::{
    decode_profile_write, handle_write, BleLinkState, BleNotifier, CharacteristicError, NotifyQueue,
    ProfileCharacteristic, StatusPacket, DEVICE_STATUS_CHAR_UUID, HEALTH_DATA_CHAR_UUID, HEALTH_DATA_SERVICE_UUID,
    USER_DATA_SERVICE_UUID,
};
