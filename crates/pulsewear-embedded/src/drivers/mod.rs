//! Hardware drivers for the wrist sensors
//!
//! - [`max30102`]: Maxim MAX30102 red/IR pulse oximeter
//! - [`mpu6050`]: InvenSense MPU6050 accelerometer
//!
//! Both sit on one I2C bus; hand each driver its own shared-bus `I2c` handle.

pub mod max30102;
pub mod mpu6050;

#[cfg(test)]
pub(crate) mod mock;
