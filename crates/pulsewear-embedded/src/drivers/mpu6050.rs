//! MPU6050 Accelerometer Driver
//!
//! Only the accelerometer is used: ±2 g full scale, DLPF at ~44 Hz and a
//! 100 Hz output rate.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use pulsewear_core::error::SensorError;
use pulsewear_core::sensor::AccelSource;
use pulsewear_core::types::RawAccelSample;

/// Default I2C address (AD0 low)
pub const MPU6050_ADDR: u8 = 0x68;

/// Expected WHO_AM_I value
pub const MPU6050_WHO_AM_I: u8 = 0x68;

/// Register addresses
mod regs {
    pub const SMPLRT_DIV: u8 = 0x19;
    pub const CONFIG: u8 = 0x1A;
    pub const ACCEL_CONFIG: u8 = 0x1C;
    pub const ACCEL_XOUT_H: u8 = 0x3B;
    pub const PWR_MGMT_1: u8 = 0x6B;
    pub const WHO_AM_I: u8 = 0x75;
}

/// Register values
mod bits {
    pub const WAKE: u8 = 0x00;
    pub const DLPF_44HZ: u8 = 0x03;
    pub const ACCEL_2G: u8 = 0x00;
    // 1 kHz / (1 + 9) = 100 Hz
    pub const SMPLRT_100HZ: u8 = 9;
}

/// Decode the six accelerometer output bytes (big-endian X, Y, Z).
#[must_use]
pub fn decode_accel(bytes: &[u8; 6]) -> RawAccelSample {
    RawAccelSample {
        x: i16::from_be_bytes([bytes[0], bytes[1]]),
        y: i16::from_be_bytes([bytes[2], bytes[3]]),
        z: i16::from_be_bytes([bytes[4], bytes[5]]),
    }
}

/// MPU6050 driver
pub struct Mpu6050<I2C> {
    i2c: I2C,
    addr: u8,
    last: RawAccelSample,
}

impl<I2C, E> Mpu6050<I2C>
where
    I2C: I2c<Error = E>,
{
    /// Create a driver at the default address
    #[must_use]
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, MPU6050_ADDR)
    }

    /// Create a driver at a custom address (0x69 with AD0 high)
    #[must_use]
    pub fn with_address(i2c: I2C, addr: u8) -> Self {
        Self {
            i2c,
            addr,
            last: RawAccelSample::default(),
        }
    }

    /// Release the bus
    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Probe, wake and configure; primes the last-sample cache
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), SensorError<E>> {
        let id = self.read_reg(regs::WHO_AM_I)?;
        if id != MPU6050_WHO_AM_I {
            return Err(SensorError::InvalidDeviceId {
                got: id,
                expected: MPU6050_WHO_AM_I,
            });
        }

        self.write_reg(regs::PWR_MGMT_1, bits::WAKE)?;
        delay.delay_ms(50);
        self.write_reg(regs::CONFIG, bits::DLPF_44HZ)?;
        self.write_reg(regs::ACCEL_CONFIG, bits::ACCEL_2G)?;
        self.write_reg(regs::SMPLRT_DIV, bits::SMPLRT_100HZ)?;

        self.last = self.read_raw()?;
        tracing::info!(addr = self.addr, "MPU6050 initialized");
        Ok(())
    }

    /// Read the current acceleration
    pub fn read_raw(&mut self) -> Result<RawAccelSample, SensorError<E>> {
        let mut buf = [0u8; 6];
        self.i2c
            .write_read(self.addr, &[regs::ACCEL_XOUT_H], &mut buf)
            .map_err(SensorError::I2c)?;
        Ok(decode_accel(&buf))
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, SensorError<E>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.addr, &[reg], &mut buf)
            .map_err(SensorError::I2c)?;
        Ok(buf[0])
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError<E>> {
        self.i2c.write(self.addr, &[reg, value]).map_err(SensorError::I2c)
    }
}

impl<I2C: I2c> AccelSource for Mpu6050<I2C> {
    fn read_accel(&mut self) -> RawAccelSample {
        match self.read_raw() {
            Ok(sample) => {
                self.last = sample;
                sample
            }
            Err(e) => {
                tracing::warn!(error = ?e, "MPU6050 read failed, reusing last sample");
                self.last
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::{FakeBus, NoDelay};

    fn bus() -> FakeBus {
        let mut bus = FakeBus::new(MPU6050_ADDR);
        bus.regs[usize::from(regs::WHO_AM_I)] = MPU6050_WHO_AM_I;
        bus.regs[usize::from(regs::PWR_MGMT_1)] = 0x40;
        // 1 g on Z
        bus.regs[0x3B..0x41].copy_from_slice(&[0x00, 0x10, 0xFF, 0xF0, 0x40, 0x00]);
        bus
    }

    #[test]
    fn test_decode_accel_big_endian() {
        let s = decode_accel(&[0x40, 0x00, 0xC0, 0x00, 0x00, 0x01]);
        assert_eq!(s, RawAccelSample::new(16_384, -16_384, 1));
    }

    #[test]
    fn test_init_sequence() {
        let mut dev = Mpu6050::new(bus());
        dev.init(&mut NoDelay).unwrap();
        let bus = dev.release();
        let order: Vec<u8> = bus.writes.iter().map(|&(r, _)| r).collect();
        assert_eq!(order, vec![0x6B, 0x1A, 0x1C, 0x19]);
        assert_eq!(bus.regs[usize::from(regs::PWR_MGMT_1)], 0x00);
        assert_eq!(bus.regs[usize::from(regs::CONFIG)], 0x03);
        assert_eq!(bus.regs[usize::from(regs::SMPLRT_DIV)], 9);
    }

    #[test]
    fn test_wrong_identity() {
        let mut b = bus();
        b.regs[usize::from(regs::WHO_AM_I)] = 0x70;
        let mut dev = Mpu6050::new(b);
        assert!(matches!(
            dev.init(&mut NoDelay),
            Err(SensorError::InvalidDeviceId { got: 0x70, .. })
        ));
    }

    #[test]
    fn test_read_accel() {
        let mut dev = Mpu6050::new(bus());
        dev.init(&mut NoDelay).unwrap();
        assert_eq!(dev.read_accel(), RawAccelSample::new(16, -16, 16_384));
    }

    #[test]
    fn test_bus_failure_returns_last_sample() {
        let mut dev = Mpu6050::new(bus());
        dev.init(&mut NoDelay).unwrap();
        let good = dev.read_accel();
        dev.i2c.fail = true;
        assert_eq!(dev.read_accel(), good);
    }
}
