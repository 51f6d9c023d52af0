//! MAX30102 Pulse Oximeter Driver
//!
//! Driver for the Maxim MAX30102 red/IR optical sensor over I2C.
//! The part runs in SpO2 mode (red + IR LEDs) at 400 samples/s with an
//! 18-bit ADC; samples are pulled from its 32-entry FIFO.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use pulsewear_core::error::SensorError;
use pulsewear_core::sensor::OpticalSource;
use pulsewear_core::types::RawOpticalSample;

/// Fixed I2C address
pub const MAX30102_ADDR: u8 = 0x57;

/// Expected PART_ID value
pub const MAX30102_PART_ID: u8 = 0x15;

/// FIFO depth in samples
pub const FIFO_DEPTH: u8 = 32;

/// Bytes per FIFO entry in SpO2 mode (3 red + 3 IR)
pub const FIFO_SAMPLE_BYTES: usize = 6;

/// Register addresses
mod regs {
    pub const FIFO_WR_PTR: u8 = 0x04;
    pub const OVF_COUNTER: u8 = 0x05;
    pub const FIFO_RD_PTR: u8 = 0x06;
    pub const FIFO_DATA: u8 = 0x07;
    pub const FIFO_CONFIG: u8 = 0x08;
    pub const MODE_CONFIG: u8 = 0x09;
    pub const SPO2_CONFIG: u8 = 0x0A;
    pub const LED1_PA: u8 = 0x0C;
    pub const LED2_PA: u8 = 0x0D;
    pub const PART_ID: u8 = 0xFF;
}

/// Register values
mod bits {
    pub const MODE_RESET: u8 = 0x40;
    pub const MODE_SPO2: u8 = 0x03;
    // no averaging, rollover on
    pub const FIFO_ROLLOVER: u8 = 0x10;
    // 4096 nA range | 400 sps | 118 us pulse
    pub const SPO2_4096NA_400SPS_118US: u8 = 0x20 | 0x0C | 0x01;
    pub const LED_AMPLITUDE: u8 = 0x3F;
}

const ADC_MASK: u32 = 0x3_FFFF;
const RESET_POLL_LIMIT: u8 = 10;

/// Decode one SpO2-mode FIFO entry (red first, then IR; 18-bit each).
#[must_use]
pub fn decode_fifo_sample(bytes: &[u8; FIFO_SAMPLE_BYTES]) -> RawOpticalSample {
    let word = |b: &[u8]| ((u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2])) & ADC_MASK;
    RawOpticalSample {
        red: word(&bytes[0..3]),
        ir: word(&bytes[3..6]),
    }
}

/// MAX30102 driver
pub struct Max30102<I2C> {
    i2c: I2C,
    addr: u8,
    pending: u8,
    initialized: bool,
}

impl<I2C, E> Max30102<I2C>
where
    I2C: I2c<Error = E>,
{
    /// Create a driver at the default address
    #[must_use]
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            addr: MAX30102_ADDR,
            pending: 0,
            initialized: false,
        }
    }

    /// Release the bus
    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Whether `init` has completed
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Probe, reset and configure the sensor
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), SensorError<E>> {
        let part_id = self.read_reg(regs::PART_ID)?;
        if part_id != MAX30102_PART_ID {
            return Err(SensorError::InvalidDeviceId {
                got: part_id,
                expected: MAX30102_PART_ID,
            });
        }

        self.write_reg(regs::MODE_CONFIG, bits::MODE_RESET)?;
        for _ in 0..RESET_POLL_LIMIT {
            delay.delay_ms(1);
            if self.read_reg(regs::MODE_CONFIG)? & bits::MODE_RESET == 0 {
                break;
            }
        }

        self.write_reg(regs::FIFO_CONFIG, bits::FIFO_ROLLOVER)?;
        self.write_reg(regs::MODE_CONFIG, bits::MODE_SPO2)?;
        self.write_reg(regs::SPO2_CONFIG, bits::SPO2_4096NA_400SPS_118US)?;
        self.write_reg(regs::LED1_PA, bits::LED_AMPLITUDE)?;
        self.write_reg(regs::LED2_PA, bits::LED_AMPLITUDE)?;
        self.clear_fifo()?;

        self.initialized = true;
        tracing::info!(addr = self.addr, "MAX30102 initialized");
        Ok(())
    }

    /// Reset the FIFO pointers, discarding unread samples
    pub fn clear_fifo(&mut self) -> Result<(), SensorError<E>> {
        self.write_reg(regs::FIFO_WR_PTR, 0)?;
        self.write_reg(regs::OVF_COUNTER, 0)?;
        self.write_reg(regs::FIFO_RD_PTR, 0)?;
        self.pending = 0;
        Ok(())
    }

    /// Number of unread samples in the FIFO
    pub fn available(&mut self) -> Result<u8, SensorError<E>> {
        if !self.initialized {
            return Err(SensorError::NotInitialized);
        }
        let wr = self.read_reg(regs::FIFO_WR_PTR)?;
        let rd = self.read_reg(regs::FIFO_RD_PTR)?;
        Ok(wr.wrapping_sub(rd) & (FIFO_DEPTH - 1))
    }

    /// Read the oldest FIFO entry
    pub fn read_sample(&mut self) -> Result<RawOpticalSample, SensorError<E>> {
        if !self.initialized {
            return Err(SensorError::NotInitialized);
        }
        let mut buf = [0u8; FIFO_SAMPLE_BYTES];
        self.i2c
            .write_read(self.addr, &[regs::FIFO_DATA], &mut buf)
            .map_err(SensorError::I2c)?;
        Ok(decode_fifo_sample(&buf))
    }

    fn next_sample(&mut self) -> Result<Option<RawOpticalSample>, SensorError<E>> {
        if self.pending == 0 {
            self.pending = self.available()?;
            if self.pending == 0 {
                return Ok(None);
            }
        }
        let sample = self.read_sample()?;
        self.pending -= 1;
        Ok(Some(sample))
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

impl<I2C: I2c> OpticalSource for Max30102<I2C> {
    fn read_optical(&mut self) -> Option<RawOpticalSample> {
        if !self.initialized {
            return None;
        }
        match self.next_sample() {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(error = ?e, "MAX30102 read failed");
                self.pending = 0;
                Some(RawOpticalSample::default())
            }
        }
    }
}
