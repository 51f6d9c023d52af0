//! Sensor source traits
//!
//! The signal chains read hardware only through these traits, so the same
//! pipeline runs against the I2C drivers on the device and against synthetic
//! sources on a host.

use crate::types::{RawAccelSample, RawOpticalSample};

/// A source of optical (PPG) samples.
pub trait OpticalSource {
    /// Pop the next buffered sample, or `None` when nothing is pending.
    ///
    /// After a bus failure implementations return a zeroed sample, which the
    /// estimator rejects at the presence gate.
    fn read_optical(&mut self) -> Option<RawOpticalSample>;
}

/// A source of three-axis acceleration samples.
pub trait AccelSource {
    /// Read the current acceleration.
    ///
    /// Implementations may return stale or zero data after a bus failure;
    /// the step detector treats it like any other sample.
    fn read_accel(&mut self) -> RawAccelSample;
}

impl<T: OpticalSource + ?Sized> OpticalSource for &mut T {
    fn read_optical(&mut self) -> Option<RawOpticalSample> {
        (**self).read_optical()
    }
}

impl<T: AccelSource + ?Sized> AccelSource for &mut T {
    fn read_accel(&mut self) -> RawAccelSample {
        (**self).read_accel()
    }
}
