//! In-memory I2C register file for driver tests

use std::collections::VecDeque;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation, SevenBitAddress};

/// Register-addressed fake device. Writes auto-increment from the register
/// named by the first byte, reads do the same except from `stream_reg`,
/// which pops bytes from `stream`.
pub struct FakeBus {
    pub address: u8,
    pub regs: [u8; 256],
    pub stream_reg: Option<u8>,
    pub stream: VecDeque<u8>,
    pub self_clearing: Option<(u8, u8)>,
    pub fail: bool,
    pub writes: Vec<(u8, u8)>,
    pointer: u8,
}

impl FakeBus {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            regs: [0; 256],
            stream_reg: None,
            stream: VecDeque::new(),
            self_clearing: None,
            fail: false,
            writes: Vec::new(),
            pointer: 0,
        }
    }
}

impl ErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c<SevenBitAddress> for FakeBus {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        if self.fail || address != self.address {
            return Err(ErrorKind::Other);
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    let Some((&reg, data)) = bytes.split_first() else {
                        continue;
                    };
                    self.pointer = reg;
                    for (i, &b) in data.iter().enumerate() {
                        let r = reg.wrapping_add(i as u8);
                        let value = match self.self_clearing {
                            Some((sr, mask)) if sr == r => b & !mask,
                            _ => b,
                        };
                        self.regs[usize::from(r)] = value;
                        self.writes.push((r, b));
                    }
                }
                Operation::Read(buf) => {
                    if Some(self.pointer) == self.stream_reg {
                        for b in buf.iter_mut() {
                            *b = self.stream.pop_front().unwrap_or(0);
                        }
                    } else {
                        for (i, b) in buf.iter_mut().enumerate() {
                            *b = self.regs[usize::from(self.pointer.wrapping_add(i as u8))];
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Delay that returns immediately
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
