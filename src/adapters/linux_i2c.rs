//! `/dev/i2c-N` bus adapter.
//!
//! Implements `embedded_hal::i2c::I2c` with the kernel's combined-transfer
//! ioctl (`I2C_RDWR`), so a register write followed by a read goes out as a
//! single transaction with a repeated start, as the BME280 expects.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;

use embedded_hal::i2c::{self, I2c, NoAcknowledgeSource, Operation, SevenBitAddress};
use log::{debug, warn};

use crate::error::{Error, Result};

/// `linux/i2c-dev.h`
const I2C_RDWR: libc::c_ulong = 0x0707;
/// `linux/i2c.h`: this message is a read.
const I2C_M_RD: u16 = 0x0001;

/// `struct i2c_msg`
#[repr(C)]
struct I2cMsg {
    addr: u16,
    flags: u16,
    len: u16,
    buf: *mut u8,
}

/// `struct i2c_rdwr_ioctl_data`
#[repr(C)]
struct I2cRdwrData {
    msgs: *mut I2cMsg,
    nmsgs: u32,
}

pub struct LinuxI2c {
    bus: u8,
    file: File,
}

impl LinuxI2c {
    pub fn open(bus: u8) -> Result<Self> {
        let path = format!("/dev/i2c-{bus}");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                warn!("I2C: cannot open {}: {}", path, e);
                Error::HardwareInit("I2C bus")
            })?;
        debug!("I2C: opened {}", path);
        Ok(Self { bus, file })
    }

    pub fn bus(&self) -> u8 {
        self.bus
    }
}

impl i2c::ErrorType for LinuxI2c {
    type Error = i2c::ErrorKind;
}

impl I2c<SevenBitAddress> for LinuxI2c {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> core::result::Result<(), Self::Error> {
        if operations.is_empty() {
            return Ok(());
        }

        let mut msgs = Vec::with_capacity(operations.len());
        for op in operations.iter_mut() {
            let (flags, len, buf) = match op {
                Operation::Read(buf) => (I2C_M_RD, buf.len(), buf.as_mut_ptr()),
                // The kernel only reads from write buffers.
                Operation::Write(buf) => (0, buf.len(), buf.as_ptr().cast_mut()),
            };
            let len = u16::try_from(len).map_err(|_| i2c::ErrorKind::Overrun)?;
            msgs.push(I2cMsg {
                addr: u16::from(address),
                flags,
                len,
                buf,
            });
        }

        let mut data = I2cRdwrData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };
        // SAFETY: `data` points at `msgs`, whose buffers borrow `operations`;
        // all of them outlive the call, and each `len` matches its buffer.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), I2C_RDWR as _, &mut data) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::ENXIO | libc::EREMOTEIO) => i2c::ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
                Some(libc::EAGAIN) => i2c::ErrorKind::ArbitrationLoss,
                _ => i2c::ErrorKind::Bus,
            });
        }
        Ok(())
    }
}
