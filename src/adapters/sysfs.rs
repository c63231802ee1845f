//! Linux sysfs GPIO and PWM.
//!
//! | Adapter       | Implements               | Kernel interface              |
//! |---------------|--------------------------|-------------------------------|
//! | [`SysfsGpio`] | `digital::OutputPin`     | `/sys/class/gpio/gpioN/value` |
//! | [`SysfsPwm`]  | `pwm::SetDutyCycle`      | `/sys/class/pwm/pwmchipN/...` |
//!
//! Both export their line on open and unexport it on drop, so releasing a
//! controller hands the line back to the kernel. The sysfs root is a
//! parameter to keep the adapters testable against a plain directory.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};
use log::{debug, warn};

use crate::error::{Error, Result};

pub const GPIO_ROOT: &str = "/sys/class/gpio";
pub const PWM_ROOT: &str = "/sys/class/pwm";

/// udev may need a moment to fix permissions on a freshly exported line.
const EXPORT_SETTLE_RETRIES: u32 = 20;
const EXPORT_SETTLE_STEP: Duration = Duration::from_millis(10);

fn write_attr(path: &Path, value: &str) -> std::io::Result<()> {
    let mut f = OpenOptions::new().write(true).open(path)?;
    f.write_all(value.as_bytes())
}

/// Write to an export file; "already exported" is not an error.
fn export(path: &Path, index: u32) -> std::io::Result<()> {
    match write_attr(path, &index.to_string()) {
        Err(e) if e.raw_os_error() == Some(libc::EBUSY) => Ok(()),
        other => other,
    }
}

/// Retry `write_attr` until the freshly exported attribute accepts writes.
fn write_attr_settled(path: &Path, value: &str) -> std::io::Result<()> {
    let mut attempt = 0;
    loop {
        match write_attr(path, value) {
            Err(e)
                if attempt < EXPORT_SETTLE_RETRIES
                    && matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) =>
            {
                attempt += 1;
                std::thread::sleep(EXPORT_SETTLE_STEP);
            }
            other => return other,
        }
    }
}

// ── GPIO ──────────────────────────────────────────────────────

pub struct SysfsGpio {
    root: PathBuf,
    gpio: u32,
    value: File,
}

impl SysfsGpio {
    pub fn open(gpio: u32) -> Result<Self> {
        Self::open_at(GPIO_ROOT, gpio)
    }

    /// Export `gpio` under `root`, configure it as an output driven low.
    pub fn open_at(root: impl AsRef<Path>, gpio: u32) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let dir = root.join(format!("gpio{gpio}"));

        let setup = || -> std::io::Result<File> {
            export(&root.join("export"), gpio)?;
            // "low" sets direction and initial level in one write.
            write_attr_settled(&dir.join("direction"), "low")?;
            OpenOptions::new().write(true).open(dir.join("value"))
        };
        let value = setup().map_err(|e| {
            warn!("GPIO{}: setup failed: {}", gpio, e);
            Error::HardwareInit("sysfs GPIO export")
        })?;

        debug!("GPIO{}: exported as output", gpio);
        Ok(Self { root, gpio, value })
    }

    pub fn gpio(&self) -> u32 {
        self.gpio
    }
}

impl digital::ErrorType for SysfsGpio {
    type Error = digital::ErrorKind;
}

impl OutputPin for SysfsGpio {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        self.value
            .write_at(b"0", 0)
            .map(|_| ())
            .map_err(|_| digital::ErrorKind::Other)
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        self.value
            .write_at(b"1", 0)
            .map(|_| ())
            .map_err(|_| digital::ErrorKind::Other)
    }
}

impl Drop for SysfsGpio {
    fn drop(&mut self) {
        if let Err(e) = write_attr(&self.root.join("unexport"), &self.gpio.to_string()) {
            warn!("GPIO{}: unexport failed: {}", self.gpio, e);
        }
    }
}

// ── PWM ───────────────────────────────────────────────────────

pub struct SysfsPwm {
    chip_dir: PathBuf,
    channel: u32,
    period_ns: u64,
    duty_cycle: File,
}

impl SysfsPwm {
    pub fn open(chip: u32, channel: u32, frequency_hz: u32) -> Result<Self> {
        Self::open_at(Path::new(PWM_ROOT).join(format!("pwmchip{chip}")), channel, frequency_hz)
    }

    /// Export `channel` of the chip at `chip_dir`, program the period and
    /// enable the output with zero duty.
    pub fn open_at(chip_dir: impl AsRef<Path>, channel: u32, frequency_hz: u32) -> Result<Self> {
        if frequency_hz == 0 {
            return Err(Error::HardwareInit("PWM frequency"));
        }
        let chip_dir = chip_dir.as_ref().to_path_buf();
        let dir = chip_dir.join(format!("pwm{channel}"));
        let period_ns = 1_000_000_000 / u64::from(frequency_hz);

        let setup = || -> std::io::Result<File> {
            export(&chip_dir.join("export"), channel)?;
            // duty must not exceed the period at any point.
            write_attr_settled(&dir.join("duty_cycle"), "0")?;
            write_attr(&dir.join("period"), &period_ns.to_string())?;
            write_attr(&dir.join("enable"), "1")?;
            OpenOptions::new().write(true).open(dir.join("duty_cycle"))
        };
        let duty_cycle = setup().map_err(|e| {
            warn!("PWM {}: setup failed: {}", dir.display(), e);
            Error::HardwareInit("sysfs PWM channel")
        })?;

        debug!("PWM {}: enabled, period {} ns", dir.display(), period_ns);
        Ok(Self {
            chip_dir,
            channel,
            period_ns,
            duty_cycle,
        })
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }
}

impl pwm::ErrorType for SysfsPwm {
    type Error = pwm::ErrorKind;
}

impl SetDutyCycle for SysfsPwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> core::result::Result<(), Self::Error> {
        let ns = self.period_ns * u64::from(duty) / u64::from(u16::MAX);
        self.duty_cycle
            .write_at(ns.to_string().as_bytes(), 0)
            .map(|_| ())
            .map_err(|_| pwm::ErrorKind::Other)
    }
}

impl Drop for SysfsPwm {
    fn drop(&mut self) {
        let dir = self.chip_dir.join(format!("pwm{}", self.channel));
        if let Err(e) = write_attr(&dir.join("enable"), "0") {
            warn!("PWM {}: disable failed: {}", dir.display(), e);
        }
        if let Err(e) = write_attr(&self.chip_dir.join("unexport"), &self.channel.to_string()) {
            warn!("PWM {}: unexport failed: {}", dir.display(), e);
        }
    }
}
