//! In-memory hardware for host simulation and tests.
//!
//! Each sim device hands out a cloneable *probe* sharing its state, so a
//! test (or the sim back-end's status output) can observe what a controller
//! wrote after the device itself has been moved into that controller or
//! onto another thread. Probes can also inject failures.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};

use crate::app::ports::EnvSensor;
use crate::error::SensorError;
use crate::sensors::fusion::RawReading;

// ── GPIO output ───────────────────────────────────────────────

#[derive(Default)]
struct PinState {
    high: AtomicBool,
    writes: AtomicU64,
    rising_edges: AtomicU64,
    failing: AtomicBool,
    released: AtomicBool,
}

/// Simulated push-pull output.
pub struct SimPin {
    gpio: u32,
    state: Arc<PinState>,
}

/// Observer/fault injector for a [`SimPin`].
#[derive(Clone)]
pub struct SimPinProbe {
    gpio: u32,
    state: Arc<PinState>,
}

impl SimPin {
    pub fn new(gpio: u32) -> Self {
        Self {
            gpio,
            state: Arc::new(PinState::default()),
        }
    }

    pub fn probe(&self) -> SimPinProbe {
        SimPinProbe {
            gpio: self.gpio,
            state: Arc::clone(&self.state),
        }
    }

    fn write(&mut self, high: bool) -> Result<(), digital::ErrorKind> {
        if self.state.failing.load(Ordering::Relaxed) {
            return Err(digital::ErrorKind::Other);
        }
        let was_high = self.state.high.swap(high, Ordering::Relaxed);
        if high && !was_high {
            self.state.rising_edges.fetch_add(1, Ordering::Relaxed);
        }
        self.state.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for SimPin {
    fn drop(&mut self) {
        self.state.released.store(true, Ordering::Relaxed);
    }
}

impl digital::ErrorType for SimPin {
    type Error = digital::ErrorKind;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}

impl SimPinProbe {
    pub fn gpio(&self) -> u32 {
        self.gpio
    }

    pub fn is_high(&self) -> bool {
        self.state.high.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.state.writes.load(Ordering::Relaxed)
    }

    pub fn rising_edges(&self) -> u64 {
        self.state.rising_edges.load(Ordering::Relaxed)
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::Relaxed);
    }

    /// `true` once the owning [`SimPin`] has been dropped.
    pub fn is_released(&self) -> bool {
        self.state.released.load(Ordering::Relaxed)
    }
}

// ── Hardware PWM ──────────────────────────────────────────────

struct PwmState {
    max_duty: u16,
    duty: AtomicU16,
    writes: AtomicU32,
    failing: AtomicBool,
    released: AtomicBool,
}

/// Simulated hardware PWM channel.
pub struct SimPwm {
    state: Arc<PwmState>,
}

#[derive(Clone)]
pub struct SimPwmProbe {
    state: Arc<PwmState>,
}

impl SimPwm {
    /// A channel with `max_duty` steps of resolution. `0` models a channel
    /// that could not be configured.
    pub fn new(max_duty: u16) -> Self {
        Self {
            state: Arc::new(PwmState {
                max_duty,
                duty: AtomicU16::new(0),
                writes: AtomicU32::new(0),
                failing: AtomicBool::new(false),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn probe(&self) -> SimPwmProbe {
        SimPwmProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl Drop for SimPwm {
    fn drop(&mut self) {
        self.state.released.store(true, Ordering::Relaxed);
    }
}

impl pwm::ErrorType for SimPwm {
    type Error = pwm::ErrorKind;
}

impl SetDutyCycle for SimPwm {
    fn max_duty_cycle(&self) -> u16 {
        self.state.max_duty
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        if self.state.failing.load(Ordering::Relaxed) {
            return Err(pwm::ErrorKind::Other);
        }
        self.state.duty.store(duty, Ordering::Relaxed);
        self.state.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl SimPwmProbe {
    pub fn duty(&self) -> u16 {
        self.state.duty.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u32 {
        self.state.writes.load(Ordering::Relaxed)
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::Relaxed);
    }

    pub fn is_released(&self) -> bool {
        self.state.released.load(Ordering::Relaxed)
    }
}

// ── Environmental sensor ──────────────────────────────────────

struct SensorState {
    /// `None` makes reads fail.
    reading: Mutex<Option<RawReading>>,
    reads: AtomicU32,
}

/// Simulated temperature/humidity/pressure sensor.
pub struct SimSensor {
    state: Arc<SensorState>,
}

#[derive(Clone)]
pub struct SimSensorProbe {
    state: Arc<SensorState>,
}

impl SimSensor {
    pub fn new(reading: RawReading) -> Self {
        Self {
            state: Arc::new(SensorState {
                reading: Mutex::new(Some(reading)),
                reads: AtomicU32::new(0),
            }),
        }
    }

    pub fn probe(&self) -> SimSensorProbe {
        SimSensorProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl EnvSensor for SimSensor {
    fn read(&mut self) -> Result<RawReading, SensorError> {
        self.state.reads.fetch_add(1, Ordering::Relaxed);
        let reading = *self
            .state
            .reading
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        reading.ok_or(SensorError::Bus)
    }
}

impl SimSensorProbe {
    /// Serve `reading` from the next read on.
    pub fn set(&self, reading: RawReading) {
        *self
            .state
            .reading
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reading);
    }

    /// Fail every read until the next [`set`](Self::set).
    pub fn fail(&self) {
        *self
            .state
            .reading
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Read attempts so far, successful or not.
    pub fn reads(&self) -> u32 {
        self.state.reads.load(Ordering::Relaxed)
    }
}
