//! Software-timed PWM on a plain GPIO output.
//!
//! Each channel runs its own timing thread that alternates the pin between
//! high and low using whole-millisecond sleeps:
//!
//! ```text
//!   period = max(1, round(1000 / f)) ms
//!   on     = round(period * duty)      off = period - on
//!
//!   ┌──on──┐      ┌──on──┐
//!   │      │      │      │
//! ──┘      └─off──┘      └─off──
//! ```
//!
//! ## Duty updates
//!
//! `set_duty` only stores the new value. The timing thread samples it once
//! at the start of every period, so a change never truncates a phase that
//! is already running; it takes effect at the next period boundary.
//!
//! ## Resolution
//!
//! On/off times are rounded to whole milliseconds. At 1 kHz that leaves
//! a single-step duty resolution of 0 or 100 %; sub-millisecond precision
//! is an accepted approximation of the bit-banged approach.
//!
//! Missed edges (pin write errors) are counted and logged; the channel
//! keeps running.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use embedded_hal::digital::OutputPin;

use crate::drivers::task_pin::{self, TaskPriority};
use crate::error::{Error, Result};

/// `SCHED_FIFO` priority requested for timing threads.
const PWM_THREAD_PRIORITY: u8 = 80;

/// One period's worth of on/off timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub period_ms: u64,
    pub on_ms: u64,
    pub off_ms: u64,
}

/// Period length for a frequency, in whole milliseconds (never zero).
pub fn period_ms(frequency_hz: u32) -> u64 {
    if frequency_hz == 0 {
        return 1;
    }
    ((1000.0 / f64::from(frequency_hz)).round() as u64).max(1)
}

/// Split one period into on/off phases for `duty` (clamped to `[0, 1]`).
pub fn cycle_timing(frequency_hz: u32, duty: f64) -> CycleTiming {
    let period = period_ms(frequency_hz);
    let duty = clamp_duty(duty);
    let on = ((period as f64 * duty).round() as u64).min(period);
    CycleTiming {
        period_ms: period,
        on_ms: on,
        off_ms: period - on,
    }
}

fn clamp_duty(duty: f64) -> f64 {
    if duty.is_nan() { 0.0 } else { duty.clamp(0.0, 1.0) }
}

/// State shared between the owner and the timing thread.
struct Shared {
    /// `f64` bit pattern; a single atomic word, so reads are never torn.
    duty: AtomicU64,
    frequency_hz: AtomicU32,
    running: AtomicBool,
    missed_edges: AtomicU64,
}

/// A PWM signal generated by a dedicated thread toggling an output pin.
pub struct PwmChannel<P>
where
    P: OutputPin + Send + 'static,
{
    name: &'static str,
    shared: Arc<Shared>,
    /// `None` once released.
    pin: Arc<Mutex<Option<P>>>,
    worker: Option<JoinHandle<()>>,
}

impl<P> PwmChannel<P>
where
    P: OutputPin + Send + 'static,
{
    /// Wrap `pin`; nothing is generated until [`start`](Self::start).
    pub fn new(name: &'static str, pin: P, frequency_hz: u32, initial_duty: f64) -> Self {
        let channel = Self {
            name,
            shared: Arc::new(Shared {
                duty: AtomicU64::new(0f64.to_bits()),
                frequency_hz: AtomicU32::new(1),
                running: AtomicBool::new(false),
                missed_edges: AtomicU64::new(0),
            }),
            pin: Arc::new(Mutex::new(Some(pin))),
            worker: None,
        };
        channel.configure(frequency_hz, initial_duty);
        channel
    }

    /// Set frequency and duty; both apply from the next period boundary.
    pub fn configure(&self, frequency_hz: u32, duty: f64) {
        self.shared
            .frequency_hz
            .store(frequency_hz.max(1), Ordering::Relaxed);
        self.set_duty(duty);
    }

    /// Launch the timing thread. No-op if already running.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        if self.lock_pin().is_none() {
            return Err(Error::HardwareInit("PWM pin already released"));
        }

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let pin = Arc::clone(&self.pin);
        let name = self.name;
        let spawned = task_pin::spawn_task(name, TaskPriority::Realtime(PWM_THREAD_PRIORITY), move || {
            timing_loop(name, &shared, &pin);
        });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                log::info!(
                    "PWM[{}]: started at {} Hz, duty {:.2}",
                    self.name,
                    self.frequency_hz(),
                    self.duty()
                );
                Ok(())
            }
            Err(_) => {
                self.shared.running.store(false, Ordering::Release);
                Err(Error::HardwareInit("PWM timing thread"))
            }
        }
    }

    /// Clamp `duty` to `[0, 1]` and store it for the next period.
    pub fn set_duty(&self, duty: f64) {
        self.shared
            .duty
            .store(clamp_duty(duty).to_bits(), Ordering::Relaxed);
    }

    pub fn duty(&self) -> f64 {
        f64::from_bits(self.shared.duty.load(Ordering::Relaxed))
    }

    pub fn frequency_hz(&self) -> u32 {
        self.shared.frequency_hz.load(Ordering::Relaxed)
    }

    /// Timing for the period that would start now.
    pub fn timing(&self) -> CycleTiming {
        cycle_timing(self.frequency_hz(), self.duty())
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Pin writes that failed since creation.
    pub fn missed_edges(&self) -> u64 {
        self.shared.missed_edges.load(Ordering::Relaxed)
    }

    /// Halt generation, join the timing thread and drive the pin low.
    ///
    /// Returns once the thread has exited. Idempotent.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("PWM[{}]: timing thread panicked", self.name);
            }
            log::info!("PWM[{}]: stopped", self.name);
        }
        if let Some(pin) = self.lock_pin().as_mut() {
            if pin.set_low().is_err() {
                log::warn!("PWM[{}]: could not drive output low on stop", self.name);
            }
        }
    }

    /// Stop and give up the pin. Further `start` calls fail.
    pub fn release(&mut self) {
        self.stop();
        if self.lock_pin().take().is_some() {
            log::debug!("PWM[{}]: pin released", self.name);
        }
    }

    fn lock_pin(&self) -> std::sync::MutexGuard<'_, Option<P>> {
        self.pin.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P> Drop for PwmChannel<P>
where
    P: OutputPin + Send + 'static,
{
    fn drop(&mut self) {
        self.release();
    }
}

fn timing_loop<P: OutputPin>(name: &str, shared: &Shared, pin: &Mutex<Option<P>>) {
    while shared.running.load(Ordering::Acquire) {
        // Sampled once per period.
        let duty = f64::from_bits(shared.duty.load(Ordering::Relaxed));
        let timing = cycle_timing(shared.frequency_hz.load(Ordering::Relaxed), duty);

        if timing.on_ms > 0 {
            write_level(name, shared, pin, true);
            std::thread::sleep(Duration::from_millis(timing.on_ms));
        }
        if timing.off_ms > 0 {
            write_level(name, shared, pin, false);
            std::thread::sleep(Duration::from_millis(timing.off_ms));
        }
    }
}

fn write_level<P: OutputPin>(name: &str, shared: &Shared, pin: &Mutex<Option<P>>, high: bool) {
    let mut guard = pin.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(pin) = guard.as_mut() else {
        return;
    };
    let result = if high { pin.set_high() } else { pin.set_low() };
    if result.is_err() {
        let missed = shared.missed_edges.fetch_add(1, Ordering::Relaxed) + 1;
        if missed == 1 {
            log::warn!("PWM[{}]: pin write failed, edge skipped", name);
        } else {
            log::debug!("PWM[{}]: missed edge #{}", name, missed);
        }
    }
}
