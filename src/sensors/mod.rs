//! Sensor subsystem: BME280 driver, dual-sensor fusion and the polling
//! state machine [`SensorsController`].
//!
//! ```text
//!   Idle ──▶ Calibrating(n reads, discarded) ──▶ Steady ◀─┐
//!                                                  └──────┘
//! ```
//!
//! `poll()` performs at most one read per sensor and never sleeps; the
//! driving loop paces it with [`SensorsController::next_poll_delay`].
//! Rolling buffers and the latest status live behind a mutex so a
//! [`TelemetryHandle`] can read them from any thread while polling runs.

pub mod bme280;
pub mod buffer;
pub mod fusion;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::app::ports::{EnvSensor, SensorLogSink};
use crate::config::SensorConfig;
use buffer::SensorBuffer;
use fusion::{
    Disagreement, FusedSample, RawReading, ReadingSource, SensorId, SensorLogRecord, SensorReading, Thresholds,
};

/// Polling state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorPhase {
    Idle,
    /// `taken` discard reads done so far.
    Calibrating { taken: u32 },
    Steady,
}

impl SensorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Calibrating { .. } => "calibrating",
            Self::Steady => "steady",
        }
    }
}

/// Per-sensor state as of the last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorHealth {
    Up,
    /// Last read failed; retried next poll.
    Down,
    /// Never constructed; never retried.
    Absent,
}

impl SensorHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Absent => "absent",
        }
    }
}

/// Snapshot served to the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
    /// Flags from the most recent steady-state poll.
    pub disagreement: Disagreement,
    /// `[primary, secondary]`.
    pub sensors: [SensorHealth; 2],
    pub phase: SensorPhase,
}

struct Shared {
    temperature: SensorBuffer,
    humidity: SensorBuffer,
    pressure: SensorBuffer,
    disagreement: Disagreement,
    health: [SensorHealth; 2],
    phase: SensorPhase,
}

impl Shared {
    fn averages(&self) -> RawReading {
        RawReading {
            temperature_c: self.temperature.average(),
            humidity_pct: self.humidity.average(),
            pressure_hpa: self.pressure.average(),
        }
    }

    fn push(&mut self, r: &RawReading) {
        self.temperature.push(r.temperature_c);
        self.humidity.push(r.humidity_pct);
        self.pressure.push(r.pressure_hpa);
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read-only view of the rolling averages, cloneable across threads.
#[derive(Clone)]
pub struct TelemetryHandle {
    shared: Arc<Mutex<Shared>>,
}

impl TelemetryHandle {
    /// Buffer averages; zeros until the first steady-state poll.
    pub fn averages(&self) -> SensorReading {
        SensorReading::from_raw(lock(&self.shared).averages(), ReadingSource::Averaged)
    }

    pub fn telemetry(&self) -> Telemetry {
        let s = lock(&self.shared);
        let avg = s.averages();
        Telemetry {
            temperature_c: avg.temperature_c,
            humidity_pct: avg.humidity_pct,
            pressure_hpa: avg.pressure_hpa,
            disagreement: s.disagreement,
            sensors: s.health,
            phase: s.phase,
        }
    }
}

struct Slot<S> {
    id: SensorId,
    sensor: Option<S>,
    health: SensorHealth,
}

impl<S: EnvSensor> Slot<S> {
    fn new(id: SensorId, sensor: Option<S>) -> Self {
        let health = if sensor.is_some() {
            SensorHealth::Up
        } else {
            log::warn!("SENSOR: {:?} sensor absent", id);
            SensorHealth::Absent
        };
        Self { id, sensor, health }
    }

    /// One read attempt; logs Up/Down transitions once each.
    fn read(&mut self) -> Option<RawReading> {
        let sensor = self.sensor.as_mut()?;
        match sensor.read() {
            Ok(reading) => {
                if self.health == SensorHealth::Down {
                    log::info!("SENSOR: {:?} sensor recovered", self.id);
                }
                self.health = SensorHealth::Up;
                Some(reading)
            }
            Err(e) => {
                if self.health == SensorHealth::Up {
                    log::warn!("SENSOR: {:?} sensor read failed: {}", self.id, e);
                } else {
                    log::debug!("SENSOR: {:?} sensor still down: {}", self.id, e);
                }
                self.health = SensorHealth::Down;
                None
            }
        }
    }
}

/// Dual-sensor polling state machine.
pub struct SensorsController<S, L> {
    primary: Slot<S>,
    secondary: Slot<S>,
    sink: L,
    thresholds: Thresholds,
    calibration_samples: u32,
    calibration_interval: Duration,
    poll_interval: Duration,
    log_interval: Duration,
    last_log: Option<Instant>,
    phase: SensorPhase,
    shared: Arc<Mutex<Shared>>,
    last_sample: Option<FusedSample>,
}

impl<S: EnvSensor, L: SensorLogSink> SensorsController<S, L> {
    /// Either sensor may be `None` when it could not be constructed; it is
    /// then permanently absent and fusion relies on the other one.
    pub fn new(config: &SensorConfig, primary: Option<S>, secondary: Option<S>, sink: L) -> Self {
        let primary = Slot::new(SensorId::Primary, primary);
        let secondary = Slot::new(SensorId::Secondary, secondary);
        if primary.sensor.is_none() && secondary.sensor.is_none() {
            log::error!("SENSOR: no sensor available, telemetry will stay at zero");
        }
        let health = [primary.health, secondary.health];

        Self {
            primary,
            secondary,
            sink,
            thresholds: Thresholds {
                temperature_c: config.temperature_threshold_c,
                humidity_pct: config.humidity_threshold_pct,
                pressure_hpa: config.pressure_threshold_hpa,
            },
            calibration_samples: config.calibration_samples,
            calibration_interval: Duration::from_millis(u64::from(config.calibration_interval_ms)),
            poll_interval: Duration::from_millis(u64::from(config.poll_interval_ms)),
            log_interval: Duration::from_millis(u64::from(config.log_interval_ms)),
            last_log: None,
            phase: SensorPhase::Idle,
            shared: Arc::new(Mutex::new(Shared {
                temperature: SensorBuffer::new(),
                humidity: SensorBuffer::new(),
                pressure: SensorBuffer::new(),
                disagreement: Disagreement::NONE,
                health,
                phase: SensorPhase::Idle,
            })),
            last_sample: None,
        }
    }

    pub fn telemetry_handle(&self) -> TelemetryHandle {
        TelemetryHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Buffer averages. Never touches hardware.
    pub fn get_averages(&self) -> SensorReading {
        self.telemetry_handle().averages()
    }

    pub fn phase(&self) -> SensorPhase {
        self.phase
    }

    /// Most recent steady-state consensus round.
    pub fn last_sample(&self) -> Option<&FusedSample> {
        self.last_sample.as_ref()
    }

    /// How long the driving loop should wait before the next poll.
    pub fn next_poll_delay(&self) -> Duration {
        match self.phase {
            SensorPhase::Idle => Duration::ZERO,
            SensorPhase::Calibrating { .. } => self.calibration_interval,
            SensorPhase::Steady => self.poll_interval,
        }
    }

    /// Advance the state machine by one step.
    pub fn poll(&mut self) -> SensorPhase {
        self.poll_at(Instant::now())
    }

    /// As [`poll`](Self::poll), with the clock supplied for log rate limiting.
    pub fn poll_at(&mut self, now: Instant) -> SensorPhase {
        let next = match self.phase {
            SensorPhase::Idle => {
                if self.calibration_samples == 0 {
                    log::info!("SENSOR: calibration skipped");
                    SensorPhase::Steady
                } else {
                    log::info!("SENSOR: calibrating ({} samples)", self.calibration_samples);
                    SensorPhase::Calibrating { taken: 0 }
                }
            }
            SensorPhase::Calibrating { taken } => {
                // Discard: sensors settle after power-up.
                let _ = self.primary.read();
                let _ = self.secondary.read();
                let taken = taken + 1;
                if taken >= self.calibration_samples {
                    log::info!("SENSOR: calibration complete");
                    SensorPhase::Steady
                } else {
                    SensorPhase::Calibrating { taken }
                }
            }
            SensorPhase::Steady => {
                self.steady_poll(now);
                SensorPhase::Steady
            }
        };

        self.phase = next;
        let mut shared = lock(&self.shared);
        shared.phase = next;
        shared.health = [self.primary.health, self.secondary.health];
        next
    }

    fn steady_poll(&mut self, now: Instant) {
        let a = self.primary.read();
        let b = self.secondary.read();

        let sample = {
            let mut shared = lock(&self.shared);
            let sample = fusion::fuse(a, b, &self.thresholds, shared.averages());
            // A held average is pushed like any other fused value.
            shared.push(&sample.fused.raw());
            if sample.disagreement != shared.disagreement && sample.disagreement.any() {
                log::warn!("SENSOR: sensors disagree ({})", sample.disagreement);
            }
            shared.disagreement = sample.disagreement;
            sample
        };

        let due = self
            .last_log
            .is_none_or(|last| now.saturating_duration_since(last) >= self.log_interval);
        if due {
            self.last_log = Some(now);
            if let Err(e) = self.sink.append(&SensorLogRecord::from(&sample)) {
                log::warn!("SENSOR: log write failed: {}", e);
            }
        }

        self.last_sample = Some(sample);
    }

    /// Drop both sensor handles. Idempotent.
    pub fn dispose(&mut self) {
        let held = self.primary.sensor.take().is_some() | self.secondary.sensor.take().is_some();
        if held {
            log::info!("SENSOR: disposed");
        }
    }
}
