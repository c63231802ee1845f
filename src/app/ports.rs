//! Port traits: the boundary between the execution loops and hardware.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Robot runtime (execution loops)
//! ```
//!
//! Controllers (motion, servo) and driven adapters (sensors, log sinks,
//! config storage) implement these traits. The runtime consumes them via
//! generics, so the loops never name a concrete driver and every one of
//! them can be exercised against an in-memory fake.

use crate::app::commands::{MotionCommand, ServoCommand};
use crate::config::RobotConfig;
use crate::drivers::servo::AngleOutcome;
use crate::error::{Error, SensorError};
use crate::sensors::fusion::{RawReading, SensorLogRecord};

// ───────────────────────────────────────────────────────────────
// Motion port (domain → drive train)
// ───────────────────────────────────────────────────────────────

/// Tank drive: two tracks behind an H-bridge.
pub trait MotionPort {
    /// Both tracks forward/reverse at the last commanded speed.
    fn drive(&mut self, forward: bool);

    /// Left track reverse, right track forward, at the turn speed.
    fn rotate_left(&mut self);

    /// Left track forward, right track reverse, at the turn speed.
    fn rotate_right(&mut self);

    /// Per-track speed (0–100 %) without touching direction.
    fn speed(&mut self, motor_a: u8, motor_b: u8);

    /// Zero duty, direction pins low (coast).
    fn stop(&mut self);

    /// Zero duty, direction pins high (dynamic brake).
    fn brake(&mut self);

    /// Stop and release every owned resource. Idempotent, never fails.
    fn dispose(&mut self);

    /// Apply one queued command.
    fn apply(&mut self, cmd: MotionCommand) {
        match cmd {
            MotionCommand::Drive { forward } => self.drive(forward),
            MotionCommand::RotateLeft => self.rotate_left(),
            MotionCommand::RotateRight => self.rotate_right(),
            MotionCommand::Speed { motor_a, motor_b } => self.speed(motor_a, motor_b),
            MotionCommand::Stop => self.stop(),
            MotionCommand::Brake => self.brake(),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Servo port (domain → positional servo)
// ───────────────────────────────────────────────────────────────

pub trait ServoPort {
    /// Begin pulse generation at the current angle. Idempotent.
    fn start(&mut self) -> Result<(), Error>;

    /// Halt pulse generation. Idempotent.
    fn stop(&mut self);

    /// Clamp to 0–180° and write; rejected (not failed) while stopped.
    fn set_angle(&mut self, angle: i32) -> AngleOutcome;

    /// Last commanded angle, running or not.
    fn angle(&self) -> u8;

    fn is_running(&self) -> bool;

    /// Stop and release the timing source. Idempotent.
    fn dispose(&mut self);

    /// Apply one queued command.
    fn apply(&mut self, cmd: ServoCommand) -> AngleOutcome {
        match cmd {
            ServoCommand::SetAngle { degrees } => self.set_angle(i32::from(degrees)),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Environmental sensor port (hardware → domain)
// ───────────────────────────────────────────────────────────────

/// One temperature/humidity/pressure sensor.
pub trait EnvSensor {
    /// Take one reading. A failure affects only the current poll.
    fn read(&mut self) -> Result<RawReading, SensorError>;
}

impl<T: EnvSensor + ?Sized> EnvSensor for Box<T> {
    fn read(&mut self) -> Result<RawReading, SensorError> {
        (**self).read()
    }
}

// ───────────────────────────────────────────────────────────────
// Sensor log sink (domain → append-only log)
// ───────────────────────────────────────────────────────────────

/// Receives one rate-limited record per logging interval.
pub trait SensorLogSink {
    fn append(&mut self, record: &SensorLogRecord) -> std::io::Result<()>;
}

impl<T: SensorLogSink + ?Sized> SensorLogSink for Box<T> {
    fn append(&mut self, record: &SensorLogRecord) -> std::io::Result<()> {
        (**self).append(record)
    }
}

/// Sink that discards every record.
pub struct NullLogSink;

impl SensorLogSink for NullLogSink {
    fn append(&mut self, _record: &SensorLogRecord) -> std::io::Result<()> {
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port (domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`RobotConfig`].
///
/// Implementations MUST validate before persisting and reject invalid
/// values with [`ConfigError::ValidationFailed`] rather than clamp them.
pub trait ConfigPort {
    /// Load configuration. Returns [`RobotConfig::default()`] if nothing
    /// is stored.
    fn load(&self) -> Result<RobotConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &RobotConfig) -> Result<(), ConfigError>;
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config could not be parsed.
    Corrupted,
    /// A field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Corrupted => Self::Config("config corrupted"),
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
            ConfigError::IoError => Self::Config("config I/O error"),
        }
    }
}
