//! Unified error types for the tankbot core.
//!
//! A single `Error` enum that every subsystem can convert into. Only
//! [`Error::HardwareInit`] is expected to cross the core boundary at
//! runtime; transient failures are absorbed where they happen and show up
//! as state (sensor health, missed PWM edges, warning flags) instead.
//! All variants are `Copy` so they can be passed through worker threads
//! and logged without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the core funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A required hardware resource could not be acquired at startup.
    HardwareInit(&'static str),
    /// A sensor could not be read or returned implausible data.
    Sensor(SensorError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
    /// An execution context could not be spawned.
    Spawn(&'static str),
    /// The shutdown signal was raised while waiting.
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HardwareInit(what) => write!(f, "hardware init: {what}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(name) => write!(f, "failed to spawn '{name}'"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// No device answered at the configured bus address.
    NotDetected,
    /// A device answered but reported an unexpected chip id.
    UnexpectedChipId(u8),
    /// Bus transaction failed.
    Bus,
    /// Device is absent or its handle was invalidated.
    Unavailable,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDetected => write!(f, "device not detected"),
            Self::UnexpectedChipId(id) => write!(f, "unexpected chip id 0x{id:02x}"),
            Self::Bus => write!(f, "bus transaction failed"),
            Self::Unavailable => write!(f, "sensor unavailable"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Returned by blocking waits once the shutdown signal has been raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shutdown signalled")
    }
}

impl std::error::Error for Cancelled {}

impl From<Cancelled> for Error {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
