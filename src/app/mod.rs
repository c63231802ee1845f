//! Application core.
//!
//! Commands, the per-actuator queues that carry them, and the runtime
//! that owns one execution loop per actuator plus the sensor poller. All
//! interaction with hardware happens through the **port traits** in
//! [`ports`], keeping this layer testable without real peripherals.

pub mod channel;
pub mod commands;
pub mod ports;
pub mod runtime;
