//! Tankbot core library.
//!
//! Actuation and telemetry for a tank-drive robot: software PWM motors
//! behind an H-bridge, a hardware-PWM servo and a pair of redundant
//! BME280 sensors, each driven by its own execution loop. Exposes every
//! module for integration testing and the host binary.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod pins;
pub mod rpc;
pub mod sensors;
