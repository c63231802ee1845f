//! Actuator drivers and execution-context helpers.

pub mod motion;
pub mod servo;
pub mod soft_pwm;
pub mod task_pin;
