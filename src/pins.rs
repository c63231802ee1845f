//! Default GPIO / peripheral assignments for the robot's main board.
//!
//! Single source of truth for the defaults in [`crate::config`]. Pin
//! numbers are BCM GPIO numbers on the Raspberry Pi header; every value
//! can be overridden through the configuration file.

// ---------------------------------------------------------------------------
// Drive motors (TB6612FNG dual H-bridge)
// ---------------------------------------------------------------------------

/// Motor A (left track) direction input 1.
pub const MOTOR_A_IN1: u32 = 27;
/// Motor A (left track) direction input 2.
pub const MOTOR_A_IN2: u32 = 17;
/// Motor A speed input, driven by a software PWM channel.
pub const MOTOR_A_PWM: u32 = 4;

/// Motor B (right track) direction input 1.
pub const MOTOR_B_IN1: u32 = 24;
/// Motor B (right track) direction input 2.
pub const MOTOR_B_IN2: u32 = 22;
/// Motor B speed input, driven by a software PWM channel.
pub const MOTOR_B_PWM: u32 = 23;

/// H-bridge standby line: HIGH = driver enabled.
pub const MOTOR_STANDBY: u32 = 25;

// ---------------------------------------------------------------------------
// Servo (hardware PWM, GPIO 18 = pwmchip0/pwm0)
// ---------------------------------------------------------------------------

pub const SERVO_PWM_CHIP: u32 = 0;
pub const SERVO_PWM_CHANNEL: u32 = 0;

// ---------------------------------------------------------------------------
// Environmental sensors (BME280 on I²C-1)
// ---------------------------------------------------------------------------

pub const SENSOR_I2C_BUS: u8 = 1;
/// SDO tied low.
pub const BME280_PRIMARY_ADDR: u8 = 0x76;
/// SDO tied high.
pub const BME280_SECONDARY_ADDR: u8 = 0x77;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// Software PWM frequency for the drive motors.
pub const MOTOR_PWM_FREQ_HZ: u32 = 1_000;
/// Servo frame rate (20 ms period).
pub const SERVO_PWM_FREQ_HZ: u32 = 50;
