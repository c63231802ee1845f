//! System configuration parameters
//!
//! All tunable parameters for the robot core. Values come from a JSON file
//! (see [`crate::adapters::config_file`]); every field has a default so a
//! partial file only needs to name what it overrides.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pins;

/// Which hardware back-end the binary drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-memory pins, PWM and sensors (host simulation).
    Sim,
    /// Linux sysfs GPIO/PWM plus `/dev/i2c-N`.
    Sysfs,
}

impl FromStr for Backend {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sim" => Ok(Self::Sim),
            "sysfs" => Ok(Self::Sysfs),
            _ => Err("backend must be 'sim' or 'sysfs'"),
        }
    }
}

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub backend: Backend,
    pub motion: MotionConfig,
    pub servo: ServoConfig,
    pub sensors: SensorConfig,
    /// Status broadcast period at the transport boundary (milliseconds)
    pub telemetry_interval_ms: u32,
}

/// Direction and speed pins for one H-bridge leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorPins {
    pub in1: u32,
    pub in2: u32,
    pub pwm: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Left track.
    pub motor_a: MotorPins,
    /// Right track.
    pub motor_b: MotorPins,
    /// Driver standby line, if wired.
    pub standby_pin: Option<u32>,
    /// Software PWM frequency (Hz)
    pub pwm_frequency_hz: u32,
    /// Speed applied by `drive` until `speed` is commanded (0-100%)
    pub default_speed_percent: u8,
    /// Speed used for in-place rotation (0-100%)
    pub turn_speed_percent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    pub pwm_chip: u32,
    pub pwm_channel: u32,
    /// Frame rate (Hz); 50 Hz gives the usual 20 ms frame.
    pub frequency_hz: u32,
    /// Pulse width at 0°
    pub min_pulse_us: u32,
    /// Pulse width at 180°
    pub max_pulse_us: u32,
    /// Angle written on `start` (degrees)
    pub initial_angle: u8,
    /// Start pulse generation when the runtime comes up.
    pub autostart: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub i2c_bus: u8,
    pub primary_address: u8,
    /// `None` runs single-sensor.
    pub secondary_address: Option<u8>,

    // --- Calibration ---
    /// Discard-only reads before steady state
    pub calibration_samples: u32,
    /// Delay between calibration reads (milliseconds)
    pub calibration_interval_ms: u32,

    // --- Steady state ---
    /// Delay between steady-state polls (milliseconds)
    pub poll_interval_ms: u32,

    // --- Disagreement thresholds ---
    pub temperature_threshold_c: f64,
    pub humidity_threshold_pct: f64,
    pub pressure_threshold_hpa: f64,

    // --- Logging ---
    /// Minimum spacing between sensor log records (milliseconds)
    pub log_interval_ms: u32,
    /// CSV destination; `None` logs through the `log` facade instead.
    pub log_path: Option<String>,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sim,
            motion: MotionConfig::default(),
            servo: ServoConfig::default(),
            sensors: SensorConfig::default(),
            telemetry_interval_ms: 1000,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            motor_a: MotorPins {
                in1: pins::MOTOR_A_IN1,
                in2: pins::MOTOR_A_IN2,
                pwm: pins::MOTOR_A_PWM,
            },
            motor_b: MotorPins {
                in1: pins::MOTOR_B_IN1,
                in2: pins::MOTOR_B_IN2,
                pwm: pins::MOTOR_B_PWM,
            },
            standby_pin: Some(pins::MOTOR_STANDBY),
            pwm_frequency_hz: pins::MOTOR_PWM_FREQ_HZ,
            default_speed_percent: 70,
            turn_speed_percent: 50,
        }
    }
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            pwm_chip: pins::SERVO_PWM_CHIP,
            pwm_channel: pins::SERVO_PWM_CHANNEL,
            frequency_hz: pins::SERVO_PWM_FREQ_HZ,
            min_pulse_us: 1000,
            max_pulse_us: 2000,
            initial_angle: 90,
            autostart: true,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            i2c_bus: pins::SENSOR_I2C_BUS,
            primary_address: pins::BME280_PRIMARY_ADDR,
            secondary_address: Some(pins::BME280_SECONDARY_ADDR),

            calibration_samples: 10,
            calibration_interval_ms: 500,

            poll_interval_ms: 200,

            temperature_threshold_c: 1.0,
            humidity_threshold_pct: 10.0,
            pressure_threshold_hpa: 2.0,

            log_interval_ms: 5000,
            log_path: Some("sensor_log.csv".into()),
        }
    }
}

impl RobotConfig {
    /// Reject values the controllers cannot run with.
    ///
    /// Values are rejected, never clamped: a bad file should fail loudly at
    /// startup rather than drive hardware with a guessed parameter.
    pub fn validate(&self) -> Result<(), &'static str> {
        let m = &self.motion;
        if m.pwm_frequency_hz == 0 {
            return Err("motion.pwm_frequency_hz must be > 0");
        }
        if m.default_speed_percent > 100 || m.turn_speed_percent > 100 {
            return Err("motion speeds must be 0-100");
        }

        let s = &self.servo;
        if s.frequency_hz == 0 {
            return Err("servo.frequency_hz must be > 0");
        }
        if s.min_pulse_us >= s.max_pulse_us {
            return Err("servo.min_pulse_us must be below max_pulse_us");
        }
        if s.max_pulse_us >= 1_000_000 / s.frequency_hz {
            return Err("servo.max_pulse_us must fit inside one PWM period");
        }
        if s.initial_angle > 180 {
            return Err("servo.initial_angle must be 0-180");
        }

        let n = &self.sensors;
        if n.poll_interval_ms == 0 || n.calibration_interval_ms == 0 {
            return Err("sensor intervals must be > 0");
        }
        if n.temperature_threshold_c < 0.0
            || n.humidity_threshold_pct < 0.0
            || n.pressure_threshold_hpa < 0.0
        {
            return Err("sensor thresholds must be non-negative");
        }
        if n.secondary_address == Some(n.primary_address) {
            return Err("sensor addresses must differ");
        }

        if self.telemetry_interval_ms == 0 {
            return Err("telemetry_interval_ms must be > 0");
        }

        // Every GPIO has exactly one owner.
        let mut used: heapless::Vec<u32, 8> = heapless::Vec::new();
        let claimed = [
            m.motor_a.in1,
            m.motor_a.in2,
            m.motor_a.pwm,
            m.motor_b.in1,
            m.motor_b.in2,
            m.motor_b.pwm,
        ];
        for pin in claimed.into_iter().chain(m.standby_pin) {
            if used.contains(&pin) {
                return Err("a GPIO pin is assigned to more than one output");
            }
            // Capacity covers the seven motion pins.
            let _ = used.push(pin);
        }

        Ok(())
    }
}
