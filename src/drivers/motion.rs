//! Tank drive train: two DC motors behind a dual H-bridge.
//!
//! Each motor has two direction inputs and one speed input driven by a
//! [`PwmChannel`]. Motor A is the left track, motor B the right track.
//!
//! | action   | IN1  | IN2  | duty          |
//! |----------|------|------|---------------|
//! | forward  | low  | high | cruise speed  |
//! | reverse  | high | low  | cruise speed  |
//! | stop     | low  | low  | 0             |
//! | brake    | high | high | 0             |
//!
//! When switching direction the pin that must go low is written first, and
//! the other pin is only raised once that write succeeded, so both inputs
//! are only ever asserted together during `brake`. A motor whose direction
//! change was skipped is left at zero duty.

use embedded_hal::digital::OutputPin;

use crate::app::ports::MotionPort;
use crate::config::MotionConfig;
use crate::drivers::soft_pwm::PwmChannel;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Pins for one motor, handed over by the back-end.
pub struct MotorPinSet<P> {
    pub in1: P,
    pub in2: P,
    pub pwm: P,
}

/// Observable state of one motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorSnapshot {
    pub direction: Direction,
    pub duty: f64,
    /// Last level successfully written to IN1.
    pub in1_high: bool,
    pub in2_high: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSnapshot {
    pub motor_a: MotorSnapshot,
    pub motor_b: MotorSnapshot,
    /// `None` when no standby pin is wired.
    pub standby_high: Option<bool>,
    /// Speed `drive` applies, per motor (percent).
    pub cruise_percent: (u8, u8),
}

struct Motor<P>
where
    P: OutputPin + Send + 'static,
{
    label: &'static str,
    in1: Option<P>,
    in2: Option<P>,
    in1_high: bool,
    in2_high: bool,
    pwm: PwmChannel<P>,
    direction: Direction,
}

impl<P> Motor<P>
where
    P: OutputPin + Send + 'static,
{
    fn new(label: &'static str, pins: MotorPinSet<P>, frequency_hz: u32) -> Self {
        Self {
            label,
            in1: Some(pins.in1),
            in2: Some(pins.in2),
            in1_high: false,
            in2_high: false,
            pwm: PwmChannel::new(label, pins.pwm, frequency_hz, 0.0),
            direction: Direction::Forward,
        }
    }

    /// Lower the outgoing pin, then raise the incoming one.
    ///
    /// If the lowering write fails the raise is skipped, so IN1 and IN2 are
    /// never left asserted together. Returns whether the new direction is
    /// in place.
    fn set_direction(&mut self, direction: Direction) -> bool {
        let lowered = match direction {
            Direction::Forward => self.write_in1(false),
            Direction::Reverse => self.write_in2(false),
        };
        if !lowered {
            log::warn!("MOTOR[{}]: {:?} skipped, outgoing pin still high", self.label, direction);
            return false;
        }
        let raised = match direction {
            Direction::Forward => self.write_in2(true),
            Direction::Reverse => self.write_in1(true),
        };
        if raised {
            self.direction = direction;
        }
        raised
    }

    /// Set the direction and, only if it took effect, the speed.
    fn run(&mut self, direction: Direction, percent: u8) {
        if self.set_direction(direction) {
            self.set_percent(percent);
        } else {
            self.set_percent(0);
        }
    }

    fn set_pins(&mut self, high: bool) {
        let _ = self.write_in1(high);
        let _ = self.write_in2(high);
    }

    fn set_percent(&self, percent: u8) {
        self.pwm.set_duty(f64::from(percent.min(100)) / 100.0);
    }

    fn write_in1(&mut self, high: bool) -> bool {
        let Some(pin) = self.in1.as_mut() else {
            return false;
        };
        if write_pin(pin, high) {
            self.in1_high = high;
            true
        } else {
            log::warn!("MOTOR[{}]: IN1 write failed", self.label);
            false
        }
    }

    fn write_in2(&mut self, high: bool) -> bool {
        let Some(pin) = self.in2.as_mut() else {
            return false;
        };
        if write_pin(pin, high) {
            self.in2_high = high;
            true
        } else {
            log::warn!("MOTOR[{}]: IN2 write failed", self.label);
            false
        }
    }

    /// Halt PWM and release every pin; each step runs even if another fails.
    fn release(&mut self) {
        self.pwm.set_duty(0.0);
        self.pwm.release();
        if let Some(mut pin) = self.in1.take() {
            if !write_pin(&mut pin, false) {
                log::warn!("MOTOR[{}]: IN1 not driven low on release", self.label);
            }
            self.in1_high = false;
        }
        if let Some(mut pin) = self.in2.take() {
            if !write_pin(&mut pin, false) {
                log::warn!("MOTOR[{}]: IN2 not driven low on release", self.label);
            }
            self.in2_high = false;
        }
    }

    fn snapshot(&self) -> MotorSnapshot {
        MotorSnapshot {
            direction: self.direction,
            duty: self.pwm.duty(),
            in1_high: self.in1_high,
            in2_high: self.in2_high,
        }
    }
}

fn write_pin<P: OutputPin>(pin: &mut P, high: bool) -> bool {
    let result = if high { pin.set_high() } else { pin.set_low() };
    result.is_ok()
}

/// Owns both motors and the optional driver standby line.
pub struct MotionController<P>
where
    P: OutputPin + Send + 'static,
{
    motor_a: Motor<P>,
    motor_b: Motor<P>,
    standby: Option<P>,
    standby_high: bool,
    cruise_a: u8,
    cruise_b: u8,
    turn_percent: u8,
    disposed: bool,
}

impl<P> MotionController<P>
where
    P: OutputPin + Send + 'static,
{
    /// Take ownership of the pins, coast both motors, enable the driver
    /// and start both PWM timing threads.
    ///
    /// Fails with `HardwareInit` if a timing thread cannot be started.
    pub fn new(
        config: &MotionConfig,
        motor_a: MotorPinSet<P>,
        motor_b: MotorPinSet<P>,
        standby: Option<P>,
    ) -> Result<Self> {
        let mut ctrl = Self {
            motor_a: Motor::new("motor-a", motor_a, config.pwm_frequency_hz),
            motor_b: Motor::new("motor-b", motor_b, config.pwm_frequency_hz),
            standby,
            standby_high: false,
            cruise_a: config.default_speed_percent.min(100),
            cruise_b: config.default_speed_percent.min(100),
            turn_percent: config.turn_speed_percent.min(100),
            disposed: false,
        };

        ctrl.motor_a.set_pins(false);
        ctrl.motor_b.set_pins(false);
        if let Some(pin) = ctrl.standby.as_mut() {
            if write_pin(pin, true) {
                ctrl.standby_high = true;
            } else {
                log::warn!("MOTOR: standby pin write failed, driver may stay disabled");
            }
        }

        ctrl.motor_a.pwm.start()?;
        ctrl.motor_b.pwm.start()?;

        log::info!(
            "MOTOR: ready ({} Hz, cruise {}%, turn {}%)",
            config.pwm_frequency_hz,
            ctrl.cruise_a,
            ctrl.turn_percent
        );
        Ok(ctrl)
    }

    pub fn snapshot(&self) -> MotionSnapshot {
        MotionSnapshot {
            motor_a: self.motor_a.snapshot(),
            motor_b: self.motor_b.snapshot(),
            standby_high: self.standby.as_ref().map(|_| self.standby_high),
            cruise_percent: (self.cruise_a, self.cruise_b),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn turn(&mut self, left: Direction, right: Direction) {
        self.motor_a.run(left, self.turn_percent);
        self.motor_b.run(right, self.turn_percent);
    }
}

impl<P> MotionPort for MotionController<P>
where
    P: OutputPin + Send + 'static,
{
    fn drive(&mut self, forward: bool) {
        let dir = if forward {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        log::debug!("MOTOR: drive {:?}", dir);
        self.motor_a.run(dir, self.cruise_a);
        self.motor_b.run(dir, self.cruise_b);
    }

    fn rotate_left(&mut self) {
        log::debug!("MOTOR: rotate left");
        self.turn(Direction::Reverse, Direction::Forward);
    }

    fn rotate_right(&mut self) {
        log::debug!("MOTOR: rotate right");
        self.turn(Direction::Forward, Direction::Reverse);
    }

    fn speed(&mut self, motor_a: u8, motor_b: u8) {
        self.cruise_a = motor_a.min(100);
        self.cruise_b = motor_b.min(100);
        log::debug!("MOTOR: speed A={}% B={}%", self.cruise_a, self.cruise_b);
        self.motor_a.set_percent(self.cruise_a);
        self.motor_b.set_percent(self.cruise_b);
    }

    fn stop(&mut self) {
        log::debug!("MOTOR: stop (coast)");
        self.motor_a.set_percent(0);
        self.motor_b.set_percent(0);
        self.motor_a.set_pins(false);
        self.motor_b.set_pins(false);
    }

    fn brake(&mut self) {
        log::debug!("MOTOR: brake");
        self.motor_a.set_percent(0);
        self.motor_b.set_percent(0);
        self.motor_a.set_pins(true);
        self.motor_b.set_pins(true);
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.stop();
        self.motor_a.release();
        self.motor_b.release();
        if let Some(mut pin) = self.standby.take() {
            if !write_pin(&mut pin, false) {
                log::warn!("MOTOR: standby pin not driven low on dispose");
            }
            self.standby_high = false;
        }
        log::info!("MOTOR: disposed");
    }
}

impl<P> Drop for MotionController<P>
where
    P: OutputPin + Send + 'static,
{
    fn drop(&mut self) {
        self.dispose();
    }
}
