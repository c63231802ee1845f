//! Positional servo on a hardware-timed PWM channel.
//!
//! Angle maps linearly onto the pulse width:
//!
//! ```text
//!   pulse_us = min_pulse_us + (max_pulse_us - min_pulse_us) * angle / 180
//!   duty     = pulse_us / period_us   (scaled to the channel's max duty)
//! ```
//!
//! With the defaults (1000-2000 µs at 50 Hz) 90° is a 1.5 ms pulse.

use embedded_hal::pwm::SetDutyCycle;

use crate::app::ports::ServoPort;
use crate::config::ServoConfig;
use crate::error::{Error, Result};

pub const MAX_ANGLE: u8 = 180;

/// What happened to a `set_angle` request.
///
/// None of these is an error: a rejected or failed write is a warning the
/// caller may act on, and the commanded angle is still tracked where noted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleOutcome {
    /// Written; carries the (clamped) angle.
    Applied(u8),
    /// Servo not started; angle left unchanged.
    NotRunning,
    /// Angle recorded but the PWM write failed; retry by re-issuing it.
    WriteFailed(u8),
}

impl AngleOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

pub struct ServoController<W: SetDutyCycle> {
    pwm: Option<W>,
    max_duty: u16,
    period_us: u32,
    min_pulse_us: u32,
    max_pulse_us: u32,
    angle: u8,
    running: bool,
}

impl<W: SetDutyCycle> ServoController<W> {
    /// Take ownership of the PWM channel.
    ///
    /// A channel reporting zero duty resolution cannot produce a pulse,
    /// which is fatal: there is no software fallback for the servo.
    pub fn new(pwm: W, config: &ServoConfig) -> Result<Self> {
        let max_duty = pwm.max_duty_cycle();
        if max_duty == 0 {
            log::error!("SERVO: PWM channel reports no duty resolution");
            return Err(Error::HardwareInit("servo PWM channel"));
        }
        if config.frequency_hz == 0 {
            return Err(Error::HardwareInit("servo PWM frequency"));
        }

        Ok(Self {
            pwm: Some(pwm),
            max_duty,
            period_us: 1_000_000 / config.frequency_hz,
            min_pulse_us: config.min_pulse_us,
            max_pulse_us: config.max_pulse_us.max(config.min_pulse_us),
            angle: config.initial_angle.min(MAX_ANGLE),
            running: false,
        })
    }

    /// Pulse width for `angle` (clamped).
    pub fn pulse_width_us(&self, angle: u8) -> u32 {
        let angle = u32::from(angle.min(MAX_ANGLE));
        self.min_pulse_us + (self.max_pulse_us - self.min_pulse_us) * angle / u32::from(MAX_ANGLE)
    }

    /// Channel duty value for `angle`.
    pub fn duty_for(&self, angle: u8) -> u16 {
        let pulse = u64::from(self.pulse_width_us(angle));
        let duty = pulse * u64::from(self.max_duty) / u64::from(self.period_us.max(1));
        duty.min(u64::from(self.max_duty)) as u16
    }

    fn write_angle(&mut self, angle: u8) -> bool {
        let duty = self.duty_for(angle);
        match self.pwm.as_mut() {
            Some(pwm) => pwm.set_duty_cycle(duty).is_ok(),
            None => false,
        }
    }
}

impl<W: SetDutyCycle> ServoPort for ServoController<W> {
    fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        if self.pwm.is_none() {
            return Err(Error::HardwareInit("servo already disposed"));
        }
        if !self.write_angle(self.angle) {
            log::error!("SERVO: initial pulse write failed");
            return Err(Error::HardwareInit("servo PWM start"));
        }
        self.running = true;
        log::info!("SERVO: started at {}°", self.angle);
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Some(pwm) = self.pwm.as_mut() {
            if pwm.set_duty_cycle_fully_off().is_err() {
                log::warn!("SERVO: could not switch PWM off");
            }
        }
        log::info!("SERVO: stopped");
    }

    fn set_angle(&mut self, angle: i32) -> AngleOutcome {
        if !self.running {
            log::warn!("SERVO: set_angle({}) ignored, servo not started", angle);
            return AngleOutcome::NotRunning;
        }
        let clamped = angle.clamp(0, i32::from(MAX_ANGLE)) as u8;
        self.angle = clamped;
        if self.write_angle(clamped) {
            log::debug!("SERVO: angle {}°", clamped);
            AngleOutcome::Applied(clamped)
        } else {
            log::warn!("SERVO: PWM write failed for {}°", clamped);
            AngleOutcome::WriteFailed(clamped)
        }
    }

    fn angle(&self) -> u8 {
        self.angle
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn dispose(&mut self) {
        self.stop();
        if self.pwm.take().is_some() {
            log::info!("SERVO: disposed");
        }
    }
}

impl<W: SetDutyCycle> Drop for ServoController<W> {
    fn drop(&mut self) {
        self.dispose();
    }
}
