//! Inbound commands to the actuator execution loops.
//!
//! These represent actions requested by the outside world (transport
//! layer, CLI, tests). Each actuator has its own queue, so the two domains
//! are separate types; [`Command`] is the tagged union used at the
//! message-decoding boundary before routing.

/// Drive-train requests, applied in order by the motion loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCommand {
    /// Both tracks forward (`true`) or reverse (`false`) at the cruise speed.
    Drive { forward: bool },
    /// Tank-turn in place, counter-clockwise.
    RotateLeft,
    /// Tank-turn in place, clockwise.
    RotateRight,
    /// Per-track speed in percent; out-of-range values are clamped.
    Speed { motor_a: u8, motor_b: u8 },
    /// Remove drive power and coast.
    Stop,
    /// Short the windings for dynamic braking.
    Brake,
}

/// Servo requests, applied in order by the servo loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoCommand {
    SetAngle { degrees: u8 },
}

/// Either domain, before routing to its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Motion(MotionCommand),
    Servo(ServoCommand),
}

impl From<MotionCommand> for Command {
    fn from(cmd: MotionCommand) -> Self {
        Self::Motion(cmd)
    }
}

impl From<ServoCommand> for Command {
    fn from(cmd: ServoCommand) -> Self {
        Self::Servo(cmd)
    }
}
